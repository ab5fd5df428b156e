use serde::{Deserialize, Serialize};

pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 10;
pub const DEFAULT_MAX_RECORDS: usize = 100_000;
pub const DEFAULT_RETENTION_DAYS: u64 = 90;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Repeats of a fingerprint within this window bump the existing record.
    pub dedup_window_secs: u64,
    /// Hard cap on stored records; the oldest unpinned record is evicted first.
    pub max_records: usize,
    pub retention_days: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            max_records: DEFAULT_MAX_RECORDS,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl StoreConfig {
    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs.min(86_400) as i64)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days.min(36_500) as i64)
    }
}
