use serde::{Deserialize, Serialize};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MAX_GROUP_SIZE: usize = 50;
pub const DEFAULT_MAX_GROUP_AGE_SECS: u64 = 3_600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub similarity_threshold: f64,
    /// A group closes once it holds this many members.
    pub max_group_size: usize,
    /// A group closes once it is older than this.
    pub max_group_age_secs: u64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
            max_group_age_secs: DEFAULT_MAX_GROUP_AGE_SECS,
        }
    }
}

impl GroupingConfig {
    pub fn max_group_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_group_age_secs.min(315_360_000) as i64)
    }
}
