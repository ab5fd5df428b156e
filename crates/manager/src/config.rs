use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Summarize groups automatically once they reach the threshold.
    pub auto_summarize: bool,
    /// Member count that moves a collecting group to pending.
    pub summary_threshold: usize,
    pub periodic_interval_secs: u64,
    /// Failed rounds after which a group stops re-entering the queue.
    pub max_summary_attempts: u32,
    /// Caller-side bound on one summarization, rate-limit waits included.
    /// Never shorter than the summarizer's own retry budget.
    pub summary_timeout_secs: u64,
    pub workers: usize,
    pub queue_capacity: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            auto_summarize: true,
            summary_threshold: 5,
            periodic_interval_secs: 300,
            max_summary_attempts: 3,
            summary_timeout_secs: 360,
            workers: 2,
            queue_capacity: 64,
            cleanup_interval_secs: 3_600,
        }
    }
}

impl ManagerConfig {
    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs.max(1))
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_secs.max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
