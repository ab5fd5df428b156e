use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct:free";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Bearer token for the completions endpoint. Without it the client
    /// cannot be built over HTTP.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub requests_per_minute: u32,
    pub burst: u32,
    /// How long a caller may wait for a rate-limit token.
    pub acquire_deadline_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub max_errors_per_summary: usize,
    pub max_stack_frames: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            timeout_secs: 30,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            requests_per_minute: 15,
            burst: 3,
            acquire_deadline_secs: 60,
            cache_ttl_secs: 3_600,
            cache_capacity: 256,
            max_errors_per_summary: 10,
            max_stack_frames: 5,
        }
    }
}

impl SummarizerConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn acquire_deadline(&self) -> Duration {
        Duration::from_secs(self.acquire_deadline_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Upper bound on one `summarize` call: every attempt waits out its
    /// rate-limit deadline and its timeout, and every retry sleeps the
    /// longest backoff.
    pub fn retry_budget(&self) -> Duration {
        let policy = self.retry_policy();
        let per_attempt = self.acquire_deadline().saturating_add(self.timeout());
        per_attempt
            .saturating_mul(policy.max_attempts)
            .saturating_add(policy.max_delay.saturating_mul(policy.max_attempts - 1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
        }
    }
}
