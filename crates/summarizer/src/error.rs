use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SummarizerError {
    #[error("invalid summarization input: {0}")]
    InvalidInput(String),

    #[error("rate limit exceeded after {attempts} attempt(s)")]
    RateLimitExceeded {
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("summary unavailable after {attempts} attempt(s): {last_error}")]
    SummaryUnavailable { attempts: u32, last_error: String },

    #[error("request rejected upstream (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("summarizer is not configured: {0}")]
    NotConfigured(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl SummarizerError {
    /// Worth another try later: throttling or exhausted transient retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::SummaryUnavailable { .. }
        )
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::RateLimitExceeded { attempts, .. } | Self::SummaryUnavailable { attempts, .. } => {
                *attempts
            }
            Self::Rejected { .. } => 1,
            _ => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, SummarizerError>;
