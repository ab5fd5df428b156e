use error_collector_normalizer::ValidationError;
use error_collector_store::StoreError;
use error_collector_summarizer::SummarizerError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ManagerError>;

/// Why a summarization produced nothing. Shared verbatim with every caller
/// that joined the same in-flight request.
#[derive(Error, Debug, Clone)]
pub enum SummaryFailure {
    #[error(transparent)]
    Summarizer(#[from] SummarizerError),

    #[error("summarization timed out after {0:?}")]
    TimedOut(Duration),

    #[error("summarization was cancelled")]
    Cancelled,

    #[error("failed to persist summary: {0}")]
    Persist(String),
}

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("invalid error event: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Summary(#[from] SummaryFailure),

    #[error("summarization is disabled: no API key configured")]
    SummarizerDisabled,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<SummarizerError> for ManagerError {
    fn from(err: SummarizerError) -> Self {
        Self::Summary(SummaryFailure::Summarizer(err))
    }
}

impl ManagerError {
    /// Stable machine-readable code for tool envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Store(err) if err.is_retryable() => "storage_unavailable",
            Self::Store(_) => "storage_error",
            Self::Summary(SummaryFailure::Summarizer(err)) => match err {
                SummarizerError::RateLimitExceeded { .. } => "rate_limit_exceeded",
                SummarizerError::SummaryUnavailable { .. } => "summary_unavailable",
                SummarizerError::Rejected { .. } => "rejected",
                SummarizerError::InvalidInput(_) => "invalid_request",
                SummarizerError::NotConfigured(_) | SummarizerError::Client(_) => {
                    "summarizer_disabled"
                }
            },
            Self::Summary(SummaryFailure::TimedOut(_)) => "timeout",
            Self::Summary(SummaryFailure::Cancelled) => "cancelled",
            Self::Summary(SummaryFailure::Persist(_)) => "storage_unavailable",
            Self::SummarizerDisabled => "summarizer_disabled",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Summary(SummaryFailure::Summarizer(err)) => err.is_transient(),
            Self::Summary(_) => true,
            _ => false,
        }
    }
}
