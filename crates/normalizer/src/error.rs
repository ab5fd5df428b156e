use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Raised for input that must not reach the store.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("error message is empty")]
    EmptyMessage,

    #[error("context has {entries} entries after flattening (max {max})")]
    ContextTooLarge { entries: usize, max: usize },

    #[error("context key is empty")]
    EmptyContextKey,

    #[error("invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
