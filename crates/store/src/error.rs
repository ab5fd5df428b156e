use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Durable read or write failed. Callers may retry.
    #[error("storage unavailable during {operation}: {source}")]
    StorageUnavailable {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt journal {path} at line {line}: {source}")]
    CorruptJournal {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn unavailable(operation: &'static str, source: std::io::Error) -> Self {
        Self::StorageUnavailable { operation, source }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}
