//! # Error Collector Protocol
//!
//! Data model shared by every stage of the error pipeline.
//!
//! ```text
//! RawErrorEvent ──> ErrorRecord ──> ErrorGroup ──> ErrorSummary
//!  (collector)      (store)         (grouping)     (summarizer)
//! ```
//!
//! The crate also owns the [`Clock`] abstraction so that every time-driven
//! decision in the pipeline can be replayed deterministically in tests.

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod clock;
mod model;
mod time_range;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use model::{
    Category, Context, ContextValue, ErrorGroup, ErrorRecord, ErrorSource, ErrorSummary,
    GroupStatus, RawErrorEvent, Severity, UnknownVariant,
};
pub use time_range::TimeRange;

/// Error payload returned by tool handlers.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_nothing_on_the_wire() {
        let envelope = ErrorEnvelope::new("summary_unavailable", "analysis pending")
            .with_hint("retry after the next periodic pass");
        let raw = serialize_json(&envelope).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["code"], "summary_unavailable");
        assert_eq!(value["hint"], "retry after the next periodic pass");
        assert!(value["details"].is_null());
    }
}
