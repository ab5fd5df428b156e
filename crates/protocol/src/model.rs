use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! labelled_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let needle = raw.trim().to_ascii_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == needle)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: raw.to_string(),
                    })
            }
        }
    };
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Browser,
    Terminal,
    #[default]
    Unknown,
}

labelled_enum!(ErrorSource, "source", {
    Browser => "browser",
    Terminal => "terminal",
    Unknown => "unknown",
});

/// Ordered: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

labelled_enum!(Severity, "severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Syntax,
    Runtime,
    Network,
    Permission,
    Resource,
    Logic,
    #[default]
    Unknown,
}

labelled_enum!(Category, "category", {
    Syntax => "syntax",
    Runtime => "runtime",
    Network => "network",
    Permission => "permission",
    Resource => "resource",
    Logic => "logic",
    Unknown => "unknown",
});

/// Scalar context value. Nested payloads are flattened before they get here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ContextValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

pub type Context = BTreeMap<String, ContextValue>;

/// Event as handed over by a collector, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawErrorEvent {
    #[serde(default)]
    pub source: ErrorSource,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub message: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub category: Option<Category>,
}

impl RawErrorEvent {
    pub fn new(source: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_stack_trace(mut self, stack: impl Into<String>) -> Self {
        self.stack_trace = Some(stack.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: ErrorSource,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub context: Context,
    pub severity: Severity,
    pub category: Category,
    pub fingerprint: String,
    pub occurrence_count: u64,
    pub last_seen: DateTime<Utc>,
}

impl ErrorRecord {
    /// First line of the message, capped at `max_chars`.
    pub fn headline(&self, max_chars: usize) -> String {
        let first = self.message.lines().next().unwrap_or_default().trim();
        if first.chars().count() <= max_chars {
            return first.to_string();
        }
        let mut out: String = first.chars().take(max_chars.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub summary_id: String,
    pub error_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,
    pub root_cause: String,
    pub impact_assessment: String,
    pub suggested_solutions: Vec<String>,
    pub confidence_score: f64,
    pub generated_at: DateTime<Utc>,
    pub model_used: String,
    #[serde(default)]
    pub processing_time_ms: u64,
}

impl ErrorSummary {
    pub const HIGH_CONFIDENCE: f64 = 0.8;

    pub fn is_high_confidence(&self) -> bool {
        self.confidence_score >= Self::HIGH_CONFIDENCE
    }

    /// Ranks wide, confident summaries first.
    pub fn priority_score(&self) -> f64 {
        let breadth = (self.error_ids.len() as f64 / 10.0).min(1.0);
        (breadth + self.confidence_score) / 2.0
    }

    pub fn covers(&self, error_id: &str) -> bool {
        self.error_ids.iter().any(|id| id == error_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Open,
    Closed,
    Deprecated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub group_id: u64,
    pub member_ids: BTreeSet<String>,
    pub representative_id: String,
    pub representative_severity: Severity,
    /// Canonical form of the representative's message; similarity is scored against it.
    pub representative_message: String,
    pub source: ErrorSource,
    pub category: Category,
    pub similarity_threshold_used: f64,
    pub opened_at: DateTime<Utc>,
    pub status: GroupStatus,
}

impl ErrorGroup {
    pub fn is_open(&self) -> bool {
        self.status == GroupStatus::Open
    }

    /// Open or closed; deprecated groups no longer own their members.
    pub fn is_active(&self) -> bool {
        self.status != GroupStatus::Deprecated
    }

    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }
}
