//! # Error Collector Normalizer
//!
//! Turns collector payloads into canonical, classified, redacted records.
//!
//! ```text
//! RawErrorEvent
//!     │
//!     ├──> ignore rules (source toggle, message regex, browser domain)
//!     ├──> context flattening + redaction
//!     ├──> category / severity inference (when missing)
//!     └──> NormalizedError ──> fingerprint(message, category, source)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use error_collector_normalizer::{Normalizer, NormalizerConfig};
//! use error_collector_protocol::{ErrorSource, RawErrorEvent};
//!
//! let normalizer = Normalizer::new(NormalizerConfig::default()).unwrap();
//! let raw = RawErrorEvent::new(ErrorSource::Browser, "TypeError: x is undefined");
//! let normalized = normalizer.normalize(raw, chrono::Utc::now()).unwrap();
//! assert_eq!(normalized.category.as_str(), "runtime");
//! ```

mod canonical;
mod classify;
mod config;
mod error;
mod fingerprint;
mod redact;

pub use canonical::{canonical_message, top_frames};
pub use classify::{
    browser_error_type, category_from_message, infer_category, infer_severity, terminal_category,
};
pub use config::NormalizerConfig;
pub use error::{Result, ValidationError};
pub use fingerprint::{fingerprint, hex_encode_lower};
pub use redact::{flatten_context, REDACTED};

use chrono::{DateTime, Utc};
use error_collector_protocol::{
    Category, Context, ContextValue, ErrorSource, RawErrorEvent, Severity,
};
use regex::Regex;

/// Canonical error content, ready for the store. Identity (`id`, fingerprint,
/// occurrence counters) is assigned at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedError {
    pub timestamp: DateTime<Utc>,
    pub source: ErrorSource,
    pub message: String,
    pub stack_trace: Option<String>,
    pub context: Context,
    pub severity: Severity,
    pub category: Category,
}

impl NormalizedError {
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.message, self.category, self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    SourceDisabled(ErrorSource),
    PatternMatched(String),
    DomainIgnored(String),
}

#[derive(Debug)]
pub struct Normalizer {
    config: NormalizerConfig,
    ignored: Vec<Regex>,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Result<Self> {
        let ignored = config
            .ignored_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ValidationError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { config, ignored })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Returns why `raw` should be dropped, if it should.
    pub fn should_ignore(&self, raw: &RawErrorEvent) -> Option<IgnoreReason> {
        if !self.config.enabled_sources.contains(&raw.source) {
            return Some(IgnoreReason::SourceDisabled(raw.source));
        }
        if let Some(re) = self.ignored.iter().find(|re| re.is_match(&raw.message)) {
            return Some(IgnoreReason::PatternMatched(re.as_str().to_string()));
        }
        if raw.source == ErrorSource::Browser && !self.config.ignored_domains.is_empty() {
            let host = raw
                .context
                .get("url")
                .and_then(|v| v.as_str())
                .and_then(redact::url_host)?;
            let hit = self.config.ignored_domains.iter().find(|domain| {
                let domain = domain.trim().to_lowercase();
                host == domain || host.ends_with(&format!(".{domain}"))
            });
            if let Some(domain) = hit {
                return Some(IgnoreReason::DomainIgnored(domain.clone()));
            }
        }
        None
    }

    /// Validates and canonicalizes a collector event.
    ///
    /// `now` is the ingestion time, used when the collector did not stamp the
    /// event or stamped it in the future.
    pub fn normalize(&self, raw: RawErrorEvent, now: DateTime<Utc>) -> Result<NormalizedError> {
        let message = truncate_chars(raw.message.trim(), self.config.max_message_chars);
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if raw.context.keys().any(|k| k.trim().is_empty()) {
            return Err(ValidationError::EmptyContextKey);
        }

        let mut context = flatten_context(&raw.context, &self.config.redact_keys);
        if raw.source == ErrorSource::Browser && !context.contains_key("error_type") {
            if let Some(ty) = browser_error_type(&message) {
                context.insert("error_type".to_string(), ContextValue::from(ty));
            }
        }
        if context.len() > self.config.max_context_entries {
            return Err(ValidationError::ContextTooLarge {
                entries: context.len(),
                max: self.config.max_context_entries,
            });
        }

        let stack_trace = raw
            .stack_trace
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| truncate_chars(s, self.config.max_stack_chars));

        let category = raw
            .category
            .unwrap_or_else(|| infer_category(raw.source, &message, &context));
        let severity = raw
            .severity
            .unwrap_or_else(|| infer_severity(&message, category));

        let timestamp = match raw.timestamp {
            Some(ts) if ts <= now => ts,
            Some(ts) => {
                log::debug!("clamping future timestamp {ts} to ingestion time");
                now
            }
            None => now,
        };

        Ok(NormalizedError {
            timestamp,
            source: raw.source,
            message,
            stack_trace,
            context,
            severity,
            category,
        })
    }
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((cut, _)) => input[..cut].to_string(),
        None => input.to_string(),
    }
}
