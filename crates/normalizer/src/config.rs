use error_collector_protocol::ErrorSource;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 8_000;
pub const DEFAULT_MAX_STACK_CHARS: usize = 32_000;
pub const DEFAULT_MAX_CONTEXT_ENTRIES: usize = 64;

const DEFAULT_REDACT_KEYS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "secret",
    "api_key",
    "apikey",
    "access_key",
    "secret_key",
    "client_secret",
    "private_key",
    "authorization",
    "cookie",
    "credential",
    "session",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Context keys containing any of these fragments (case-insensitive) are redacted.
    pub redact_keys: Vec<String>,
    /// Regexes matched against the raw message; a hit drops the event.
    pub ignored_patterns: Vec<String>,
    /// Hosts (and their subdomains) whose browser errors are dropped.
    pub ignored_domains: Vec<String>,
    pub enabled_sources: Vec<ErrorSource>,
    pub max_message_chars: usize,
    pub max_stack_chars: usize,
    pub max_context_entries: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            redact_keys: DEFAULT_REDACT_KEYS.iter().map(|k| k.to_string()).collect(),
            ignored_patterns: Vec::new(),
            ignored_domains: Vec::new(),
            enabled_sources: ErrorSource::ALL.to_vec(),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            max_stack_chars: DEFAULT_MAX_STACK_CHARS,
            max_context_entries: DEFAULT_MAX_CONTEXT_ENTRIES,
        }
    }
}
