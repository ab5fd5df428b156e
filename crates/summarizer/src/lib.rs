//! # Error Collector Summarizer
//!
//! Produces [`ErrorSummary`](error_collector_protocol::ErrorSummary) values
//! from batches of error records via an OpenAI-compatible chat endpoint.
//!
//! ## Architecture
//!
//! ```text
//! records ──select (severity, recency, cap)──> cache lookup (sha256 of fingerprints)
//!                                                  │ miss
//!                                                  v
//!                          build_prompt ──> TokenBucket ──> CompletionTransport
//!                                                  ^               │
//!                                  backoff + jitter └── transient ─┤
//!                                                                  v
//!                                                  parse_summary (JSON | sections)
//! ```
//!
//! Exhausted retries end in [`SummarizerError::RateLimitExceeded`] when the
//! last failure was a throttle and [`SummarizerError::SummaryUnavailable`]
//! otherwise. Rejections (bad key, bad request) are never retried.
//!
//! ## Example
//!
//! ```no_run
//! use error_collector_protocol::SystemClock;
//! use error_collector_summarizer::{SummarizationClient, SummarizeOptions, SummarizerConfig};
//! use std::sync::Arc;
//!
//! # async fn run(records: Vec<error_collector_protocol::ErrorRecord>) -> anyhow::Result<()> {
//! let config = SummarizerConfig {
//!     api_key: std::env::var("OPENROUTER_API_KEY").ok(),
//!     ..SummarizerConfig::default()
//! };
//! let client = SummarizationClient::from_config(config, Arc::new(SystemClock))?;
//! let outcome = client.summarize(&records, SummarizeOptions::default()).await?;
//! println!("{}", outcome.summary.root_cause);
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod config;
mod error;
mod prompt;
mod rate_limit;
mod response;
mod retry;
#[cfg(any(test, feature = "test-support"))]
mod scripted;
mod transport;

pub use cache::{cache_key, SummaryCache};
pub use client::{SummarizationClient, SummarizeOptions, SummaryOutcome};
pub use config::{SummarizerConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{Result, SummarizerError};
pub use prompt::{build_prompt, solution_prompt, SOLUTION_SYSTEM_PROMPT, SYSTEM_PROMPT};
pub use rate_limit::TokenBucket;
pub use response::{parse_solutions, parse_summary, ParsedSummary};
pub use retry::RetryPolicy;
#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedTransport;
pub use transport::{CompletionRequest, CompletionTransport, HttpTransport, TransportError};
