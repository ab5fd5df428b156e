//! # Error Collector Manager
//!
//! Ties the pipeline together: every collector event is normalized, stored,
//! grouped, and once a group is big enough, summarized in the background.
//!
//! ```text
//! RawErrorEvent ──Normalizer──> ErrorStore ──GroupingEngine──> group tracker
//!                                                                  │ threshold
//!                                                                  v
//!                     summary workers <── bounded queue <── pending_summary
//!                            │
//!                            └──SummarizationClient──> SummaryStore
//!
//! periodic pass: close aged groups, re-queue failed groups, retry deferred requests
//! cleanup pass:  retention purge, cascading to groups and summaries
//! ```
//!
//! Summaries for the same group or the same error set are single-flight:
//! concurrent callers share one upstream request and one result.
//!
//! ## Example
//!
//! ```no_run
//! use error_collector_grouping::GroupingConfig;
//! use error_collector_manager::{ErrorManager, ManagerConfig};
//! use error_collector_normalizer::{Normalizer, NormalizerConfig};
//! use error_collector_protocol::{ErrorSource, RawErrorEvent, SystemClock};
//! use error_collector_store::{FileBackend, Storage, StoreConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let backend = Arc::new(FileBackend::open("/tmp/error-collector").await?);
//! let storage = Storage::open(backend, StoreConfig::default(), clock.clone()).await?;
//! let manager = ErrorManager::new(
//!     ManagerConfig::default(),
//!     Normalizer::new(NormalizerConfig::default())?,
//!     storage,
//!     GroupingConfig::default(),
//!     None,
//!     clock,
//! );
//! let handle = manager.start();
//! manager
//!     .register_error(RawErrorEvent::new(ErrorSource::Terminal, "ENOENT: no such file"))
//!     .await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod manager;
mod single_flight;
mod state;
pub mod stats;

pub use config::ManagerConfig;
pub use error::{ManagerError, Result, SummaryFailure};
pub use manager::{ErrorManager, GroupView, ManagerHandle, PassReport, RegisterOutcome};
pub use single_flight::SingleFlight;
pub use state::{transition, SummaryEvent, SummaryState};
pub use stats::{ReportType, StatisticsReport, TrendBucket};
