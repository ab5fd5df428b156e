//! # Error Collector Grouping
//!
//! Clusters error records whose canonical messages are near-identical.
//!
//! ```text
//! ErrorRecord ──canonical_message──> score vs. open groups (same source + category)
//!                                        │
//!                     best ≥ threshold ──┼── join (may promote representative)
//!                                        └── otherwise open a new group
//! ```
//!
//! Groups close on size or age and are never reopened. Changing the threshold
//! deprecates every live group and regroups from scratch.
//!
//! ## Example
//!
//! ```no_run
//! use error_collector_grouping::{GroupingConfig, GroupingEngine};
//! # fn records() -> Vec<error_collector_protocol::ErrorRecord> { Vec::new() }
//!
//! let mut engine = GroupingEngine::new(GroupingConfig::default());
//! for record in records() {
//!     let assignment = engine.assign(&record, chrono::Utc::now());
//!     println!("{} -> group {}", record.id, assignment.group_id);
//! }
//! ```

mod config;
mod engine;
mod similarity;

pub use config::{
    GroupingConfig, DEFAULT_MAX_GROUP_AGE_SECS, DEFAULT_MAX_GROUP_SIZE,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use engine::{Assignment, GroupingEngine, Retune};
pub use similarity::{jaccard, levenshtein_similarity, similarity, tokens};
