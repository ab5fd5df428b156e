//! # Error Collector Store
//!
//! Durable storage for the three collections of the pipeline.
//!
//! ## Architecture
//!
//! ```text
//! Storage
//!   ├── ErrorStore    dedup by fingerprint, time/source/category/severity indexes
//!   ├── SummaryStore  immutable summaries, by-error index
//!   └── GroupStore    persisted grouping state
//!          │
//!          └──> Journal<T> (JSONL, append + compaction) ──> StorageBackend
//!                                                          (file | memory)
//! ```
//!
//! Writes hit the journal before the in-memory view; an I/O failure surfaces
//! as [`StoreError::StorageUnavailable`] and leaves the view unchanged.
//!
//! ## Example
//!
//! ```no_run
//! use error_collector_store::{FileBackend, Storage, StoreConfig};
//! use error_collector_protocol::SystemClock;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = Arc::new(FileBackend::open("/tmp/error-collector").await?);
//!     let storage = Storage::open(backend, StoreConfig::default(), Arc::new(SystemClock)).await?;
//!     let report = storage.purge_older_than(chrono::Duration::days(90)).await?;
//!     println!("purged {} errors", report.errors_removed.len());
//!     Ok(())
//! }
//! ```

mod backend;
mod config;
mod error;
mod errors;
mod groups;
mod journal;
mod summaries;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use errors::{ErrorCursor, ErrorFilter, ErrorPage, ErrorStore, Registration};
pub use groups::GroupStore;
pub use summaries::{SummaryFilter, SummaryStats, SummaryStore};

use error_collector_normalizer::canonical_message;
use error_collector_protocol::{ErrorGroup, ErrorRecord, SharedClock};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub errors_removed: Vec<String>,
    pub summaries_removed: Vec<String>,
    pub groups_removed: Vec<u64>,
    pub groups_updated: Vec<u64>,
}

impl PurgeReport {
    pub fn is_empty(&self) -> bool {
        self.errors_removed.is_empty()
            && self.summaries_removed.is_empty()
            && self.groups_removed.is_empty()
            && self.groups_updated.is_empty()
    }
}

/// The store as a whole: the single source of truth for record state.
#[derive(Debug)]
pub struct Storage {
    pub errors: ErrorStore,
    pub summaries: SummaryStore,
    pub groups: GroupStore,
    clock: SharedClock,
}

impl Storage {
    pub async fn open(
        backend: Arc<dyn StorageBackend>,
        config: StoreConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        Ok(Self {
            errors: ErrorStore::open(backend.clone(), config, clock.clone()).await?,
            summaries: SummaryStore::open(backend.clone()).await?,
            groups: GroupStore::open(backend).await?,
            clock,
        })
    }

    /// Removes records not seen for `horizon`, then cascades. Idempotent: a
    /// retry after a partial failure finishes the cascade.
    pub async fn purge_older_than(&self, horizon: chrono::Duration) -> Result<PurgeReport> {
        let cutoff = self.clock.now() - horizon;
        let expired = self.errors.ids_last_seen_before(cutoff);
        let removed = self.errors.delete_many(&expired).await?;
        let mut report = self.reconcile().await?;
        report.errors_removed = removed;
        if !report.is_empty() {
            log::info!(
                "purge before {cutoff}: {} errors, {} summaries, {} groups removed",
                report.errors_removed.len(),
                report.summaries_removed.len(),
                report.groups_removed.len()
            );
        }
        Ok(report)
    }

    /// Detaches error ids that no longer exist from groups and drops
    /// summaries left with no surviving error. Works from stored state alone,
    /// so it also repairs whatever an earlier failed cascade left behind.
    pub async fn reconcile(&self) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        let mut updated: Vec<ErrorGroup> = Vec::new();
        for mut group in self.groups.all() {
            let before = group.member_ids.len();
            group.member_ids.retain(|id| self.errors.contains(id));
            if group.member_ids.len() == before {
                continue;
            }
            if group.member_ids.is_empty() {
                report.groups_removed.push(group.group_id);
                continue;
            }
            if !self.errors.contains(&group.representative_id) {
                self.reelect_representative(&mut group);
            }
            report.groups_updated.push(group.group_id);
            updated.push(group);
        }
        self.groups.put_many(&updated).await?;
        self.groups.delete_many(&report.groups_removed).await?;

        let orphaned = self.summaries.orphaned(|id| self.errors.contains(id));
        report.summaries_removed = self.summaries.delete_many(&orphaned).await?;
        Ok(report)
    }

    /// Highest-severity surviving member; ties go to the lowest id.
    fn reelect_representative(&self, group: &mut ErrorGroup) {
        let mut best: Option<ErrorRecord> = None;
        for id in &group.member_ids {
            let Some(record) = self.errors.get(id) else {
                continue;
            };
            if best.as_ref().map_or(true, |b| record.severity > b.severity) {
                best = Some(record);
            }
        }
        if let Some(record) = best {
            group.representative_message = canonical_message(&record.message);
            group.representative_id = record.id;
            group.representative_severity = record.severity;
        }
    }
}
