use crate::backend::StorageBackend;
use crate::error::{Result, StoreError};
use crate::journal::{Journal, JournalWriter};
use chrono::{DateTime, Utc};
use error_collector_protocol::ErrorSummary;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const COLLECTION: &str = "summaries";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_confidence: Option<f64>,
    /// Keep summaries covering at least one of these errors.
    pub error_ids: Vec<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SummaryFilter {
    fn matches(&self, summary: &ErrorSummary) -> bool {
        self.since.map_or(true, |s| summary.generated_at >= s)
            && self.until.map_or(true, |u| summary.generated_at <= u)
            && self
                .min_confidence
                .map_or(true, |c| summary.confidence_score >= c)
            && (self.error_ids.is_empty() || self.error_ids.iter().any(|id| summary.covers(id)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total: usize,
    pub high_confidence: usize,
    pub average_confidence: f64,
    pub errors_covered: usize,
}

#[derive(Debug, Default)]
struct SummaryIndex {
    summaries: HashMap<String, ErrorSummary>,
    by_error: HashMap<String, BTreeSet<String>>,
}

impl SummaryIndex {
    fn insert(&mut self, summary: ErrorSummary) {
        for error_id in &summary.error_ids {
            self.by_error
                .entry(error_id.clone())
                .or_default()
                .insert(summary.summary_id.clone());
        }
        self.summaries.insert(summary.summary_id.clone(), summary);
    }

    fn remove(&mut self, summary_id: &str) -> Option<ErrorSummary> {
        let summary = self.summaries.remove(summary_id)?;
        for error_id in &summary.error_ids {
            if let Some(ids) = self.by_error.get_mut(error_id) {
                ids.remove(summary_id);
                if ids.is_empty() {
                    self.by_error.remove(error_id);
                }
            }
        }
        Some(summary)
    }
}

fn newest_first(a: &ErrorSummary, b: &ErrorSummary) -> std::cmp::Ordering {
    b.generated_at
        .cmp(&a.generated_at)
        .then_with(|| a.summary_id.cmp(&b.summary_id))
}

/// Immutable summaries: once stored, a summary is only ever removed.
#[derive(Debug)]
pub struct SummaryStore {
    journal: Journal<ErrorSummary>,
    index: RwLock<SummaryIndex>,
}

impl SummaryStore {
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let journal = Journal::<ErrorSummary>::new(backend, COLLECTION);
        let mut index = SummaryIndex::default();
        for summary in journal.replay().await?.into_values() {
            index.insert(summary);
        }
        log::info!("summary store loaded ({} summaries)", index.summaries.len());
        Ok(Self {
            journal,
            index: RwLock::new(index),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, SummaryIndex> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SummaryIndex> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn put(&self, summary: ErrorSummary) -> Result<()> {
        let mut writer = self.journal.writer().await;
        if self.read().summaries.contains_key(&summary.summary_id) {
            return Err(StoreError::AlreadyExists {
                kind: "summary",
                id: summary.summary_id,
            });
        }
        writer.put(&summary).await?;
        self.write().insert(summary);
        self.maybe_compact(&mut writer).await;
        Ok(())
    }

    async fn maybe_compact(&self, writer: &mut JournalWriter<'_, ErrorSummary>) {
        let lines = {
            let index = self.read();
            if !writer.should_compact(index.summaries.len()) {
                return;
            }
            JournalWriter::snapshot(index.summaries.values())
        };
        let result = match lines {
            Ok(lines) => writer.compact(lines).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            log::warn!("summary journal compaction failed: {err}");
        }
    }

    pub fn get(&self, summary_id: &str) -> Option<ErrorSummary> {
        self.read().summaries.get(summary_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest priority first, then most recent.
    pub fn list(&self, filter: &SummaryFilter) -> Vec<ErrorSummary> {
        let mut out: Vec<ErrorSummary> = self
            .read()
            .summaries
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.priority_score()
                .total_cmp(&a.priority_score())
                .then_with(|| newest_first(a, b))
        });
        out.into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Summaries covering `error_id`, most confident first, then most recent.
    pub fn for_error(&self, error_id: &str) -> Vec<ErrorSummary> {
        let index = self.read();
        let mut out: Vec<ErrorSummary> = index
            .by_error
            .get(error_id)
            .into_iter()
            .flatten()
            .filter_map(|id| index.summaries.get(id).cloned())
            .collect();
        out.sort_by(|a, b| {
            b.confidence_score
                .total_cmp(&a.confidence_score)
                .then_with(|| newest_first(a, b))
        });
        out
    }

    pub fn latest_for_group(&self, group_id: u64) -> Option<ErrorSummary> {
        self.read()
            .summaries
            .values()
            .filter(|s| s.group_id == Some(group_id))
            .min_by(|a, b| newest_first(a, b))
            .cloned()
    }

    /// Summary ids with no surviving reference according to `alive`.
    pub fn orphaned(&self, alive: impl Fn(&str) -> bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .read()
            .summaries
            .values()
            .filter(|s| !s.error_ids.iter().any(|id| alive(id)))
            .map(|s| s.summary_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn delete_many(&self, summary_ids: &[String]) -> Result<Vec<String>> {
        let mut writer = self.journal.writer().await;
        let present: Vec<String> = {
            let index = self.read();
            summary_ids
                .iter()
                .filter(|id| index.summaries.contains_key(*id))
                .cloned()
                .collect()
        };
        if present.is_empty() {
            return Ok(present);
        }
        writer.delete_many(&present).await?;
        {
            let mut index = self.write();
            for id in &present {
                index.remove(id);
            }
        }
        self.maybe_compact(&mut writer).await;
        Ok(present)
    }

    pub fn stats(&self) -> SummaryStats {
        let index = self.read();
        let total = index.summaries.len();
        let high_confidence = index
            .summaries
            .values()
            .filter(|s| s.is_high_confidence())
            .count();
        let average_confidence = if total == 0 {
            0.0
        } else {
            index
                .summaries
                .values()
                .map(|s| s.confidence_score)
                .sum::<f64>()
                / total as f64
        };
        SummaryStats {
            total,
            high_confidence,
            average_confidence,
            errors_covered: index.by_error.len(),
        }
    }
}
