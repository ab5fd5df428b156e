//! Append-only JSONL journal with periodic compaction.
//!
//! Every mutation is one line (`{"op":"put",...}` or `{"op":"delete",...}`)
//! appended before the in-memory view changes. Replaying the journal rebuilds
//! that view after a restart. A torn final line (crash mid-append) is dropped
//! and the file rewritten without it; a bad line anywhere else is corruption.

use crate::backend::StorageBackend;
use crate::error::{Result, StoreError};
use error_collector_protocol::{ErrorGroup, ErrorRecord, ErrorSummary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

const MIN_COMPACTION_LINES: usize = 1024;

pub(crate) trait Keyed {
    fn key(&self) -> String;
}

impl Keyed for ErrorRecord {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for ErrorSummary {
    fn key(&self) -> String {
        self.summary_id.clone()
    }
}

impl Keyed for ErrorGroup {
    fn key(&self) -> String {
        self.group_id.to_string()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Entry<T> {
    Put { value: T },
    Delete { key: String },
}

#[derive(Debug)]
pub(crate) struct Journal<T> {
    backend: Arc<dyn StorageBackend>,
    collection: &'static str,
    /// Lines in the journal; guarded together with every write.
    lines: Mutex<usize>,
    _marker: PhantomData<fn() -> T>,
}

/// Exclusive write access. Holders must apply their in-memory change before
/// dropping the writer so that compaction never snapshots a stale view.
pub(crate) struct JournalWriter<'a, T> {
    journal: &'a Journal<T>,
    lines: MutexGuard<'a, usize>,
}

impl<T> Journal<T>
where
    T: Serialize + DeserializeOwned + Keyed,
{
    pub(crate) fn new(backend: Arc<dyn StorageBackend>, collection: &'static str) -> Self {
        Self {
            backend,
            collection,
            lines: Mutex::new(0),
            _marker: PhantomData,
        }
    }

    /// Rebuilds the live values, keyed by their journal key.
    pub(crate) async fn replay(&self) -> Result<BTreeMap<String, T>> {
        let mut lines = self.lines.lock().await;
        let raw = self.backend.read_lines(self.collection).await?;
        let total = raw.len();
        let mut live = BTreeMap::new();
        let mut torn = false;

        for (idx, line) in raw.iter().enumerate() {
            match serde_json::from_str::<Entry<T>>(line) {
                Ok(Entry::Put { value }) => {
                    live.insert(value.key(), value);
                }
                Ok(Entry::Delete { key }) => {
                    live.remove(&key);
                }
                Err(err) if idx + 1 == total => {
                    log::warn!(
                        "dropping torn final line in {}: {err}",
                        self.backend.describe(self.collection).display()
                    );
                    torn = true;
                }
                Err(source) => {
                    return Err(StoreError::CorruptJournal {
                        path: self.backend.describe(self.collection),
                        line: idx + 1,
                        source,
                    });
                }
            }
        }

        *lines = total;
        if torn {
            // Later appends would otherwise land behind the broken line.
            self.backend
                .replace_lines(self.collection, &raw[..total - 1])
                .await?;
            *lines = total - 1;
        }
        log::debug!("replayed {} ({} live of {total} lines)", self.collection, live.len());
        Ok(live)
    }

    pub(crate) async fn writer(&self) -> JournalWriter<'_, T> {
        JournalWriter {
            journal: self,
            lines: self.lines.lock().await,
        }
    }
}

impl<T> JournalWriter<'_, T>
where
    T: Serialize + DeserializeOwned + Keyed,
{
    pub(crate) async fn put(&mut self, value: &T) -> Result<()> {
        let line = serde_json::to_string(&Entry::Put { value })?;
        self.append(vec![line]).await
    }

    pub(crate) async fn delete_many(&mut self, keys: &[String]) -> Result<()> {
        let lines = keys
            .iter()
            .map(|key| serde_json::to_string(&Entry::<&T>::Delete { key: key.clone() }))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.append(lines).await
    }

    /// Puts `value` and deletes `keys` in one append, so either both land
    /// or neither does.
    pub(crate) async fn put_and_delete(&mut self, value: &T, keys: &[String]) -> Result<()> {
        let mut lines = vec![serde_json::to_string(&Entry::Put { value })?];
        for key in keys {
            lines.push(serde_json::to_string(&Entry::<&T>::Delete { key: key.clone() })?);
        }
        self.append(lines).await
    }

    async fn append(&mut self, lines: Vec<String>) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        self.journal
            .backend
            .append_lines(self.journal.collection, &lines)
            .await?;
        *self.lines += lines.len();
        Ok(())
    }

    pub(crate) fn should_compact(&self, live: usize) -> bool {
        *self.lines > MIN_COMPACTION_LINES.max(live.saturating_mul(2))
    }

    /// Rewrites the journal as one `put` per live value.
    pub(crate) async fn compact(&mut self, live: Vec<String>) -> Result<()> {
        let count = live.len();
        self.journal
            .backend
            .replace_lines(self.journal.collection, &live)
            .await?;
        log::info!(
            "compacted {} from {} to {count} lines",
            self.journal.collection,
            *self.lines
        );
        *self.lines = count;
        Ok(())
    }

    /// Serializes `values` as compaction lines; call while the in-memory view
    /// is borrowed, then pass the result to [`Self::compact`].
    pub(crate) fn snapshot<'v>(values: impl Iterator<Item = &'v T>) -> Result<Vec<String>>
    where
        T: 'v,
    {
        values
            .map(|value| serde_json::to_string(&Entry::Put { value }).map_err(Into::into))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use chrono::Utc;
    use error_collector_protocol::{Category, ErrorSource, Severity};

    fn record(id: &str) -> ErrorRecord {
        let now = Utc::now();
        ErrorRecord {
            id: id.to_string(),
            timestamp: now,
            source: ErrorSource::Browser,
            message: format!("boom {id}"),
            stack_trace: None,
            context: Default::default(),
            severity: Severity::High,
            category: Category::Runtime,
            fingerprint: id.to_string(),
            occurrence_count: 1,
            last_seen: now,
        }
    }

    #[tokio::test]
    async fn replay_applies_puts_and_deletes_in_order() {
        let backend = Arc::new(MemoryBackend::new());
        let journal: Journal<ErrorRecord> = Journal::new(backend.clone(), "errors");
        {
            let mut w = journal.writer().await;
            w.put(&record("a")).await.unwrap();
            w.put(&record("b")).await.unwrap();
            w.delete_many(&["a".to_string()]).await.unwrap();
        }
        let live = journal.replay().await.unwrap();
        assert_eq!(live.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn put_and_delete_share_one_append() {
        let backend = Arc::new(MemoryBackend::new());
        let journal: Journal<ErrorRecord> = Journal::new(backend.clone(), "errors");
        journal.writer().await.put(&record("old")).await.unwrap();

        backend.set_failing(true);
        let failed = journal
            .writer()
            .await
            .put_and_delete(&record("new"), &["old".to_string()])
            .await;
        assert!(failed.is_err());
        backend.set_failing(false);
        assert_eq!(journal.replay().await.unwrap().keys().collect::<Vec<_>>(), vec!["old"]);

        journal
            .writer()
            .await
            .put_and_delete(&record("new"), &["old".to_string()])
            .await
            .unwrap();
        assert_eq!(journal.replay().await.unwrap().keys().collect::<Vec<_>>(), vec!["new"]);
    }

    #[tokio::test]
    async fn torn_tail_is_repaired_but_mid_file_garbage_is_not() {
        let backend = Arc::new(MemoryBackend::new());
        let journal: Journal<ErrorRecord> = Journal::new(backend.clone(), "errors");
        journal.writer().await.put(&record("a")).await.unwrap();
        backend
            .append_lines("errors", &["{\"op\":\"put\",\"val".to_string()])
            .await
            .unwrap();
        assert_eq!(journal.replay().await.unwrap().len(), 1);

        journal.writer().await.put(&record("b")).await.unwrap();
        assert_eq!(journal.replay().await.unwrap().len(), 2);

        let mut lines = backend.read_lines("errors").await.unwrap();
        lines.insert(1, "not json".to_string());
        backend.replace_lines("errors", &lines).await.unwrap();
        let err = journal.replay().await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptJournal { line: 2, .. }));
    }

    #[tokio::test]
    async fn compaction_keeps_only_live_values() {
        let backend = Arc::new(MemoryBackend::new());
        let journal: Journal<ErrorRecord> = Journal::new(backend.clone(), "errors");
        let keep = record("keep");
        {
            let mut w = journal.writer().await;
            for i in 0..5 {
                w.put(&record(&format!("tmp{i}"))).await.unwrap();
            }
            w.put(&keep).await.unwrap();
            let lines = JournalWriter::snapshot(std::iter::once(&keep)).unwrap();
            w.compact(lines).await.unwrap();
        }
        assert_eq!(backend.line_count("errors"), 1);
        assert_eq!(journal.replay().await.unwrap()["keep"], keep);
    }
}
