use crate::backend::StorageBackend;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::journal::{Journal, JournalWriter};
use chrono::{DateTime, Utc};
use error_collector_normalizer::NormalizedError;
use error_collector_protocol::{Category, ErrorRecord, ErrorSource, Severity, SharedClock};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

const COLLECTION: &str = "errors";

type TimeKey = (Reverse<DateTime<Utc>>, String);

/// Filters for [`ErrorStore::query`]. Empty sets match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub sources: Vec<ErrorSource>,
    pub categories: Vec<Category>,
    pub severities: Vec<Severity>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ErrorFilter {
    pub fn matches(&self, record: &ErrorRecord) -> bool {
        self.since.map_or(true, |s| record.timestamp >= s)
            && self.until.map_or(true, |u| record.timestamp <= u)
            && (self.sources.is_empty() || self.sources.contains(&record.source))
            && (self.categories.is_empty() || self.categories.contains(&record.category))
            && (self.severities.is_empty() || self.severities.contains(&record.severity))
    }
}

/// One page of a query, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPage {
    pub records: Vec<ErrorRecord>,
    /// Matches before pagination.
    pub total: usize,
    pub next_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: String,
    pub is_duplicate: bool,
    pub occurrence_count: u64,
    pub fingerprint: String,
    /// Records evicted to make room under the storage cap.
    pub evicted: Vec<String>,
}

#[derive(Debug, Default)]
struct ErrorIndex {
    records: HashMap<String, ErrorRecord>,
    /// Most recent record per fingerprint.
    by_fingerprint: HashMap<String, String>,
    by_time: BTreeSet<TimeKey>,
    by_source: HashMap<ErrorSource, HashSet<String>>,
    by_category: HashMap<Category, HashSet<String>>,
    by_severity: HashMap<Severity, HashSet<String>>,
    pinned: HashSet<String>,
}

impl ErrorIndex {
    fn insert(&mut self, record: ErrorRecord) {
        if let Some(previous) = self.records.get(&record.id) {
            if previous.timestamp != record.timestamp {
                self.by_time
                    .remove(&(Reverse(previous.timestamp), previous.id.clone()));
            }
        }
        self.by_time
            .insert((Reverse(record.timestamp), record.id.clone()));
        self.by_source
            .entry(record.source)
            .or_default()
            .insert(record.id.clone());
        self.by_category
            .entry(record.category)
            .or_default()
            .insert(record.id.clone());
        self.by_severity
            .entry(record.severity)
            .or_default()
            .insert(record.id.clone());

        let newer = match self
            .by_fingerprint
            .get(&record.fingerprint)
            .and_then(|id| self.records.get(id))
        {
            Some(current) => current.id == record.id || current.last_seen <= record.last_seen,
            None => true,
        };
        if newer {
            self.by_fingerprint
                .insert(record.fingerprint.clone(), record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &str) -> Option<ErrorRecord> {
        let record = self.records.remove(id)?;
        self.by_time
            .remove(&(Reverse(record.timestamp), record.id.clone()));
        if let Some(ids) = self.by_source.get_mut(&record.source) {
            ids.remove(id);
        }
        if let Some(ids) = self.by_category.get_mut(&record.category) {
            ids.remove(id);
        }
        if let Some(ids) = self.by_severity.get_mut(&record.severity) {
            ids.remove(id);
        }
        if self.by_fingerprint.get(&record.fingerprint).map(String::as_str) == Some(id) {
            self.by_fingerprint.remove(&record.fingerprint);
        }
        self.pinned.remove(id);
        Some(record)
    }

    /// Ids allowed by the source/category/severity indexes, or `None` when no
    /// dimension is restricted.
    fn candidates(&self, filter: &ErrorFilter) -> Option<HashSet<&str>> {
        fn union<'a, K: std::hash::Hash + Eq>(
            index: &'a HashMap<K, HashSet<String>>,
            keys: &[K],
        ) -> HashSet<&'a str> {
            keys.iter()
                .filter_map(|k| index.get(k))
                .flat_map(|ids| ids.iter().map(String::as_str))
                .collect()
        }

        let mut restricted: Vec<HashSet<&str>> = Vec::new();
        if !filter.sources.is_empty() {
            restricted.push(union(&self.by_source, &filter.sources));
        }
        if !filter.categories.is_empty() {
            restricted.push(union(&self.by_category, &filter.categories));
        }
        if !filter.severities.is_empty() {
            restricted.push(union(&self.by_severity, &filter.severities));
        }
        restricted.sort_by_key(HashSet::len);
        let mut iter = restricted.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, |acc, next| {
            acc.into_iter().filter(|id| next.contains(id)).collect()
        }))
    }

    /// Matching records in query order, starting strictly after `after`.
    fn scan<'a>(
        &'a self,
        filter: &'a ErrorFilter,
        after: Option<&TimeKey>,
    ) -> impl Iterator<Item = &'a ErrorRecord> + 'a {
        let candidates = self.candidates(filter);
        let lower = match (after, filter.until) {
            (Some(key), _) => Bound::Excluded(key.clone()),
            (None, Some(until)) => Bound::Included((Reverse(until), String::new())),
            (None, None) => Bound::Unbounded,
        };
        let since = filter.since;
        self.by_time
            .range((lower, Bound::Unbounded))
            .take_while(move |(Reverse(ts), _)| since.map_or(true, |s| *ts >= s))
            .filter(move |(_, id)| {
                candidates
                    .as_ref()
                    .map_or(true, |set| set.contains(id.as_str()))
            })
            .filter_map(move |(_, id)| self.records.get(id))
            .filter(move |record| filter.matches(record))
    }

    fn eviction_victim(&self) -> Option<String> {
        let mut oldest_first = self.by_time.iter().rev();
        let fallback = self.by_time.iter().next_back().map(|(_, id)| id.clone());
        oldest_first
            .find(|(_, id)| !self.pinned.contains(id))
            .map(|(_, id)| id.clone())
            .or(fallback)
    }
}

/// Durable, deduplicating collection of [`ErrorRecord`]s.
#[derive(Debug)]
pub struct ErrorStore {
    journal: Journal<ErrorRecord>,
    index: RwLock<ErrorIndex>,
    fingerprint_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    config: StoreConfig,
    clock: SharedClock,
}

impl ErrorStore {
    pub async fn open(
        backend: Arc<dyn StorageBackend>,
        config: StoreConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        let journal = Journal::<ErrorRecord>::new(backend, COLLECTION);
        let mut index = ErrorIndex::default();
        for record in journal.replay().await?.into_values() {
            index.insert(record);
        }
        log::info!("error store loaded ({} records)", index.records.len());
        Ok(Self {
            journal,
            index: RwLock::new(index),
            fingerprint_locks: Mutex::new(HashMap::new()),
            config,
            clock,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, ErrorIndex> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ErrorIndex> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Stores `error`, or bumps the record that shares its fingerprint when
    /// that record was last seen within the dedup window.
    ///
    /// Registrations of one fingerprint are serialized; a failed durable write
    /// fails the call and leaves the store unchanged.
    pub async fn register(&self, error: NormalizedError) -> Result<Registration> {
        let fingerprint = error.fingerprint();
        let lock = self.fingerprint_lock(&fingerprint);
        let outcome = {
            let _guard = lock.lock().await;
            self.register_locked(error, fingerprint.clone()).await
        };
        self.release_fingerprint_lock(&fingerprint, lock);
        outcome
    }

    fn fingerprint_lock(&self, fingerprint: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.fingerprint_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(fingerprint.to_string())
            .or_default()
            .clone()
    }

    fn release_fingerprint_lock(&self, fingerprint: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .fingerprint_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // One reference in the map plus ours means nobody else is waiting.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(fingerprint);
        }
    }

    async fn register_locked(
        &self,
        error: NormalizedError,
        fingerprint: String,
    ) -> Result<Registration> {
        let now = self.clock.now();
        let existing = {
            let index = self.read();
            index
                .by_fingerprint
                .get(&fingerprint)
                .and_then(|id| index.records.get(id))
                .filter(|r| now - r.last_seen <= self.config.dedup_window())
                .cloned()
        };

        let mut writer = self.journal.writer().await;

        if let Some(mut record) = existing {
            record.occurrence_count += 1;
            record.last_seen = record.last_seen.max(now);
            writer.put(&record).await?;
            let registration = Registration {
                id: record.id.clone(),
                is_duplicate: true,
                occurrence_count: record.occurrence_count,
                fingerprint,
                evicted: Vec::new(),
            };
            log::debug!(
                "duplicate {} (occurrences={})",
                record.id,
                record.occurrence_count
            );
            self.write().insert(record);
            self.maybe_compact(&mut writer).await;
            return Ok(registration);
        }

        let evicted = {
            let index = self.read();
            if index.records.len() >= self.config.max_records.max(1) {
                index.eviction_victim().into_iter().collect::<Vec<_>>()
            } else {
                Vec::new()
            }
        };
        let record = ErrorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: error.timestamp,
            source: error.source,
            message: error.message,
            stack_trace: error.stack_trace,
            context: error.context,
            severity: error.severity,
            category: error.category,
            fingerprint: fingerprint.clone(),
            occurrence_count: 1,
            last_seen: now.max(error.timestamp),
        };
        // New record and evictions are journaled together; memory follows
        // only once both are durable.
        writer.put_and_delete(&record, &evicted).await?;
        if !evicted.is_empty() {
            let mut index = self.write();
            for id in &evicted {
                index.remove(id);
            }
            log::warn!("storage cap reached; evicted {evicted:?}");
        }
        let registration = Registration {
            id: record.id.clone(),
            is_duplicate: false,
            occurrence_count: 1,
            fingerprint,
            evicted,
        };
        log::debug!("registered {} ({})", record.id, record.category);
        self.write().insert(record);
        self.maybe_compact(&mut writer).await;
        Ok(registration)
    }

    async fn maybe_compact(&self, writer: &mut JournalWriter<'_, ErrorRecord>) {
        let lines = {
            let index = self.read();
            if !writer.should_compact(index.records.len()) {
                return;
            }
            JournalWriter::snapshot(index.records.values())
        };
        // The mutation is already durable; a failed rewrite only costs disk.
        let result = match lines {
            Ok(lines) => writer.compact(lines).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            log::warn!("error journal compaction failed: {err}");
        }
    }

    pub fn get(&self, id: &str) -> Option<ErrorRecord> {
        self.read().records.get(id).cloned()
    }

    /// Records for `ids` that still exist, in the order given.
    pub fn get_many(&self, ids: &[String]) -> Vec<ErrorRecord> {
        let index = self.read();
        ids.iter()
            .filter_map(|id| index.records.get(id).cloned())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest first; equal timestamps ordered by id.
    pub fn query(&self, filter: &ErrorFilter) -> ErrorPage {
        let index = self.read();
        let matching: Vec<&ErrorRecord> = index.scan(filter, None).collect();
        let total = matching.len();
        let limit = filter.limit.unwrap_or(usize::MAX);
        let records: Vec<ErrorRecord> = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .cloned()
            .collect();
        let consumed = filter.offset.saturating_add(records.len());
        ErrorPage {
            records,
            total,
            next_offset: (consumed < total).then_some(consumed),
        }
    }

    /// Lazy cursor over every match of `filter` (its limit/offset are ignored).
    pub fn cursor(&self, filter: ErrorFilter, page_size: usize) -> ErrorCursor<'_> {
        ErrorCursor {
            store: self,
            filter,
            page_size: page_size.max(1),
            after: None,
            buffer: Vec::new(),
            exhausted: false,
        }
    }

    /// All matching records, unpaginated.
    pub fn matching(&self, filter: &ErrorFilter) -> Vec<ErrorRecord> {
        let index = self.read();
        index.scan(filter, None).cloned().collect()
    }

    /// Protects ids from cap eviction (e.g. members of a group awaiting summary).
    pub fn pin<I: IntoIterator<Item = String>>(&self, ids: I) {
        self.write().pinned.extend(ids);
    }

    pub fn unpin<'a, I: IntoIterator<Item = &'a String>>(&self, ids: I) {
        let mut index = self.write();
        for id in ids {
            index.pinned.remove(id);
        }
    }

    /// Ids whose `last_seen` is before `cutoff`.
    pub fn ids_last_seen_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let index = self.read();
        let mut ids: Vec<String> = index
            .records
            .values()
            .filter(|r| r.last_seen < cutoff)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Deletes `ids` (missing ids are ignored) and returns those removed.
    pub async fn delete_many(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut writer = self.journal.writer().await;
        let present: Vec<String> = {
            let index = self.read();
            ids.iter()
                .filter(|id| index.records.contains_key(*id))
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

    pub fn counts_by_source(&self) -> HashMap<ErrorSource, usize> {
        let index = self.read();
        index.by_source.iter().map(|(k, v)| (*k, v.len())).collect()
    }

    pub fn counts_by_category(&self) -> HashMap<Category, usize> {
        let index = self.read();
        index.by_category.iter().map(|(k, v)| (*k, v.len())).collect()
    }

    pub fn counts_by_severity(&self) -> HashMap<Severity, usize> {
        let index = self.read();
        index.by_severity.iter().map(|(k, v)| (*k, v.len())).collect()
    }

    pub fn oldest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.read().by_time.iter().next_back().map(|(Reverse(ts), _)| *ts)
    }
}

/// Restartable keyset cursor: new records inserted behind the cursor
/// position never shift the pages still to come.
pub struct ErrorCursor<'a> {
    store: &'a ErrorStore,
    filter: ErrorFilter,
    page_size: usize,
    after: Option<TimeKey>,
    buffer: Vec<ErrorRecord>,
    exhausted: bool,
}

impl ErrorCursor<'_> {
    pub fn next_page(&mut self) -> Vec<ErrorRecord> {
        if !self.buffer.is_empty() {
            let mut rest = std::mem::take(&mut self.buffer);
            rest.reverse();
            return rest;
        }
        if self.exhausted {
            return Vec::new();
        }
        let page: Vec<ErrorRecord> = {
            let index = self.store.read();
            index
                .scan(&self.filter, self.after.as_ref())
                .take(self.page_size)
                .cloned()
                .collect()
        };
        match page.last() {
            Some(last) => self.after = Some((Reverse(last.timestamp), last.id.clone())),
            None => self.exhausted = true,
        }
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        page
    }

    pub fn rewind(&mut self) {
        self.after = None;
        self.buffer.clear();
        self.exhausted = false;
    }
}

impl Iterator for ErrorCursor<'_> {
    type Item = ErrorRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            let mut page = self.next_page();
            if page.is_empty() {
                return None;
            }
            page.reverse();
            self.buffer = page;
        }
        self.buffer.pop()
    }
}
