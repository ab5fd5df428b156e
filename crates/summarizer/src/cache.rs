use error_collector_normalizer::hex_encode_lower;
use error_collector_protocol::ErrorSummary;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct CacheEntry {
    summary: ErrorSummary,
    inserted_at: Instant,
}

/// LRU of recent summaries keyed by the fingerprint set they cover.
#[derive(Debug)]
pub struct SummaryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

/// SHA-256 over the sorted, deduplicated fingerprints.
pub fn cache_key<'a>(fingerprints: impl IntoIterator<Item = &'a str>) -> String {
    let sorted: BTreeSet<&str> = fingerprints.into_iter().collect();
    let mut hasher = Sha256::new();
    for fp in sorted {
        hasher.update(fp.as_bytes());
        hasher.update(b"\n");
    }
    hex_encode_lower(&hasher.finalize())
}

fn same_ids(a: &[String], b: &[String]) -> bool {
    let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}

impl SummaryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// A fresh entry for the same ids comes back unchanged. Different ids with
    /// the same fingerprints get the cached analysis under `rebind_id`.
    pub fn get(&self, key: &str, error_ids: &[String], rebind_id: impl FnOnce() -> String) -> Option<ErrorSummary> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = entries
            .get(key)
            .map(|entry| entry.inserted_at.elapsed() < self.ttl)?;
        if !fresh {
            entries.pop(key);
            return None;
        }
        let entry = entries.get(key)?;
        if same_ids(&entry.summary.error_ids, error_ids) {
            return Some(entry.summary.clone());
        }
        let mut rebound = entry.summary.clone();
        rebound.summary_id = rebind_id();
        rebound.error_ids = error_ids.to_vec();
        rebound.group_id = None;
        rebound.processing_time_ms = 0;
        Some(rebound)
    }

    pub fn insert(&self, key: String, summary: ErrorSummary) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(
            key,
            CacheEntry {
                summary,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(id: &str, error_ids: &[&str]) -> ErrorSummary {
        ErrorSummary {
            summary_id: id.to_string(),
            error_ids: error_ids.iter().map(|s| s.to_string()).collect(),
            group_id: Some(3),
            root_cause: "cause".into(),
            impact_assessment: "impact".into(),
            suggested_solutions: vec!["fix".into()],
            confidence_score: 0.9,
            generated_at: Utc::now(),
            model_used: "m".into(),
            processing_time_ms: 12,
        }
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn key_ignores_order_and_duplicates() {
        assert_eq!(cache_key(["b", "a", "a"]), cache_key(["a", "b"]));
        assert_ne!(cache_key(["a"]), cache_key(["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn hit_rebinds_for_a_different_id_set() {
        let cache = SummaryCache::new(4, Duration::from_secs(60));
        cache.insert("k".into(), summary("s1", &["e1", "e2"]));

        let same = cache.get("k", &ids(&["e2", "e1"]), || "unused".into()).unwrap();
        assert_eq!(same.summary_id, "s1");

        let rebound = cache.get("k", &ids(&["e3"]), || "s2".into()).unwrap();
        assert_eq!(rebound.summary_id, "s2");
        assert_eq!(rebound.error_ids, ids(&["e3"]));
        assert_eq!(rebound.group_id, None);
        assert_eq!(rebound.root_cause, "cause");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = SummaryCache::new(4, Duration::from_secs(60));
        cache.insert("k".into(), summary("s1", &["e1"]));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("k", &ids(&["e1"]), || "x".into()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let cache = SummaryCache::new(1, Duration::from_secs(60));
        cache.insert("a".into(), summary("s1", &["e1"]));
        cache.insert("b".into(), summary("s2", &["e2"]));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("a", &ids(&["e1"]), || "x".into()).is_none());
    }
}
