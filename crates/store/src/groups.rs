use crate::backend::StorageBackend;
use crate::error::Result;
use crate::journal::{Journal, JournalWriter};
use error_collector_protocol::ErrorGroup;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const COLLECTION: &str = "groups";

/// Persisted group membership. The grouping engine owns the live view and
/// writes every change through here.
#[derive(Debug)]
pub struct GroupStore {
    journal: Journal<ErrorGroup>,
    groups: RwLock<BTreeMap<u64, ErrorGroup>>,
}

impl GroupStore {
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let journal = Journal::<ErrorGroup>::new(backend, COLLECTION);
        let groups: BTreeMap<u64, ErrorGroup> = journal
            .replay()
            .await?
            .into_values()
            .map(|g| (g.group_id, g))
            .collect();
        log::info!("group store loaded ({} groups)", groups.len());
        Ok(Self {
            journal,
            groups: RwLock::new(groups),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<u64, ErrorGroup>> {
        self.groups.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<u64, ErrorGroup>> {
        self.groups.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts or replaces each group.
    pub async fn put_many(&self, groups: &[ErrorGroup]) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }
        let mut writer = self.journal.writer().await;
        for group in groups {
            writer.put(group).await?;
            self.write().insert(group.group_id, group.clone());
        }
        self.maybe_compact(&mut writer).await;
        Ok(())
    }

    pub async fn delete_many(&self, group_ids: &[u64]) -> Result<()> {
        let present: Vec<u64> = {
            let groups = self.read();
            group_ids
                .iter()
                .copied()
                .filter(|id| groups.contains_key(id))
                .collect()
        };
        if present.is_empty() {
            return Ok(());
        }
        let mut writer = self.journal.writer().await;
        let keys: Vec<String> = present.iter().map(u64::to_string).collect();
        writer.delete_many(&keys).await?;
        {
            let mut groups = self.write();
            for id in &present {
                groups.remove(id);
            }
        }
        self.maybe_compact(&mut writer).await;
        Ok(())
    }

    async fn maybe_compact(&self, writer: &mut JournalWriter<'_, ErrorGroup>) {
        let lines = {
            let groups = self.read();
            if !writer.should_compact(groups.len()) {
                return;
            }
            JournalWriter::snapshot(groups.values())
        };
        let result = match lines {
            Ok(lines) => writer.compact(lines).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            log::warn!("group journal compaction failed: {err}");
        }
    }

    pub fn get(&self, group_id: u64) -> Option<ErrorGroup> {
        self.read().get(&group_id).cloned()
    }

    /// Every stored group, ordered by id.
    pub fn all(&self) -> Vec<ErrorGroup> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
