//! Line-oriented durable storage.
//!
//! A backend stores named collections as ordered lists of lines. Appends must
//! be durable before they return; `replace` must be atomic (readers see either
//! the old or the new contents, never a mix).

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    async fn read_lines(&self, collection: &str) -> Result<Vec<String>>;

    async fn append_lines(&self, collection: &str, lines: &[String]) -> Result<()>;

    async fn replace_lines(&self, collection: &str, lines: &[String]) -> Result<()>;

    /// Location of a collection, for diagnostics.
    fn describe(&self, collection: &str) -> PathBuf;
}

/// One `<collection>.jsonl` file per collection under `dir`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::unavailable("create data dir", e))?;
        Ok(Self { dir })
    }

    fn path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.jsonl"))
    }
}

fn join_lines(lines: &[String]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }
    buf
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read_lines(&self, collection: &str) -> Result<Vec<String>> {
        let path = self.path(collection);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(raw
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::unavailable("read journal", e)),
        }
    }

    async fn append_lines(&self, collection: &str, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let path = self.path(collection);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::unavailable("open journal", e))?;
        file.write_all(&join_lines(lines))
            .await
            .map_err(|e| StoreError::unavailable("append journal", e))?;
        file.sync_data()
            .await
            .map_err(|e| StoreError::unavailable("sync journal", e))?;
        Ok(())
    }

    async fn replace_lines(&self, collection: &str, lines: &[String]) -> Result<()> {
        let path = self.path(collection);
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, join_lines(lines))
            .await
            .map_err(|e| StoreError::unavailable("write compacted journal", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::unavailable("swap compacted journal", e))?;
        Ok(())
    }

    fn describe(&self, collection: &str) -> PathBuf {
        self.path(collection)
    }
}

/// Volatile backend. `set_failing(true)` makes every call fail with an I/O
/// error, which is how outage behaviour is exercised; `set_collection_failing`
/// does the same for one collection.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, Vec<String>>>,
    failing: AtomicBool,
    failing_collections: Mutex<HashSet<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_collection_failing(&self, collection: &str, failing: bool) {
        let mut failing_collections = self
            .failing_collections
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if failing {
            failing_collections.insert(collection.to_string());
        } else {
            failing_collections.remove(collection);
        }
    }

    pub fn line_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(collection)
            .map_or(0, Vec::len)
    }

    fn check(&self, operation: &'static str, collection: &str) -> Result<()> {
        let collection_down = self
            .failing_collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(collection);
        if collection_down || self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(
                operation,
                io::Error::new(io::ErrorKind::Other, "memory backend switched off"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read_lines(&self, collection: &str) -> Result<Vec<String>> {
        self.check("read journal", collection)?;
        Ok(self
            .collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_lines(&self, collection: &str, lines: &[String]) -> Result<()> {
        self.check("append journal", collection)?;
        self.collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(collection.to_string())
            .or_default()
            .extend(lines.iter().cloned());
        Ok(())
    }

    async fn replace_lines(&self, collection: &str, lines: &[String]) -> Result<()> {
        self.check("write compacted journal", collection)?;
        self.collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(collection.to_string(), lines.to_vec());
        Ok(())
    }

    fn describe(&self, collection: &str) -> PathBuf {
        PathBuf::from(format!("memory://{collection}"))
    }
}
