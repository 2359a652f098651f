//! Storage engines underneath the transaction layer.
//!
//! A `Storage` only needs ordered point reads, ordered range scans and an
//! atomic batch apply. Conflict detection lives in the database oracle, so
//! engines stay small.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::KvError;

/// Buffered mutations of one transaction.
///
/// Range clears apply before point mutations, so a key set after a clear
/// survives it.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    clears: Vec<(Vec<u8>, Vec<u8>)>,
    mutations: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.clears.is_empty() && self.mutations.is_empty()
    }

    /// Half-open ranges removed by this write set.
    pub fn clears(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.clears
    }

    /// Point mutations: `Some(value)` sets, `None` clears.
    pub fn mutations(&self) -> &BTreeMap<Vec<u8>, Option<Vec<u8>>> {
        &self.mutations
    }

    pub(crate) fn set(&mut self, key: &[u8], value: &[u8]) {
        self.mutations.insert(key.to_vec(), Some(value.to_vec()));
    }

    pub(crate) fn clear(&mut self, key: &[u8]) {
        self.mutations.insert(key.to_vec(), None);
    }

    pub(crate) fn clear_range(&mut self, begin: &[u8], end: &[u8]) {
        if begin >= end {
            return;
        }
        let doomed: Vec<Vec<u8>> = self
            .mutations
            .range(begin.to_vec()..end.to_vec())
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.mutations.remove(&key);
        }
        self.clears.push((begin.to_vec(), end.to_vec()));
    }

    /// Local view of `key`: `Some(Some(v))` set here, `Some(None)` cleared
    /// here, `None` untouched.
    pub(crate) fn lookup(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        if let Some(m) = self.mutations.get(key) {
            return Some(m.as_deref());
        }
        if self.cleared(key) {
            return Some(None);
        }
        None
    }

    pub(crate) fn cleared(&self, key: &[u8]) -> bool {
        self.clears
            .iter()
            .any(|(b, e)| key >= b.as_slice() && key < e.as_slice())
    }

    /// Bytes counted against the transaction size limit.
    pub fn payload_bytes(&self) -> usize {
        let clears: usize = self.clears.iter().map(|(b, e)| b.len() + e.len()).sum();
        let mutations: usize = self
            .mutations
            .iter()
            .map(|(k, v)| k.len() + v.as_ref().map_or(0, |v| v.len()))
            .sum();
        clears + mutations
    }
}

/// Trait for ordered key-value engines.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    /// All entries in `[begin, end)`, in key order.
    fn scan(&self, begin: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;

    /// Apply every mutation atomically: readers see all of it or none of it.
    ///
    /// A retryable error means nothing was applied. Once the mutations may
    /// be visible, a failure must surface as `KvError::CommitUnknown`.
    fn apply(&self, writes: &WriteSet) -> Result<(), KvError>;
}

/// In-memory engine (BTreeMap-backed).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> KvError {
    KvError::Storage("memory storage lock poisoned".to_string())
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn scan(&self, begin: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        if begin >= end {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .range(begin.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, writes: &WriteSet) -> Result<(), KvError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        for (begin, end) in writes.clears() {
            let mut tail = entries.split_off(begin);
            let mut rest = tail.split_off(end);
            entries.append(&mut rest);
        }

        for (key, value) in writes.mutations() {
            match value {
                Some(v) => {
                    entries.insert(key.clone(), v.clone());
                }
                None => {
                    entries.remove(key);
                }
            }
        }

        Ok(())
    }
}

/// Durable engine on a sled tree.
///
/// Every apply is one sled batch followed by a flush, so a commit that
/// returned survives the process.
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    /// Open or create a sled database at `dir`.
    pub fn open(dir: &Path) -> Result<Self, KvError> {
        let db = sled::Config::new()
            .path(dir)
            .cache_capacity(1024 * 1024 * 64)
            .mode(sled::Mode::HighThroughput)
            .open()?;

        tracing::debug!(path = %dir.display(), "Opened sled storage");
        Ok(Self { db })
    }
}

impl Storage for SledStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn scan(&self, begin: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        if begin >= end {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for item in self.db.range(begin..end) {
            let (k, v) = item?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn apply(&self, writes: &WriteSet) -> Result<(), KvError> {
        let mut batch = sled::Batch::default();

        for (begin, end) in writes.clears() {
            for item in self.db.range(begin.as_slice()..end.as_slice()) {
                let (k, _) = item?;
                batch.remove(k);
            }
        }

        for (key, value) in writes.mutations() {
            match value {
                Some(v) => batch.insert(key.as_slice(), v.as_slice()),
                None => batch.remove(key.as_slice()),
            }
        }

        self.db.apply_batch(batch)?;
        self.db
            .flush()
            .map_err(|e| KvError::CommitUnknown(format!("flush after apply failed: {}", e)))?;
        Ok(())
    }
}

impl Drop for SledStorage {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            tracing::error!("Failed to flush sled storage on drop: {}", e);
        }
    }
}
