//! Database handle, commit oracle and the retry loop.
//!
//! Concurrency control is optimistic. A transaction reads live data while
//! recording what it read; at commit the oracle checks that nothing committed
//! after the transaction's read version touched its read set. A commit that
//! passes this check is applied to storage as one atomic batch.

use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::KvError;
use crate::storage::{MemoryStorage, SledStorage, Storage, WriteSet};
use crate::transaction::Transaction;

/// Number of recent commits kept for conflict checks.
const CONFLICT_WINDOW: usize = 4096;

/// Tunables for a `Database`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Hard per-transaction payload limit (keys plus values), in bytes.
    pub max_transaction_bytes: usize,
    /// Attempts `run` makes before giving up on retryable failures.
    pub retry_limit: u32,
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_transaction_bytes: 10_000_000,
            retry_limit: 50,
            retry_base_delay: Duration::from_millis(2),
            max_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Keys and ranges a transaction read, or a commit wrote.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeySet {
    keys: BTreeSet<Vec<u8>>,
    ranges: Vec<(Vec<u8>, Vec<u8>)>,
}

impl KeySet {
    pub(crate) fn add_key(&mut self, key: &[u8]) {
        self.keys.insert(key.to_vec());
    }

    pub(crate) fn add_range(&mut self, begin: &[u8], end: &[u8]) {
        if begin < end {
            self.ranges.push((begin.to_vec(), end.to_vec()));
        }
    }

    fn from_writes(writes: &WriteSet) -> Self {
        Self {
            keys: writes.mutations().keys().cloned().collect(),
            ranges: writes.clears().to_vec(),
        }
    }

    fn contains_key(&self, key: &[u8]) -> bool {
        self.keys.contains(key)
            || self
                .ranges
                .iter()
                .any(|(b, e)| key >= b.as_slice() && key < e.as_slice())
    }

    fn overlaps_range(&self, begin: &[u8], end: &[u8]) -> bool {
        self.keys.range(begin.to_vec()..end.to_vec()).next().is_some()
            || self
                .ranges
                .iter()
                .any(|(b, e)| b.as_slice() < end && begin < e.as_slice())
    }

    fn intersects(&self, other: &KeySet) -> bool {
        other.keys.iter().any(|k| self.contains_key(k))
            || other.ranges.iter().any(|(b, e)| self.overlaps_range(b, e))
    }
}

#[derive(Debug)]
struct CommitRecord {
    version: u64,
    footprint: KeySet,
}

#[derive(Debug, Default)]
struct Oracle {
    version: u64,
    /// Highest version whose record has been dropped from `log`.
    pruned_through: u64,
    log: VecDeque<CommitRecord>,
}

struct Inner {
    storage: Arc<dyn Storage>,
    oracle: Mutex<Oracle>,
    options: DatabaseOptions,
}

/// Handle to an ordered transactional key-value store.
///
/// Cheap to clone; clones share storage and the commit oracle.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("options", &self.inner.options)
            .field("version", &self.version())
            .finish()
    }
}

impl Database {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_options(storage, DatabaseOptions::default())
    }

    pub fn with_options(storage: Arc<dyn Storage>, options: DatabaseOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                oracle: Mutex::new(Oracle::default()),
                options,
            }),
        }
    }

    /// A fresh, empty in-memory database.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Open (or create) a durable database in `dir`.
    pub fn open_sled(dir: &Path, options: DatabaseOptions) -> Result<Self, KvError> {
        let storage = SledStorage::open(dir)?;
        Ok(Self::with_options(Arc::new(storage), options))
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.inner.options
    }

    /// Latest committed version.
    pub fn version(&self) -> u64 {
        self.oracle().version
    }

    pub(crate) fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    fn oracle(&self) -> std::sync::MutexGuard<'_, Oracle> {
        self.inner
            .oracle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a transaction reading at the latest committed version.
    pub fn begin(&self) -> Transaction<'_> {
        let read_version = self.version();
        Transaction::new(self, read_version)
    }

    /// Run `body` inside a transaction and commit it.
    ///
    /// Retryable commit failures re-run `body` on a fresh transaction after
    /// exponential backoff, so `body` must not have side effects outside the
    /// transaction it is given. Errors returned by `body` abort immediately.
    pub fn run<T, E, F>(&self, mut body: F) -> Result<T, E>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T, E>,
        E: From<KvError>,
    {
        let limit = self.inner.options.retry_limit.max(1);
        let mut attempt: u32 = 0;

        loop {
            let mut tr = self.begin();
            let value = body(&mut tr)?;

            match tr.commit() {
                Ok(_) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    if attempt >= limit {
                        return Err(KvError::RetryLimitExceeded {
                            attempts: attempt,
                            source: Box::new(e),
                        }
                        .into());
                    }
                    let delay = self.backoff(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying transaction");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let options = &self.inner.options;
        let factor = 1u32 << attempt.min(16);
        options
            .retry_base_delay
            .saturating_mul(factor)
            .min(options.max_retry_delay)
    }

    pub(crate) fn commit(
        &self,
        read_version: u64,
        reads: &KeySet,
        writes: &WriteSet,
    ) -> Result<u64, KvError> {
        let size = writes.payload_bytes();
        let limit = self.inner.options.max_transaction_bytes;
        if size > limit {
            return Err(KvError::TransactionTooLarge { size, limit });
        }

        let mut oracle = self.oracle();

        if read_version < oracle.pruned_through {
            return Err(KvError::TransactionTooOld);
        }

        let conflicted = oracle
            .log
            .iter()
            .rev()
            .take_while(|record| record.version > read_version)
            .any(|record| record.footprint.intersects(reads));
        if conflicted {
            return Err(KvError::NotCommitted);
        }

        if writes.is_empty() {
            return Ok(oracle.version);
        }

        match self.inner.storage.apply(writes) {
            Ok(()) => Ok(oracle.record(writes)),
            Err(e @ KvError::CommitUnknown(_)) => {
                // The writes may be visible, so readers that raced them
                // still have to conflict.
                let version = oracle.record(writes);
                tracing::warn!(version, error = %e, "Commit outcome unknown");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

impl Oracle {
    fn record(&mut self, writes: &WriteSet) -> u64 {
        self.version += 1;
        let version = self.version;
        self.log.push_back(CommitRecord {
            version,
            footprint: KeySet::from_writes(writes),
        });
        while self.log.len() > CONFLICT_WINDOW {
            if let Some(dropped) = self.log.pop_front() {
                self.pruned_through = dropped.version;
            }
        }
        version
    }
}
