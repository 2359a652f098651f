//! Transactions: buffered writes with read-your-writes semantics.

use std::collections::BTreeMap;

use crate::database::{Database, KeySet};
use crate::error::KvError;
use crate::storage::WriteSet;
use crate::subspace::strinc;

/// An open transaction against a `Database`.
///
/// Writes are buffered until `commit`. Dropping a transaction without
/// committing discards them.
pub struct Transaction<'db> {
    db: &'db Database,
    read_version: u64,
    reads: KeySet,
    writes: WriteSet,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, read_version: u64) -> Self {
        Self {
            db,
            read_version,
            reads: KeySet::default(),
            writes: WriteSet::default(),
        }
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        if let Some(local) = self.writes.lookup(key) {
            return Ok(local.map(|v| v.to_vec()));
        }
        self.reads.add_key(key);
        self.db.storage().get(key)
    }

    /// Entries in `[begin, end)` in key order, including this transaction's
    /// own uncommitted writes.
    pub fn get_range(
        &mut self,
        begin: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        if begin >= end {
            return Ok(Vec::new());
        }
        self.reads.add_range(begin, end);

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .db
            .storage()
            .scan(begin, end)?
            .into_iter()
            .filter(|(k, _)| !self.writes.cleared(k))
            .collect();

        for (key, value) in self.writes.mutations().range(begin.to_vec()..end.to_vec()) {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    /// Every entry whose key starts with `prefix`.
    pub fn get_prefix(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let end = prefix_end(prefix);
        self.get_range(prefix, &end)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.set(key, value);
    }

    pub fn clear(&mut self, key: &[u8]) {
        self.writes.clear(key);
    }

    pub fn clear_range(&mut self, begin: &[u8], end: &[u8]) {
        self.writes.clear_range(begin, end);
    }

    pub fn clear_prefix(&mut self, prefix: &[u8]) {
        let end = prefix_end(prefix);
        self.writes.clear_range(prefix, &end);
    }

    /// Bytes this transaction will count against the size limit.
    pub fn payload_bytes(&self) -> usize {
        self.writes.payload_bytes()
    }

    /// Commit buffered writes, returning the commit version.
    ///
    /// A read-only transaction still validates its reads and returns the
    /// version it observed.
    pub fn commit(self) -> Result<u64, KvError> {
        self.db.commit(self.read_version, &self.reads, &self.writes)
    }
}

/// Keys in the store never start with `0xFF`, so an all-`0xFF` prefix
/// bound works as the end of the key space.
fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    strinc(prefix).unwrap_or_else(|| vec![0xFF])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_your_writes() -> Result<(), KvError> {
        let db = Database::in_memory();
        let mut tr = db.begin();

        tr.set(b"a", b"1");
        assert_eq!(tr.get(b"a")?, Some(b"1".to_vec()));

        tr.clear(b"a");
        assert_eq!(tr.get(b"a")?, None);
        Ok(())
    }

    #[test]
    fn test_get_range_merges_local_writes() -> Result<(), KvError> {
        let db = Database::in_memory();
        db.run(|tr| {
            tr.set(b"p/1", b"one");
            tr.set(b"p/2", b"two");
            tr.set(b"p/3", b"three");
            Ok::<_, KvError>(())
        })?;

        let mut tr = db.begin();
        tr.clear(b"p/2");
        tr.set(b"p/4", b"four");
        tr.set(b"p/1", b"uno");

        let keys: Vec<(Vec<u8>, Vec<u8>)> = tr.get_prefix(b"p/")?;
        assert_eq!(
            keys,
            vec![
                (b"p/1".to_vec(), b"uno".to_vec()),
                (b"p/3".to_vec(), b"three".to_vec()),
                (b"p/4".to_vec(), b"four".to_vec()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_clear_prefix_hides_committed_keys() -> Result<(), KvError> {
        let db = Database::in_memory();
        db.run(|tr| {
            tr.set(b"x1", b"a");
            tr.set(b"x2", b"b");
            tr.set(b"y", b"c");
            Ok::<_, KvError>(())
        })?;

        let mut tr = db.begin();
        tr.clear_prefix(b"x");
        assert_eq!(tr.get(b"x1")?, None);
        assert!(tr.get_prefix(b"x")?.is_empty());
        tr.commit()?;

        let remaining = db.run(|tr| tr.get_prefix(b""))?;
        assert_eq!(remaining, vec![(b"y".to_vec(), b"c".to_vec())]);
        Ok(())
    }

    #[test]
    fn test_dropped_transaction_discards_writes() -> Result<(), KvError> {
        let db = Database::in_memory();
        {
            let mut tr = db.begin();
            tr.set(b"ghost", b"boo");
        }
        assert_eq!(db.run(|tr| tr.get(b"ghost"))?, None);
        Ok(())
    }
}
