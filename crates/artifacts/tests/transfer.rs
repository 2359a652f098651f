//! End-to-end behaviour of chunked uploads and downloads.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use artifacts::{
    ArtifactError, ArtifactRecord, ArtifactStore, BlobSettings, NoProgress, Namespace, Progress,
};
use keyspace::{
    Database, DatabaseOptions, Directory, Element, KvError, MemoryStorage, Storage, WriteSet,
};

fn store_with(part_size: u32, options: DatabaseOptions) -> ArtifactStore {
    let settings = BlobSettings::new(part_size, options.max_transaction_bytes).unwrap();
    let db = Database::with_options(Arc::new(MemoryStorage::new()), options);
    ArtifactStore::new(db, Namespace::default(), settings)
}

fn store(part_size: u32) -> ArtifactStore {
    store_with(part_size, DatabaseOptions::default())
}

fn registered(part_size: u32, version: &str) -> ArtifactStore {
    let store = store(part_size);
    store.register(&ArtifactRecord::new(version), false).unwrap();
    store
}

fn blob(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Overwrite one part of `version/name` outside the upload path.
fn tamper(store: &ArtifactStore, version: &str, name: &str, offset: u64, value: Option<&[u8]>) {
    tamper_key(store, version, name, |dir| dir.pack(&[Element::Int(offset)]), value);
}

fn tamper_key(
    store: &ArtifactStore,
    version: &str,
    name: &str,
    key: impl Fn(&Directory) -> Vec<u8>,
    value: Option<&[u8]>,
) {
    store
        .database()
        .run(|tr| {
            let dir = store.namespace().open_file(tr, version, name)?;
            let key = key(&dir);
            match value {
                Some(v) => tr.set(&key, v),
                None => tr.clear(&key),
            }
            Ok::<_, ArtifactError>(())
        })
        .unwrap();
}

#[test]
fn round_trip_edge_sizes() {
    let store = registered(1024, "7.1.0");

    for (name, len) in [("empty", 0), ("one", 1), ("exact", 1024), ("multi", 5000)] {
        let data = blob(len);
        let info = store.upload_file("7.1.0", name, &data, &NoProgress).unwrap();
        assert_eq!(info.total_size, len as u64);

        let downloaded = store.download_file("7.1.0", name, &NoProgress).unwrap();
        assert_eq!(downloaded, data, "round trip of {} bytes", len);
    }
}

#[test]
fn empty_file_has_empty_checksum() {
    let store = registered(1024, "1.0");
    let info = store.upload_file("1.0", "empty", b"", &NoProgress).unwrap();
    assert_eq!(
        info.checksum.to_string(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert!(store.download_file("1.0", "empty", &NoProgress).unwrap().is_empty());
}

#[test]
fn scenario_2500_bytes_in_three_parts() {
    let store = store(1024);
    let data = blob(2500);
    let record = ArtifactRecord::new("7.1.0").with_api_version(710);
    store
        .add_artifact(&record, &[("cli", &data[..])], &NoProgress)
        .unwrap();

    let lens = store
        .database()
        .run(|tr| {
            let dir = store.namespace().open_file(tr, "7.1.0", "cli")?;
            let mut lens = Vec::new();
            for offset in [0u64, 1024, 2048, 3072] {
                lens.push(tr.get(&dir.pack(&[Element::Int(offset)]))?.map(|v| v.len()));
            }
            Ok::<_, ArtifactError>(lens)
        })
        .unwrap();
    assert_eq!(lens, vec![Some(1024), Some(1024), Some(452), None]);

    let files = store.list_files("7.1.0").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "cli");
    assert_eq!(files[0].total_size, 2500);
    assert_eq!(store.download_file("7.1.0", "cli", &NoProgress).unwrap(), data);
}

#[test]
fn repeated_reads_are_identical() {
    let store = registered(100, "1.0");
    store.upload_file("1.0", "cli", &blob(777), &NoProgress).unwrap();

    let first = store.download_file("1.0", "cli", &NoProgress).unwrap();
    let second = store.download_file("1.0", "cli", &NoProgress).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        store.file_info("1.0", "cli").unwrap().checksum,
        store.file_info("1.0", "cli").unwrap().checksum
    );
}

#[test]
fn second_upload_conflicts_and_keeps_original() {
    let store = registered(64, "1.0");
    let original = blob(300);
    store.upload_file("1.0", "cli", &original, &NoProgress).unwrap();

    let err = store
        .upload_file("1.0", "cli", b"something else", &NoProgress)
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");
    assert_eq!(store.download_file("1.0", "cli", &NoProgress).unwrap(), original);
}

#[test]
fn corrupted_part_fails_integrity_check() {
    let store = registered(64, "1.0");
    let data = blob(200);
    store.upload_file("1.0", "cli", &data, &NoProgress).unwrap();

    let mut part = data[64..128].to_vec();
    part[10] ^= 0xFF;
    tamper(&store, "1.0", "cli", 64, Some(&part));

    let err = store.download_file("1.0", "cli", &NoProgress).unwrap_err();
    assert!(matches!(err, ArtifactError::Integrity { .. }), "unexpected error: {err}");
    assert!(err.is_fatal());
}

#[test]
fn missing_part_is_corrupt() {
    let store = registered(64, "1.0");
    store.upload_file("1.0", "cli", &blob(200), &NoProgress).unwrap();
    tamper(&store, "1.0", "cli", 128, None);

    let err = store.download_file("1.0", "cli", &NoProgress).unwrap_err();
    assert!(matches!(err, ArtifactError::Corrupt(_)), "unexpected error: {err}");
}

#[test]
fn truncated_part_is_corrupt() {
    let store = registered(64, "1.0");
    store.upload_file("1.0", "cli", &blob(200), &NoProgress).unwrap();
    tamper(&store, "1.0", "cli", 0, Some(&[1, 2, 3]));

    let err = store.download_file("1.0", "cli", &NoProgress).unwrap_err();
    assert!(matches!(err, ArtifactError::Corrupt(_)), "unexpected error: {err}");
}

#[test]
fn implausible_stored_size_is_corrupt_not_allocated() {
    let store = registered(64, "1.0");
    store.upload_file("1.0", "cli", &blob(200), &NoProgress).unwrap();

    for size in [1u64 << 60, u64::MAX, 260, 100] {
        tamper_key(&store, "1.0", "cli", |dir| dir.key("size"), Some(&size.to_be_bytes()));
        let err = store.download_file("1.0", "cli", &NoProgress).unwrap_err();
        assert!(matches!(err, ArtifactError::Corrupt(_)), "size {size}: {err}");
    }
}

#[test]
fn malformed_size_key_is_corrupt() {
    let store = registered(64, "1.0");
    store.upload_file("1.0", "cli", &blob(200), &NoProgress).unwrap();
    tamper_key(&store, "1.0", "cli", |dir| dir.key("size"), Some(&[0, 0, 200]));

    let err = store.download_file("1.0", "cli", &NoProgress).unwrap_err();
    assert!(matches!(err, ArtifactError::Corrupt(ref m) if m.contains("size is 3 bytes")));
}

#[test]
fn bad_stored_part_size_is_corrupt() {
    let store = registered(64, "1.0");
    store.upload_file("1.0", "cli", &blob(200), &NoProgress).unwrap();

    for part_size in [0u32, 1, 32, 4096] {
        tamper_key(&store, "1.0", "cli", |dir| dir.key("part_size"), Some(&part_size.to_be_bytes()));
        let err = store.download_file("1.0", "cli", &NoProgress).unwrap_err();
        assert!(matches!(err, ArtifactError::Corrupt(_)), "part_size {part_size}: {err}");
    }
}

#[test]
fn missing_file_is_not_found() {
    let store = registered(64, "1.0");
    let err = store.download_file("1.0", "server", &NoProgress).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn batches_stay_under_transaction_limit() {
    let options = DatabaseOptions {
        max_transaction_bytes: 4096,
        ..DatabaseOptions::default()
    };
    let store = store_with(1024, options);
    store.register(&ArtifactRecord::new("1.0"), false).unwrap();

    let data = blob(10_000);
    store.upload_file("1.0", "cli", &data, &NoProgress).unwrap();
    assert_eq!(store.download_file("1.0", "cli", &NoProgress).unwrap(), data);
}

/// Checks file visibility every time a batch is reported done.
struct VisibilityCheck {
    store: ArtifactStore,
    seen: Mutex<Vec<bool>>,
}

impl Progress for VisibilityCheck {
    fn begin(&self, _label: &str, _total: u64) {}

    fn advance(&self, _n: u64) {
        let visible = self.store.file_info("1.0", "cli").is_ok();
        self.seen.lock().unwrap().push(visible);
    }

    fn finish(&self) {}
}

#[test]
fn file_is_invisible_until_last_batch() {
    let options = DatabaseOptions {
        max_transaction_bytes: 512,
        ..DatabaseOptions::default()
    };
    let store = store_with(100, options);
    store.register(&ArtifactRecord::new("1.0"), false).unwrap();

    let check = VisibilityCheck {
        store: store.clone(),
        seen: Mutex::new(Vec::new()),
    };
    store.upload_file("1.0", "cli", &blob(350), &check).unwrap();

    assert_eq!(*check.seen.lock().unwrap(), vec![false, false, false, true]);
    assert!(store.list_files("1.0").unwrap().len() == 1);
}

#[test]
fn unfinished_upload_reads_as_not_found() {
    let store = registered(64, "1.0");
    store
        .database()
        .run(|tr| store.namespace().create_file(tr, "1.0", "cli").map(|_| ()))
        .unwrap();

    let err = store.download_file("1.0", "cli", &NoProgress).unwrap_err();
    assert!(err.is_not_found());
    assert!(store.list_files("1.0").unwrap().is_empty());
}

#[test]
fn racing_uploads_of_one_file_have_one_winner() {
    let store = registered(64, "1.0");
    let barrier = Barrier::new(2);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = [blob(300), blob(500)]
            .into_iter()
            .map(|data| {
                let (store, barrier) = (&store, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    store
                        .upload_file("1.0", "cli", &data, &NoProgress)
                        .map(|_| data)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<&Vec<u8>> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1, "results: {results:?}");
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(loser.is_conflict(), "unexpected error: {loser}");
    assert_eq!(&store.download_file("1.0", "cli", &NoProgress).unwrap(), winners[0]);
}

struct FlakyStorage {
    inner: MemoryStorage,
    failures: AtomicU32,
}

impl Storage for FlakyStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.get(key)
    }

    fn scan(&self, begin: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        self.inner.scan(begin, end)
    }

    fn apply(&self, writes: &WriteSet) -> Result<(), KvError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(KvError::Unavailable("injected".to_string()));
        }
        self.inner.apply(writes)
    }
}

#[test]
fn transient_backend_failures_are_retried() {
    let storage = Arc::new(FlakyStorage {
        inner: MemoryStorage::new(),
        failures: AtomicU32::new(3),
    });
    let options = DatabaseOptions {
        retry_base_delay: Duration::from_micros(10),
        max_retry_delay: Duration::from_millis(1),
        ..DatabaseOptions::default()
    };
    let db = Database::with_options(storage, options);
    let store = ArtifactStore::with_defaults(db).unwrap();

    let data = blob(3000);
    store
        .add_artifact(&ArtifactRecord::new("1.0"), &[("cli", &data[..])], &NoProgress)
        .unwrap();
    assert_eq!(store.download_file("1.0", "cli", &NoProgress).unwrap(), data);
}

#[test]
fn exhausted_retries_surface_as_backend_error() {
    let storage = Arc::new(FlakyStorage {
        inner: MemoryStorage::new(),
        failures: AtomicU32::new(100),
    });
    let options = DatabaseOptions {
        retry_limit: 3,
        retry_base_delay: Duration::from_micros(10),
        max_retry_delay: Duration::from_millis(1),
        ..DatabaseOptions::default()
    };
    let store = ArtifactStore::with_defaults(Database::with_options(storage, options)).unwrap();

    let err = store.register(&ArtifactRecord::new("1.0"), false).unwrap_err();
    assert!(matches!(
        err,
        ArtifactError::Kv(KvError::RetryLimitExceeded { attempts: 3, .. })
    ));
}

/// Storage whose applies land but go unconfirmed while `armed` is set.
#[derive(Default)]
struct UnconfirmedStorage {
    inner: MemoryStorage,
    armed: AtomicBool,
}

impl Storage for UnconfirmedStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.get(key)
    }

    fn scan(&self, begin: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        self.inner.scan(begin, end)
    }

    fn apply(&self, writes: &WriteSet) -> Result<(), KvError> {
        self.inner.apply(writes)?;
        if self.armed.load(Ordering::SeqCst) {
            return Err(KvError::CommitUnknown("flush failed".to_string()));
        }
        Ok(())
    }
}

#[test]
fn unconfirmed_commit_is_reported_not_mistaken_for_conflict() {
    let storage = Arc::new(UnconfirmedStorage::default());
    let db = Database::with_options(storage.clone(), DatabaseOptions::default());
    let store = ArtifactStore::with_defaults(db).unwrap();
    store.register(&ArtifactRecord::new("1.0"), false).unwrap();

    storage.armed.store(true, Ordering::SeqCst);
    let data = blob(300);
    let err = store.upload_file("1.0", "cli", &data, &NoProgress).unwrap_err();
    assert!(
        matches!(err, ArtifactError::Kv(KvError::CommitUnknown(_))),
        "unexpected error: {err}"
    );

    storage.armed.store(false, Ordering::SeqCst);
    assert_eq!(store.download_file("1.0", "cli", &NoProgress).unwrap(), data);
}
