//! ArtifactStore: the operations callers use, bound to one database handle.
//!
//! Every method runs its own transaction(s) through `Database::run`.
//! Within a transaction nothing commits early; nested helpers take the
//! caller's `Transaction`.

use keyspace::Database;
use tracing::info;

use crate::blob::{self, BlobSettings, FileInfo};
use crate::catalog::{self, RawEntry};
use crate::error::Result;
use crate::namespace::Namespace;
use crate::progress::Progress;
use crate::record::ArtifactRecord;

/// Result of `add_artifact`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Every file was uploaded and the record is now complete.
    Added(Vec<FileInfo>),
    /// A complete record already exists; nothing was written.
    AlreadyExists,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    db: Database,
    namespace: Namespace,
    settings: BlobSettings,
}

impl ArtifactStore {
    pub fn new(db: Database, namespace: Namespace, settings: BlobSettings) -> Self {
        Self {
            db,
            namespace,
            settings,
        }
    }

    /// Default namespace and part size, sized to the database's limit.
    pub fn with_defaults(db: Database) -> Result<Self> {
        let settings =
            BlobSettings::new(blob::DEFAULT_PART_SIZE, db.options().max_transaction_bytes)?;
        Ok(Self::new(db, Namespace::default(), settings))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn settings(&self) -> &BlobSettings {
        &self.settings
    }

    /// Write `record`; see `ArtifactRecord::write` for the `Ok(false)` case.
    pub fn register(&self, record: &ArtifactRecord, replace: bool) -> Result<bool> {
        self.db.run(|tr| record.write(tr, &self.namespace, replace))
    }

    pub fn read(&self, version: &str) -> Result<ArtifactRecord> {
        self.db
            .run(|tr| ArtifactRecord::read(tr, &self.namespace, version))
    }

    /// The record for `version` if it exists and is complete.
    pub fn find_complete(&self, version: &str) -> Result<Option<ArtifactRecord>> {
        match self.read(version) {
            Ok(record) if record.is_complete() => Ok(Some(record)),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn upload_file(
        &self,
        version: &str,
        name: &str,
        data: &[u8],
        progress: &dyn Progress,
    ) -> Result<FileInfo> {
        blob::upload_file(
            &self.db,
            &self.namespace,
            &self.settings,
            version,
            name,
            data,
            progress,
        )
    }

    pub fn download_file(
        &self,
        version: &str,
        name: &str,
        progress: &dyn Progress,
    ) -> Result<Vec<u8>> {
        blob::download_file(
            &self.db,
            &self.namespace,
            &self.settings,
            version,
            name,
            progress,
        )
    }

    pub fn file_info(&self, version: &str, name: &str) -> Result<FileInfo> {
        blob::file_info(&self.db, &self.namespace, version, name)
    }

    /// Register `record` as incomplete, upload `files`, then mark it complete.
    ///
    /// A failure part way leaves the record incomplete; `remove_version`
    /// clears it for another attempt.
    pub fn add_artifact(
        &self,
        record: &ArtifactRecord,
        files: &[(&str, &[u8])],
        progress: &dyn Progress,
    ) -> Result<AddOutcome> {
        let mut pending = record.clone();
        pending.upload_complete = false;
        if !self.register(&pending, false)? {
            return Ok(AddOutcome::AlreadyExists);
        }

        let mut uploaded = Vec::with_capacity(files.len());
        for (name, data) in files {
            uploaded.push(self.upload_file(&record.version, name, data, progress)?);
        }

        let complete = pending.completed();
        self.register(&complete, true)?;
        info!(version = %complete.version, files = uploaded.len(), "Artifact upload complete");
        Ok(AddOutcome::Added(uploaded))
    }

    pub fn list_versions(&self) -> Result<Vec<ArtifactRecord>> {
        self.db
            .run(|tr| catalog::list_versions(tr, &self.namespace))
    }

    pub fn list_complete_versions(&self) -> Result<Vec<ArtifactRecord>> {
        self.db
            .run(|tr| catalog::list_complete_versions(tr, &self.namespace))
    }

    pub fn list_files(&self, version: &str) -> Result<Vec<FileInfo>> {
        self.db
            .run(|tr| catalog::list_files(tr, &self.namespace, version))
    }

    pub fn remove_version(&self, version: &str) -> Result<()> {
        self.db
            .run(|tr| self.namespace.remove_version(tr, version))?;
        info!(version, "Removed artifact");
        Ok(())
    }

    /// Remove every version; returns whether anything was stored.
    pub fn remove_all(&self) -> Result<bool> {
        let removed = self.db.run(|tr| self.namespace.remove_all(tr))?;
        if removed {
            info!("Removed all artifacts");
        }
        Ok(removed)
    }

    pub fn raw_entries(&self) -> Result<Vec<RawEntry>> {
        self.db
            .run(|tr| catalog::raw_entries(tr, &self.namespace))
    }
}
