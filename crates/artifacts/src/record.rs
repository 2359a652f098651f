//! Artifact records: per-version metadata with an explicit schema tag.
//!
//! A version node holds two keys:
//! - `schema_version`: 4-byte big-endian integer, currently `1`
//! - `metadata`: JSON object `{api_version, has_multi_version_client, upload_complete}`
//!
//! The tag is checked before the metadata is decoded, so a future format
//! change is rejected instead of misread.

use std::fmt;

use keyspace::Transaction;
use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, Result};
use crate::namespace::Namespace;

/// The only metadata schema this build understands.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_KEY: &str = "schema_version";
const METADATA_KEY: &str = "metadata";

/// Metadata of one artifact version.
///
/// Only records with `upload_complete == true` are meant for consumption;
/// incomplete ones are still visible to listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub version: String,
    /// Highest client API version the binaries support.
    pub api_version: Option<u32>,
    pub has_multi_version_client: Option<bool>,
    pub upload_complete: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMetadata {
    api_version: Option<u32>,
    has_multi_version_client: Option<bool>,
    upload_complete: bool,
}

impl ArtifactRecord {
    /// A new, incomplete record with unset attributes.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            api_version: None,
            has_multi_version_client: None,
            upload_complete: false,
        }
    }

    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = Some(api_version);
        self
    }

    pub fn with_multi_version_client(mut self, has_client: bool) -> Self {
        self.has_multi_version_client = Some(has_client);
        self
    }

    /// Builder: mark every file as uploaded.
    pub fn completed(mut self) -> Self {
        self.upload_complete = true;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.upload_complete
    }

    /// Persist this record inside `tr`.
    ///
    /// Returns `Ok(false)` without writing when a complete record already
    /// exists and `replace` is false. An incomplete record is overwritten.
    pub fn write(&self, tr: &mut Transaction<'_>, ns: &Namespace, replace: bool) -> Result<bool> {
        if !replace && ns.version_exists(tr, &self.version)? {
            let existing = Self::read(tr, ns, &self.version)?;
            if existing.is_complete() {
                tracing::info!(version = %self.version, "Complete artifact already exists");
                return Ok(false);
            }
        }

        let dir = ns.create_version(tr, &self.version)?;
        let metadata = StoredMetadata {
            api_version: self.api_version,
            has_multi_version_client: self.has_multi_version_client,
            upload_complete: self.upload_complete,
        };
        let encoded = serde_json::to_vec(&metadata)
            .map_err(|e| ArtifactError::Corrupt(format!("failed to encode metadata: {}", e)))?;

        tr.set(&dir.key(SCHEMA_KEY), &SCHEMA_VERSION.to_be_bytes());
        tr.set(&dir.key(METADATA_KEY), &encoded);
        Ok(true)
    }

    /// Read the record for `version` inside `tr`.
    pub fn read(tr: &mut Transaction<'_>, ns: &Namespace, version: &str) -> Result<Self> {
        let dir = ns.open_version(tr, version)?;

        let found = tr.get(&dir.key(SCHEMA_KEY))?.and_then(|raw| {
            let bytes: [u8; 4] = raw.as_slice().try_into().ok()?;
            Some(u32::from_be_bytes(bytes))
        });
        if found != Some(SCHEMA_VERSION) {
            return Err(ArtifactError::SchemaMismatch {
                version: version.to_string(),
                expected: SCHEMA_VERSION,
                found,
            });
        }

        let raw = tr.get(&dir.key(METADATA_KEY))?.ok_or_else(|| {
            ArtifactError::Corrupt(format!("artifact {} has no metadata", version))
        })?;
        let metadata: StoredMetadata = serde_json::from_slice(&raw).map_err(|e| {
            ArtifactError::Corrupt(format!("metadata of artifact {} is invalid: {}", version, e))
        })?;

        Ok(Self {
            version: version.to_string(),
            api_version: metadata.api_version,
            has_multi_version_client: metadata.has_multi_version_client,
            upload_complete: metadata.upload_complete,
        })
    }
}

fn fmt_opt<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "unset".to_string(),
    }
}

impl fmt::Display for ArtifactRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: api_version={}, has_mv_client={}, upload_done={}",
            self.version,
            fmt_opt(&self.api_version),
            fmt_opt(&self.has_multi_version_client),
            self.upload_complete
        )
    }
}
