//! Error taxonomy for artifact operations.

use keyspace::{DirectoryError, KvError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Requested version, file or namespace node is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Something already exists where we tried to create.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("artifact {version} has schema version {found:?}, only {expected} is supported")]
    SchemaMismatch {
        version: String,
        expected: u32,
        found: Option<u32>,
    },

    /// Reassembled bytes do not hash to the stored checksum.
    #[error("checksum mismatch for {file}: stored {expected}, computed {actual}")]
    Integrity {
        file: String,
        expected: String,
        actual: String,
    },

    /// Stored data is structurally invalid (bad sizes, missing parts, bad encoding).
    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Backend failure that survived the transaction retry loop.
    #[error("backend error: {0}")]
    Kv(#[from] KvError),
}

impl ArtifactError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArtifactError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ArtifactError::Conflict(_))
    }

    /// Errors that mean stored data cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArtifactError::Integrity { .. }
                | ArtifactError::SchemaMismatch { .. }
                | ArtifactError::Corrupt(_)
        )
    }
}

impl From<DirectoryError> for ArtifactError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(path) => ArtifactError::NotFound(path),
            DirectoryError::AlreadyExists(path) => {
                ArtifactError::Conflict(format!("{} already exists", path))
            }
            e @ DirectoryError::LayerMismatch { .. } => ArtifactError::Conflict(e.to_string()),
            e @ (DirectoryError::Corrupt { .. } | DirectoryError::Root) => {
                ArtifactError::Corrupt(e.to_string())
            }
            DirectoryError::Kv(e) => ArtifactError::Kv(e),
        }
    }
}

pub type Result<T, E = ArtifactError> = std::result::Result<T, E>;
