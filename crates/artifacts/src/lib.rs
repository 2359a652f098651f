//! Versioned binary artifacts stored as chunked blobs.
//!
//! Each artifact version is a directory holding a small record and a set of
//! named files. Files are cut into parts small enough to stay well under the
//! backend's per-transaction limit, and verified with SHA-256 on the way back.
//!
//! ```text
//! {namespace}/{version}/              schema_version, metadata
//! {namespace}/{version}/files/{name}/ size, part_size, checksum, parts...
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use artifacts::{ArtifactRecord, ArtifactStore, NoProgress};
//! use keyspace::Database;
//!
//! let store = ArtifactStore::with_defaults(Database::in_memory()).unwrap();
//! let record = ArtifactRecord::new("7.1.0").with_api_version(710);
//!
//! store
//!     .add_artifact(&record, &[("cli", &b"#!/bin/sh"[..])], &NoProgress)
//!     .unwrap();
//!
//! let data = store.download_file("7.1.0", "cli", &NoProgress).unwrap();
//! assert_eq!(data, b"#!/bin/sh");
//! ```

pub mod blob;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hash;
pub mod namespace;
pub mod progress;
pub mod record;
pub mod store;

pub use blob::{BlobSettings, FileInfo, DEFAULT_PART_SIZE};
pub use catalog::RawEntry;
pub use config::{ArtifactsConfig, Backend};
pub use error::{ArtifactError, Result};
pub use hash::Checksum;
pub use namespace::Namespace;
pub use progress::{NoProgress, Progress};
pub use record::{ArtifactRecord, SCHEMA_VERSION};
pub use store::{AddOutcome, ArtifactStore};
