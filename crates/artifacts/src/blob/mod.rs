//! Chunked blobs: files split into transaction-sized parts.
//!
//! File node layout:
//! ```text
//! size         8-byte big-endian total length
//! part_size    4-byte big-endian part length
//! checksum     SHA-256, 64 lowercase hex chars
//! Int(offset)  part bytes
//! ```
//!
//! The three metadata keys are committed together with the last batch of
//! parts. A file node without `size` is an unfinished upload.

pub mod parts;
mod reader;
mod writer;

pub use parts::{last_part, part_count, plan, Part};
pub use reader::download_file;
pub use writer::upload_file;

use keyspace::{Database, Directory, Element, Transaction};

use crate::error::{ArtifactError, Result};
use crate::hash::Checksum;
use crate::namespace::Namespace;

/// Bytes per part unless configured otherwise.
pub const DEFAULT_PART_SIZE: u32 = 1024;

/// Per-part budget for the key and bookkeeping when sizing batches.
pub const PART_OVERHEAD: usize = 64;

const SIZE_KEY: &str = "size";
const PART_SIZE_KEY: &str = "part_size";
const CHECKSUM_KEY: &str = "checksum";

/// How blobs are cut into parts and grouped into transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobSettings {
    part_size: u32,
    parts_per_transaction: usize,
}

impl BlobSettings {
    /// Settings for `part_size` under a backend limit of
    /// `max_transaction_bytes`; a batch uses at most half the limit.
    pub fn new(part_size: u32, max_transaction_bytes: usize) -> Result<Self> {
        validate_part_size(part_size, max_transaction_bytes)?;
        let budget = max_transaction_bytes / 2;
        let per_part = part_size as usize + PART_OVERHEAD;
        Ok(Self {
            part_size,
            parts_per_transaction: (budget / per_part).max(1),
        })
    }

    pub fn part_size(&self) -> u32 {
        self.part_size
    }

    pub fn parts_per_transaction(&self) -> usize {
        self.parts_per_transaction
    }
}

pub(crate) fn validate_part_size(part_size: u32, max_transaction_bytes: usize) -> Result<()> {
    if part_size == 0 {
        return Err(ArtifactError::Config("part_size must be positive".to_string()));
    }
    if part_size as usize + PART_OVERHEAD > max_transaction_bytes / 2 {
        return Err(ArtifactError::Config(format!(
            "part_size {} does not fit in half of the {} byte transaction limit",
            part_size, max_transaction_bytes
        )));
    }
    Ok(())
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub total_size: u64,
    pub part_size: u32,
    pub checksum: Checksum,
}

fn part_key(dir: &Directory, offset: u64) -> Vec<u8> {
    dir.pack(&[Element::Int(offset)])
}

fn corrupt(version: &str, name: &str, what: impl std::fmt::Display) -> ArtifactError {
    ArtifactError::Corrupt(format!("file {} of artifact {}: {}", name, version, what))
}

fn write_meta(tr: &mut Transaction<'_>, dir: &Directory, info: &FileInfo) {
    tr.set(&dir.key(SIZE_KEY), &info.total_size.to_be_bytes());
    tr.set(&dir.key(PART_SIZE_KEY), &info.part_size.to_be_bytes());
    tr.set(&dir.key(CHECKSUM_KEY), info.checksum.as_bytes());
}

/// Read a file node's metadata; `None` when the upload never finished.
pub(crate) fn load_meta(
    tr: &mut Transaction<'_>,
    dir: &Directory,
    version: &str,
    name: &str,
) -> Result<Option<FileInfo>> {
    let Some(size) = tr.get(&dir.key(SIZE_KEY))? else {
        return Ok(None);
    };
    let total_size = <[u8; 8]>::try_from(size.as_slice())
        .map(u64::from_be_bytes)
        .map_err(|_| corrupt(version, name, format!("size is {} bytes", size.len())))?;

    let part_size = tr
        .get(&dir.key(PART_SIZE_KEY))?
        .ok_or_else(|| corrupt(version, name, "part_size is missing"))?;
    let part_size = <[u8; 4]>::try_from(part_size.as_slice())
        .map(u32::from_be_bytes)
        .map_err(|_| corrupt(version, name, format!("part_size is {} bytes", part_size.len())))?;
    if part_size == 0 {
        return Err(corrupt(version, name, "part_size is zero"));
    }

    let checksum = tr
        .get(&dir.key(CHECKSUM_KEY))?
        .ok_or_else(|| corrupt(version, name, "checksum is missing"))?;
    let checksum =
        Checksum::from_stored(&checksum).map_err(|e| corrupt(version, name, e))?;

    Ok(Some(FileInfo {
        name: name.to_string(),
        total_size,
        part_size,
        checksum,
    }))
}

/// Metadata of a completely uploaded file.
pub fn file_info(db: &Database, ns: &Namespace, version: &str, name: &str) -> Result<FileInfo> {
    db.run(|tr| {
        let dir = ns.open_file(tr, version, name)?;
        load_meta(tr, &dir, version, name)?.ok_or_else(|| incomplete(version, name))
    })
}

fn incomplete(version: &str, name: &str) -> ArtifactError {
    ArtifactError::NotFound(format!(
        "file {} of artifact version {} (upload incomplete)",
        name, version
    ))
}
