//! Read-only traversal of everything stored under a namespace.

use keyspace::{printable, Transaction};
use tracing::warn;

use crate::blob::{load_meta, FileInfo};
use crate::error::Result;
use crate::namespace::Namespace;
use crate::record::ArtifactRecord;

/// One raw key below the namespace root, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Directory path joined with `/`.
    pub directory: String,
    pub key: String,
    pub value_len: usize,
}

/// Every version record, complete or not, in version order.
pub fn list_versions(tr: &mut Transaction<'_>, ns: &Namespace) -> Result<Vec<ArtifactRecord>> {
    let versions = ns.list_versions(tr)?;
    versions
        .iter()
        .map(|version| ArtifactRecord::read(tr, ns, version))
        .collect()
}

pub fn list_complete_versions(
    tr: &mut Transaction<'_>,
    ns: &Namespace,
) -> Result<Vec<ArtifactRecord>> {
    let mut records = list_versions(tr, ns)?;
    records.retain(ArtifactRecord::is_complete);
    Ok(records)
}

/// Metadata of every fully uploaded file of `version`.
///
/// Unfinished uploads are skipped.
pub fn list_files(tr: &mut Transaction<'_>, ns: &Namespace, version: &str) -> Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    for name in ns.list_file_names(tr, version)? {
        let dir = ns.open_file(tr, version, &name)?;
        match load_meta(tr, &dir, version, &name)? {
            Some(info) => files.push(info),
            None => warn!(version, file = %name, "Skipping incomplete file upload"),
        }
    }
    Ok(files)
}

pub fn raw_entries(tr: &mut Transaction<'_>, ns: &Namespace) -> Result<Vec<RawEntry>> {
    let mut entries = Vec::new();
    for dir in ns.walk(tr)? {
        let (begin, end) = dir.range();
        let directory = dir.path().join("/");
        for (key, value) in tr.get_range(&begin, &end)? {
            let key = match dir.subspace().unpack(&key) {
                Ok(Some(elements)) => elements
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => printable(&key),
            };
            entries.push(RawEntry {
                directory: directory.clone(),
                key,
                value_len: value.len(),
            });
        }
    }
    Ok(entries)
}
