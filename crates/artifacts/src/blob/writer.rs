use keyspace::Database;
use tracing::{debug, info};

use super::{part_key, plan, write_meta, BlobSettings, FileInfo, Part};
use crate::error::{ArtifactError, Result};
use crate::hash::Checksum;
use crate::namespace::Namespace;
use crate::progress::Progress;

/// Store `data` as file `name` of `version`.
///
/// The version must exist and the file must not. Parts are written in
/// batches of `settings.parts_per_transaction()`, one transaction each; the
/// first batch creates the file node and the last one commits the metadata,
/// so the file only becomes readable once every part is stored.
pub fn upload_file(
    db: &Database,
    ns: &Namespace,
    settings: &BlobSettings,
    version: &str,
    name: &str,
    data: &[u8],
    progress: &dyn Progress,
) -> Result<FileInfo> {
    let info = FileInfo {
        name: name.to_string(),
        total_size: data.len() as u64,
        part_size: settings.part_size(),
        checksum: Checksum::from_data(data),
    };

    let parts: Vec<Part> = plan(info.total_size, info.part_size).collect();
    // An empty file still needs one transaction for its node and metadata.
    let batches: Vec<&[Part]> = if parts.is_empty() {
        vec![&parts[..]]
    } else {
        parts.chunks(settings.parts_per_transaction()).collect()
    };
    let last = batches.len() - 1;

    progress.begin(&format!("Uploading {}", name), parts.len() as u64);

    for (i, batch) in batches.iter().enumerate() {
        db.run(|tr| {
            let dir = if i == 0 {
                ns.create_file(tr, version, name)?
            } else {
                ns.open_file(tr, version, name)?
            };
            for part in batch.iter() {
                tr.set(&part_key(&dir, part.offset), &data[part.range()]);
            }
            if i == last {
                write_meta(tr, &dir, &info);
            }
            Ok::<_, ArtifactError>(())
        })?;

        debug!(version, file = name, batch = i, parts = batch.len(), "Committed upload batch");
        progress.advance(batch.len() as u64);
    }

    progress.finish();
    info!(
        version,
        file = name,
        size = info.total_size,
        parts = parts.len(),
        checksum = %info.checksum,
        "Uploaded file"
    );
    Ok(info)
}
