use keyspace::{Database, Directory, Transaction};
use tracing::{debug, info};

use super::{corrupt, incomplete, last_part, load_meta, part_count, part_key, plan, BlobSettings, Part};
use crate::error::{ArtifactError, Result};
use crate::hash::Checksum;
use crate::namespace::Namespace;
use crate::progress::Progress;

/// Reassemble file `name` of `version` and verify its checksum.
///
/// Bytes are only returned when they hash to the stored checksum.
pub fn download_file(
    db: &Database,
    ns: &Namespace,
    settings: &BlobSettings,
    version: &str,
    name: &str,
    progress: &dyn Progress,
) -> Result<Vec<u8>> {
    let (dir, meta) = db.run(|tr| {
        let dir = ns.open_file(tr, version, name)?;
        let meta = load_meta(tr, &dir, version, name)?.ok_or_else(|| incomplete(version, name))?;
        // The stored size decides the buffer length, so it has to agree
        // with the parts on disk before anything is allocated.
        if let Some(last) = last_part(meta.total_size, meta.part_size) {
            fetch_part(tr, &dir, &last, version, name)?;
        }
        Ok::<_, ArtifactError>((dir, meta))
    })?;

    let total = usize::try_from(meta.total_size)
        .map_err(|_| corrupt(version, name, format!("size {} is too large", meta.total_size)))?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(total)
        .map_err(|e| corrupt(version, name, format!("cannot hold {} bytes: {}", total, e)))?;
    buffer.resize(total, 0);

    let per_batch = settings.parts_per_transaction();
    let mut parts = plan(meta.total_size, meta.part_size);
    progress.begin(
        &format!("Downloading {}", name),
        part_count(meta.total_size, meta.part_size),
    );

    for i in 0.. {
        let batch: Vec<Part> = parts.by_ref().take(per_batch).collect();
        if batch.is_empty() {
            break;
        }

        db.run(|tr| {
            for part in &batch {
                let value = fetch_part(tr, &dir, part, version, name)?;
                buffer[part.range()].copy_from_slice(&value);
            }
            Ok::<_, ArtifactError>(())
        })?;

        debug!(version, file = name, batch = i, parts = batch.len(), "Fetched download batch");
        progress.advance(batch.len() as u64);
    }

    progress.finish();

    let actual = Checksum::from_data(&buffer);
    if actual != meta.checksum {
        return Err(ArtifactError::Integrity {
            file: format!("{}/{}", version, name),
            expected: meta.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    info!(version, file = name, size = meta.total_size, "Downloaded file");
    Ok(buffer)
}

/// Read one part and check it has the length the layout promises.
fn fetch_part(
    tr: &mut Transaction<'_>,
    dir: &Directory,
    part: &Part,
    version: &str,
    name: &str,
) -> Result<Vec<u8>> {
    let value = tr
        .get(&part_key(dir, part.offset))?
        .ok_or_else(|| corrupt(version, name, format!("part at offset {} is missing", part.offset)))?;
    if value.len() != part.len {
        return Err(corrupt(
            version,
            name,
            format!(
                "part at offset {} is {} bytes, expected {}",
                part.offset,
                value.len(),
                part.len
            ),
        ));
    }
    Ok(value)
}
