//! CLI command implementations

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use artifacts::{AddOutcome, ArtifactRecord, ArtifactStore, Progress};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use owo_colors::{OwoColorize, Stream};

use crate::format::sizeof_fmt;

pub const CLI_FILE: &str = "cli";
pub const CLIENT_LIB_FILE: &str = "client-lib";
pub const SERVER_FILE: &str = "server";

/// Print an expected, non-fatal condition.
fn notice(message: impl std::fmt::Display) {
    let message = message.to_string();
    println!("{}", message.if_supports_color(Stream::Stdout, |m| m.yellow()));
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// List versions and their binaries, or every raw key with `raw`.
pub fn list(store: &ArtifactStore, api_version: Option<u32>, raw: bool) -> Result<()> {
    if raw {
        for entry in store.raw_entries()? {
            println!("{} {} ({} bytes)", entry.directory, entry.key, entry.value_len);
        }
        return Ok(());
    }

    let records = store.list_versions()?;
    if records.is_empty() {
        notice("No artifacts have been uploaded yet");
        return Ok(());
    }

    for record in records
        .iter()
        .filter(|r| api_version.map_or(true, |v| r.api_version == Some(v)))
    {
        let files = store.list_files(&record.version)?;
        println!("{}", record);
        println!("Binaries:");
        for file in files {
            println!("\t{} (size={})", file.name, sizeof_fmt(file.total_size));
        }
    }
    Ok(())
}

/// The three binaries of an upload.
pub struct Binaries {
    pub cli: PathBuf,
    pub server: PathBuf,
    pub client_lib: PathBuf,
}

/// Read, compress and upload the binaries of `version`.
pub fn add(
    store: &ArtifactStore,
    version: &str,
    api_version: u32,
    has_multi_version_client: bool,
    binaries: &Binaries,
    progress: &dyn Progress,
) -> Result<()> {
    let load = |path: &Path| -> Result<Vec<u8>> {
        let data =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let compressed = compress(&data)
            .with_context(|| format!("failed to compress {}", path.display()))?;
        tracing::debug!(path = %path.display(), size = data.len(), compressed = compressed.len(), "Compressed binary");
        Ok(compressed)
    };
    let cli = load(&binaries.cli)?;
    let client_lib = load(&binaries.client_lib)?;
    let server = load(&binaries.server)?;

    let record = ArtifactRecord::new(version)
        .with_api_version(api_version)
        .with_multi_version_client(has_multi_version_client);
    let files: [(&str, &[u8]); 3] = [
        (CLI_FILE, &cli[..]),
        (CLIENT_LIB_FILE, &client_lib[..]),
        (SERVER_FILE, &server[..]),
    ];

    match store.add_artifact(&record, &files, progress) {
        Ok(AddOutcome::Added(uploaded)) => {
            println!(
                "{} artifact {} ({} binaries)",
                "Uploaded".if_supports_color(Stream::Stdout, |t| t.green()),
                version,
                uploaded.len()
            );
        }
        Ok(AddOutcome::AlreadyExists) => {
            notice(format!("Artifact with version {} already exists", version));
        }
        Err(e) if e.is_conflict() => {
            notice(format!(
                "{}\nA previous upload of {} did not finish; run `artcli remove --version {}` first",
                e, version, version
            ));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Where to write each downloaded binary; `None` skips it.
pub struct Outputs {
    pub cli: Option<PathBuf>,
    pub server: Option<PathBuf>,
    pub client_lib: Option<PathBuf>,
}

/// Download, verify and decompress the requested binaries of `version`.
pub fn download(
    store: &ArtifactStore,
    version: &str,
    outputs: &Outputs,
    progress: &dyn Progress,
) -> Result<()> {
    if store.find_complete(version)?.is_none() {
        notice(format!("No complete artifact with version {} found", version));
        return Ok(());
    }

    let requested: Vec<(&str, &PathBuf)> = [
        (CLI_FILE, outputs.cli.as_ref()),
        (CLIENT_LIB_FILE, outputs.client_lib.as_ref()),
        (SERVER_FILE, outputs.server.as_ref()),
    ]
    .into_iter()
    .filter_map(|(name, path)| path.map(|p| (name, p)))
    .collect();

    if requested.is_empty() {
        notice("Nothing to download; pass --cli, --server or --client-lib");
        return Ok(());
    }

    for (name, path) in requested {
        let data = match store.download_file(version, name, progress) {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                notice(format!("Artifact {} has no {} binary", version, name));
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let data = decompress(&data)
            .with_context(|| format!("failed to decompress {} of artifact {}", name, version))?;
        fs::write(path, &data).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {} ({})", path.display(), sizeof_fmt(data.len() as u64));
    }
    Ok(())
}

/// Remove one version or everything.
pub fn remove(store: &ArtifactStore, all: bool, version: Option<&str>) -> Result<()> {
    if all {
        if store.remove_all()? {
            println!("Removed all artifacts");
        } else {
            notice("No artifacts have been uploaded yet");
        }
        return Ok(());
    }

    let Some(version) = version else {
        notice("Either --version or --all needs to be passed to remove");
        return Ok(());
    };

    match store.remove_version(version) {
        Ok(()) => println!("Removed artifact {}", version),
        Err(e) if e.is_not_found() => {
            notice(format!("No artifact with version {} found", version))
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
