//! artcli - manage versioned build artifacts in the artifact store
//!
//! Subcommands:
//! - `artcli list` - Show every version and its binaries
//! - `artcli add` - Upload the binaries of a new version
//! - `artcli download` - Fetch binaries of a complete version
//! - `artcli remove` - Delete one version or all of them

use std::path::PathBuf;

use anyhow::Result;
use artifacts::{ArtifactStore, ArtifactsConfig};
use clap::{Parser, Subcommand};

mod commands;
mod format;
mod progress;

use commands::{Binaries, Outputs};
use progress::BarProgress;

#[derive(Parser)]
#[command(name = "artcli")]
#[command(about = "Upload, list and download versioned build artifacts")]
#[command(version)]
struct Cli {
    /// TOML file with an [artifacts] section
    #[arg(long, global = true, env = "ARTIFACTS_CONFIG")]
    config: Option<PathBuf>,

    /// Database directory, overriding the configuration
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List existing artifacts
    List {
        /// Only show artifacts with this API version
        #[arg(long)]
        api_version: Option<u32>,

        /// List the raw keys
        #[arg(long)]
        raw: bool,
    },

    /// Add a new artifact
    Add {
        /// The cli executable of that version
        #[arg(long, alias = "binary-a")]
        cli: PathBuf,

        /// The server executable of that version
        #[arg(long, alias = "binary-b")]
        server: PathBuf,

        /// The client shared library of that version
        #[arg(long, alias = "binary-c")]
        client_lib: PathBuf,

        /// Pass if this client does not implement the multi-version client
        #[arg(long)]
        no_multiversion: bool,

        /// The max API version this client/server pair supports
        #[arg(long)]
        api_version: u32,

        /// The version of this artifact
        version: String,
    },

    /// Download an artifact
    Download {
        /// Where to write the cli executable
        #[arg(long, alias = "binary-a")]
        cli: Option<PathBuf>,

        /// Where to write the server executable
        #[arg(long, alias = "binary-b")]
        server: Option<PathBuf>,

        /// Where to write the client shared library
        #[arg(long, alias = "binary-c")]
        client_lib: Option<PathBuf>,

        /// The version of this artifact
        version: String,
    },

    /// Delete artifacts
    Remove {
        /// Delete ALL artifacts
        #[arg(long, conflicts_with = "version")]
        all: bool,

        /// Delete the artifact with this version
        #[arg(long)]
        version: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<ArtifactsConfig> {
    let mut config = match &cli.config {
        Some(path) => ArtifactsConfig::from_file(path)?,
        None => ArtifactsConfig::from_env()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let config = load_config(&cli)?;
    tracing::debug!(backend = %config.backend, data_dir = %config.data_dir.display(), "Opening artifact store");
    let store = ArtifactStore::new(
        config.open_database()?,
        config.namespace(),
        config.blob_settings()?,
    );
    let progress = BarProgress::new();

    match cli.command {
        Commands::List { api_version, raw } => {
            commands::list(&store, api_version, raw)?;
        }
        Commands::Add {
            cli,
            server,
            client_lib,
            no_multiversion,
            api_version,
            version,
        } => {
            let binaries = Binaries {
                cli,
                server,
                client_lib,
            };
            commands::add(
                &store,
                &version,
                api_version,
                !no_multiversion,
                &binaries,
                &progress,
            )?;
        }
        Commands::Download {
            cli,
            server,
            client_lib,
            version,
        } => {
            let outputs = Outputs {
                cli,
                server,
                client_lib,
            };
            commands::download(&store, &version, &outputs, &progress)?;
        }
        Commands::Remove { all, version } => {
            commands::remove(&store, all, version.as_deref())?;
        }
    }

    Ok(())
}
