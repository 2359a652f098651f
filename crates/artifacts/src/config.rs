//! Artifact store configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `ARTIFACTS_BACKEND`: `sled` (default) or `memory`
//! - `ARTIFACTS_DATA_DIR`: directory of the sled database
//! - `ARTIFACTS_NAMESPACE`: root path, `/`-separated
//! - `ARTIFACTS_PART_SIZE`: bytes per stored part
//! - `ARTIFACTS_MAX_TRANSACTION_BYTES`: backend payload limit
//! - `ARTIFACTS_RETRY_LIMIT`: transaction attempts before giving up
//!
//! Default data directory: `~/.artifacts/db`

use anyhow::{bail, Context, Result};
use keyspace::{Database, DatabaseOptions, MemoryStorage};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::blob::{BlobSettings, DEFAULT_PART_SIZE};
use crate::namespace::Namespace;

/// Where the key-value data lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sled,
    /// Process-local; everything is lost on exit.
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sled" => Ok(Backend::Sled),
            "memory" => Ok(Backend::Memory),
            other => bail!("unknown backend {:?}, expected \"sled\" or \"memory\"", other),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sled => write!(f, "sled"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root path under which versions are stored.
    #[serde(default = "default_namespace")]
    pub namespace: Vec<String>,

    #[serde(default = "default_part_size")]
    pub part_size: u32,

    #[serde(default = "default_max_transaction_bytes")]
    pub max_transaction_bytes: usize,

    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".artifacts").join("db"))
        .unwrap_or_else(|| PathBuf::from(".artifacts/db"))
}

fn default_namespace() -> Vec<String> {
    vec!["artifacts".to_string()]
}

fn default_part_size() -> u32 {
    DEFAULT_PART_SIZE
}

fn default_max_transaction_bytes() -> usize {
    DatabaseOptions::default().max_transaction_bytes
}

fn default_retry_limit() -> u32 {
    DatabaseOptions::default().retry_limit
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: default_data_dir(),
            namespace: default_namespace(),
            part_size: default_part_size(),
            max_transaction_bytes: default_max_transaction_bytes(),
            retry_limit: default_retry_limit(),
        }
    }
}

impl ArtifactsConfig {
    /// Defaults overridden by `ARTIFACTS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Load the `[artifacts]` section of a TOML file, then apply environment
    /// overrides. A file without the section behaves like `from_env`.
    ///
    /// ```toml
    /// [artifacts]
    /// backend = "sled"
    /// data_dir = "/var/lib/artifacts"
    /// part_size = 1024
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

        let mut config = match table.get("artifacts") {
            Some(section) => section
                .clone()
                .try_into()
                .context("failed to parse [artifacts] section")?,
            None => Self::default(),
        };
        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup such as `std::env::var`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("ARTIFACTS_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(dir) = lookup("ARTIFACTS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(namespace) = lookup("ARTIFACTS_NAMESPACE") {
            self.namespace = namespace
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(size) = lookup("ARTIFACTS_PART_SIZE") {
            self.part_size = size
                .parse()
                .with_context(|| format!("invalid ARTIFACTS_PART_SIZE: {:?}", size))?;
        }
        if let Some(limit) = lookup("ARTIFACTS_MAX_TRANSACTION_BYTES") {
            self.max_transaction_bytes = limit
                .parse()
                .with_context(|| format!("invalid ARTIFACTS_MAX_TRANSACTION_BYTES: {:?}", limit))?;
        }
        if let Some(limit) = lookup("ARTIFACTS_RETRY_LIMIT") {
            self.retry_limit = limit
                .parse()
                .with_context(|| format!("invalid ARTIFACTS_RETRY_LIMIT: {:?}", limit))?;
        }
        Ok(())
    }

    /// Create a config with a specific data directory.
    pub fn with_data_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: path.into(),
            ..Self::default()
        }
    }

    /// Create an in-memory config, mostly for tests.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            bail!("namespace must have at least one segment");
        }
        if self.retry_limit == 0 {
            bail!("retry_limit must be positive");
        }
        self.blob_settings()?;
        Ok(())
    }

    pub fn blob_settings(&self) -> Result<BlobSettings> {
        Ok(BlobSettings::new(self.part_size, self.max_transaction_bytes)?)
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.namespace.iter().cloned())
    }

    pub fn database_options(&self) -> DatabaseOptions {
        DatabaseOptions {
            max_transaction_bytes: self.max_transaction_bytes,
            retry_limit: self.retry_limit,
            ..DatabaseOptions::default()
        }
    }

    /// Validate and open the configured backend.
    pub fn open_database(&self) -> Result<Database> {
        self.validate()?;
        match self.backend {
            Backend::Memory => Ok(Database::with_options(
                Arc::new(MemoryStorage::new()),
                self.database_options(),
            )),
            Backend::Sled => {
                std::fs::create_dir_all(&self.data_dir).with_context(|| {
                    format!("failed to create data directory: {}", self.data_dir.display())
                })?;
                Database::open_sled(&self.data_dir, self.database_options()).with_context(|| {
                    format!("failed to open database at {}", self.data_dir.display())
                })
            }
        }
    }
}
