//! Namespace resolver: where versions and files live in the directory tree.
//!
//! ```text
//! {root}/
//! └── {version}/            layer "artifact": schema_version, metadata
//!     └── files/
//!         └── {name}/       layer "file": size, part_size, checksum, parts
//! ```

use keyspace::{Directory, DirectoryError, DirectoryLayer, Transaction};

use crate::error::{ArtifactError, Result};

pub const VERSION_LAYER: &str = "artifact";
pub const FILE_LAYER: &str = "file";
const FILES_SEGMENT: &str = "files";

/// Resolves logical artifact paths to directories under a fixed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    root: Vec<String>,
    dirs: DirectoryLayer,
}

impl Namespace {
    pub fn new<S: Into<String>>(root: impl IntoIterator<Item = S>) -> Self {
        Self {
            root: root.into_iter().map(Into::into).collect(),
            dirs: DirectoryLayer::new(),
        }
    }

    pub fn root(&self) -> &[String] {
        &self.root
    }

    pub fn version_path(&self, version: &str) -> Vec<String> {
        let mut path = self.root.clone();
        path.push(version.to_string());
        path
    }

    pub fn files_path(&self, version: &str) -> Vec<String> {
        let mut path = self.version_path(version);
        path.push(FILES_SEGMENT.to_string());
        path
    }

    pub fn file_path(&self, version: &str, name: &str) -> Vec<String> {
        let mut path = self.files_path(version);
        path.push(name.to_string());
        path
    }

    pub fn open_version(&self, tr: &mut Transaction<'_>, version: &str) -> Result<Directory> {
        self.dirs
            .open(tr, &self.version_path(version))
            .map_err(|e| version_error(e, version))
    }

    pub fn create_version(&self, tr: &mut Transaction<'_>, version: &str) -> Result<Directory> {
        Ok(self
            .dirs
            .create_or_open(tr, &self.version_path(version), VERSION_LAYER)?)
    }

    pub fn version_exists(&self, tr: &mut Transaction<'_>, version: &str) -> Result<bool> {
        Ok(self.dirs.exists(tr, &self.version_path(version))?)
    }

    pub fn open_file(&self, tr: &mut Transaction<'_>, version: &str, name: &str) -> Result<Directory> {
        self.open_version(tr, version)?;
        self.dirs
            .open(tr, &self.file_path(version, name))
            .map_err(|e| match e {
                DirectoryError::NotFound(_) => {
                    ArtifactError::NotFound(format!("file {} of artifact version {}", name, version))
                }
                other => other.into(),
            })
    }

    /// Create the node for a new file. The version must already exist.
    pub fn create_file(
        &self,
        tr: &mut Transaction<'_>,
        version: &str,
        name: &str,
    ) -> Result<Directory> {
        self.open_version(tr, version)?;
        self.dirs
            .create(tr, &self.file_path(version, name), FILE_LAYER)
            .map_err(|e| match e {
                DirectoryError::AlreadyExists(_) => ArtifactError::Conflict(format!(
                    "file {} of artifact version {} already exists",
                    name, version
                )),
                other => other.into(),
            })
    }

    /// Every version under the root; empty when nothing was ever stored.
    pub fn list_versions(&self, tr: &mut Transaction<'_>) -> Result<Vec<String>> {
        if !self.dirs.exists(tr, &self.root)? {
            return Ok(Vec::new());
        }
        Ok(self.dirs.list(tr, &self.root)?)
    }

    pub fn list_file_names(&self, tr: &mut Transaction<'_>, version: &str) -> Result<Vec<String>> {
        self.open_version(tr, version)?;
        let files = self.files_path(version);
        if !self.dirs.exists(tr, &files)? {
            return Ok(Vec::new());
        }
        Ok(self.dirs.list(tr, &files)?)
    }

    pub fn remove_version(&self, tr: &mut Transaction<'_>, version: &str) -> Result<()> {
        self.dirs
            .remove(tr, &self.version_path(version))
            .map_err(|e| version_error(e, version))
    }

    /// Remove the whole root; returns whether anything was there.
    pub fn remove_all(&self, tr: &mut Transaction<'_>) -> Result<bool> {
        Ok(self.dirs.remove_if_exists(tr, &self.root)?)
    }

    /// The root and every directory below it, parents before children.
    pub fn walk(&self, tr: &mut Transaction<'_>) -> Result<Vec<Directory>> {
        if !self.dirs.exists(tr, &self.root)? {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(path) = pending.pop() {
            let dir = self.dirs.open(tr, &path)?;
            let children = self.dirs.list(tr, &path)?;
            for child in children.into_iter().rev() {
                let mut child_path = path.clone();
                child_path.push(child);
                pending.push(child_path);
            }
            out.push(dir);
        }
        Ok(out)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(["artifacts"])
    }
}

fn version_error(err: DirectoryError, version: &str) -> ArtifactError {
    match err {
        DirectoryError::NotFound(_) => {
            ArtifactError::NotFound(format!("artifact version {}", version))
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspace::Database;

    #[test]
    fn test_paths() {
        let ns = Namespace::new(["bindingtester", "artifacts"]);
        assert_eq!(
            ns.file_path("7.1.0", "cli"),
            vec!["bindingtester", "artifacts", "7.1.0", "files", "cli"]
        );
    }

    #[test]
    fn test_create_file_requires_version() {
        let db = Database::in_memory();
        let ns = Namespace::default();

        let err = db.run(|tr| ns.create_file(tr, "1.0", "cli")).unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(ref m) if m.contains("artifact version 1.0")));
    }

    #[test]
    fn test_create_file_twice_conflicts() -> Result<()> {
        let db = Database::in_memory();
        let ns = Namespace::default();

        db.run(|tr| {
            ns.create_version(tr, "1.0")?;
            ns.create_file(tr, "1.0", "cli")
        })?;
        let err = db.run(|tr| ns.create_file(tr, "1.0", "cli")).unwrap_err();
        assert!(err.is_conflict());
        Ok(())
    }

    #[test]
    fn test_version_with_file_layer_conflicts() -> Result<()> {
        let db = Database::in_memory();
        let ns = Namespace::default();
        let dirs = DirectoryLayer::new();

        db.run(|tr| Ok::<_, ArtifactError>(dirs.create(tr, &ns.version_path("odd"), FILE_LAYER)?))?;
        let err = db.run(|tr| ns.create_version(tr, "odd")).unwrap_err();
        assert!(err.is_conflict());
        Ok(())
    }

    #[test]
    fn test_listing_on_empty_store() -> Result<()> {
        let db = Database::in_memory();
        let ns = Namespace::default();

        assert!(db.run(|tr| ns.list_versions(tr))?.is_empty());
        assert!(db.run(|tr| ns.walk(tr))?.is_empty());
        assert!(!db.run(|tr| ns.remove_all(tr))?);
        Ok(())
    }

    #[test]
    fn test_walk_visits_parents_first() -> Result<()> {
        let db = Database::in_memory();
        let ns = Namespace::default();

        db.run(|tr| {
            ns.create_version(tr, "a")?;
            ns.create_file(tr, "a", "cli")?;
            ns.create_version(tr, "b")?;
            Ok::<_, ArtifactError>(())
        })?;

        let paths: Vec<String> = db
            .run(|tr| ns.walk(tr))?
            .iter()
            .map(|d| d.path().join("/"))
            .collect();
        assert_eq!(
            paths,
            vec![
                "artifacts",
                "artifacts/a",
                "artifacts/a/files",
                "artifacts/a/files/cli",
                "artifacts/b",
            ]
        );
        Ok(())
    }
}
