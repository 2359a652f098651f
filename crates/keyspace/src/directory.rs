//! Directory layer: hierarchical namespace nodes inside the key space.
//!
//! Key layout:
//! ```text
//! 0x01 <prefix id: u64 BE> <tuple>   content of one directory
//! 0xFD "next_prefix"                 prefix allocator counter
//! 0xFE <packed path>                 node record for a directory
//! ```
//!
//! A node record is `0x01 <prefix id: u64 BE> <layer: utf-8>`. Every
//! directory owns a short, unique content prefix, so removing a subtree is a
//! handful of range clears no matter how many keys it holds.

use thiserror::Error;

use crate::error::KvError;
use crate::subspace::Subspace;
use crate::transaction::Transaction;
use crate::tuple::{self, Element};

const CONTENT_SPACE: u8 = 0x01;
const NODE_SPACE: u8 = 0xFE;
const ALLOCATOR_KEY: &[u8] = b"\xFDnext_prefix";
const NODE_FORMAT: u8 = 0x01;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory does not exist: {0}")]
    NotFound(String),

    #[error("directory already exists: {0}")]
    AlreadyExists(String),

    #[error("directory {path} has layer {found:?}, expected {expected:?}")]
    LayerMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("directory node {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("the root directory cannot be opened, created or removed")]
    Root,

    #[error(transparent)]
    Kv(#[from] KvError),
}

/// An opened directory: its path, layer tag and content subspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    path: Vec<String>,
    layer: String,
    subspace: Subspace,
}

impl Directory {
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    pub fn pack(&self, elements: &[Element]) -> Vec<u8> {
        self.subspace.pack(elements)
    }

    pub fn key(&self, name: &str) -> Vec<u8> {
        self.subspace.key(name)
    }

    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        self.subspace.range()
    }
}

/// Render a path the way error messages show it.
pub fn render_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("/")
}

/// Stateless handle to the directory layer; every call runs in the
/// caller's transaction and never commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryLayer;

impl DirectoryLayer {
    pub fn new() -> Self {
        Self
    }

    fn node_key<S: AsRef<str>>(path: &[S]) -> Vec<u8> {
        let mut key = vec![NODE_SPACE];
        key.extend(tuple::pack_path(path));
        key
    }

    fn read_node<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
    ) -> Result<Option<Directory>, DirectoryError> {
        match tr.get(&Self::node_key(path))? {
            Some(value) => decode_node(path, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Open an existing directory.
    pub fn open<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
    ) -> Result<Directory, DirectoryError> {
        if path.is_empty() {
            return Err(DirectoryError::Root);
        }

        let mut found = None;
        for depth in 1..=path.len() {
            let prefix = &path[..depth];
            match self.read_node(tr, prefix)? {
                Some(dir) => found = Some(dir),
                None => return Err(DirectoryError::NotFound(render_path(prefix))),
            }
        }

        found.ok_or(DirectoryError::Root)
    }

    /// Open `path`, creating it and any missing ancestors.
    ///
    /// A non-empty `layer` must match the layer of an existing node.
    pub fn create_or_open<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
        layer: &str,
    ) -> Result<Directory, DirectoryError> {
        if path.is_empty() {
            return Err(DirectoryError::Root);
        }

        if let Some(existing) = self.read_node(tr, path)? {
            if !layer.is_empty() && existing.layer != layer {
                return Err(DirectoryError::LayerMismatch {
                    path: render_path(path),
                    expected: layer.to_string(),
                    found: existing.layer,
                });
            }
            return Ok(existing);
        }

        if path.len() > 1 {
            self.create_or_open(tr, &path[..path.len() - 1], "")?;
        }
        self.allocate(tr, path, layer)
    }

    /// Create `path`; fails with `AlreadyExists` if the node is present.
    pub fn create<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
        layer: &str,
    ) -> Result<Directory, DirectoryError> {
        if path.is_empty() {
            return Err(DirectoryError::Root);
        }
        if self.read_node(tr, path)?.is_some() {
            return Err(DirectoryError::AlreadyExists(render_path(path)));
        }
        if path.len() > 1 {
            self.create_or_open(tr, &path[..path.len() - 1], "")?;
        }
        self.allocate(tr, path, layer)
    }

    /// Whether `path` exists. The root always does.
    pub fn exists<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
    ) -> Result<bool, DirectoryError> {
        if path.is_empty() {
            return Ok(true);
        }
        Ok(tr.get(&Self::node_key(path))?.is_some())
    }

    /// Names of the direct children of `path`, in key order.
    pub fn list<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
    ) -> Result<Vec<String>, DirectoryError> {
        if !self.exists(tr, path)? {
            return Err(DirectoryError::NotFound(render_path(path)));
        }

        let nodes = Subspace::new(Self::node_key(path));
        let (begin, end) = nodes.range();
        let mut children = Vec::new();

        for (key, _) in tr.get_range(&begin, &end)? {
            let rest = nodes.unpack(&key).map_err(|e| DirectoryError::Corrupt {
                path: render_path(path),
                reason: e.to_string(),
            })?;
            if let Some([Element::Str(name)]) = rest.as_deref() {
                children.push(name.clone());
            }
        }

        Ok(children)
    }

    /// Remove `path` and everything below it.
    pub fn remove<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
    ) -> Result<(), DirectoryError> {
        if path.is_empty() {
            return Err(DirectoryError::Root);
        }
        let root = self.open(tr, path)?;

        let node_key = Self::node_key(path);
        let descendants = Subspace::new(node_key.clone());
        let (begin, end) = descendants.range();

        tr.clear_prefix(root.subspace.prefix());
        for (key, value) in tr.get_range(&begin, &end)? {
            let child_path = descendant_path(path, &descendants, &key)?;
            let child = decode_node(&child_path, &value)?;
            tr.clear_prefix(child.subspace.prefix());
        }

        tr.clear(&node_key);
        tr.clear_range(&begin, &end);

        tracing::debug!(path = %render_path(path), "Removed directory");
        Ok(())
    }

    /// Remove `path` if present; returns whether it existed.
    pub fn remove_if_exists<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
    ) -> Result<bool, DirectoryError> {
        if !path.is_empty() && !self.exists(tr, path)? {
            return Ok(false);
        }
        self.remove(tr, path)?;
        Ok(true)
    }

    fn allocate<S: AsRef<str>>(
        &self,
        tr: &mut Transaction<'_>,
        path: &[S],
        layer: &str,
    ) -> Result<Directory, DirectoryError> {
        let next = match tr.get(ALLOCATOR_KEY)? {
            Some(raw) => decode_u64(&raw).ok_or_else(|| DirectoryError::Corrupt {
                path: "<allocator>".to_string(),
                reason: format!("expected 8 bytes, found {}", raw.len()),
            })?,
            None => 0,
        } + 1;
        tr.set(ALLOCATOR_KEY, &next.to_be_bytes());

        let mut value = vec![NODE_FORMAT];
        value.extend_from_slice(&next.to_be_bytes());
        value.extend_from_slice(layer.as_bytes());
        tr.set(&Self::node_key(path), &value);

        Ok(Directory {
            path: path.iter().map(|s| s.as_ref().to_string()).collect(),
            layer: layer.to_string(),
            subspace: content_subspace(next),
        })
    }
}

fn content_subspace(id: u64) -> Subspace {
    let mut prefix = vec![CONTENT_SPACE];
    prefix.extend_from_slice(&id.to_be_bytes());
    Subspace::new(prefix)
}

fn decode_u64(raw: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = raw.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

fn decode_node<S: AsRef<str>>(path: &[S], value: &[u8]) -> Result<Directory, DirectoryError> {
    let corrupt = |reason: &str| DirectoryError::Corrupt {
        path: render_path(path),
        reason: reason.to_string(),
    };

    if value.len() < 9 || value[0] != NODE_FORMAT {
        return Err(corrupt("not a directory node record"));
    }
    let id = decode_u64(&value[1..9]).ok_or_else(|| corrupt("bad prefix id"))?;
    let layer = std::str::from_utf8(&value[9..]).map_err(|_| corrupt("layer is not UTF-8"))?;

    Ok(Directory {
        path: path.iter().map(|s| s.as_ref().to_string()).collect(),
        layer: layer.to_string(),
        subspace: content_subspace(id),
    })
}

fn descendant_path<S: AsRef<str>>(
    base: &[S],
    nodes: &Subspace,
    key: &[u8],
) -> Result<Vec<String>, DirectoryError> {
    let rest = nodes
        .unpack(key)
        .map_err(|e| DirectoryError::Corrupt {
            path: render_path(base),
            reason: e.to_string(),
        })?
        .unwrap_or_default();

    let mut path: Vec<String> = base.iter().map(|s| s.as_ref().to_string()).collect();
    for element in rest {
        match element {
            Element::Str(s) => path.push(s),
            Element::Int(_) => {
                return Err(DirectoryError::Corrupt {
                    path: render_path(base),
                    reason: "integer element in directory path".to_string(),
                })
            }
        }
    }
    Ok(path)
}
