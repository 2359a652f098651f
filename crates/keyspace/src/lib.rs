//! Ordered, transactional key-value store with a directory layer.
//!
//! The store is the backend for artifact storage:
//! - **Database**: shared handle; `run` executes a closure in a
//!   transaction, commits it once, and retries on conflicts
//! - **Transaction**: buffered writes, read-your-writes, optimistic
//!   conflict checks at commit, a hard payload limit
//! - **DirectoryLayer**: hierarchical namespace nodes, each owning a short
//!   content prefix
//! - **Storage**: in-memory (`MemoryStorage`) or durable (`SledStorage`)
//!
//! # Quick Start
//!
//! ```rust
//! use keyspace::{Database, DirectoryLayer, DirectoryError};
//!
//! let db = Database::in_memory();
//! let dirs = DirectoryLayer::new();
//!
//! db.run(|tr| {
//!     let dir = dirs.create_or_open(tr, &["artifacts", "7.1.0"], "")?;
//!     tr.set(&dir.key("metadata"), b"{}");
//!     Ok::<_, DirectoryError>(())
//! })
//! .unwrap();
//! ```

pub mod database;
pub mod directory;
pub mod error;
pub mod storage;
pub mod subspace;
pub mod transaction;
pub mod tuple;

pub use database::{Database, DatabaseOptions};
pub use directory::{Directory, DirectoryError, DirectoryLayer};
pub use error::KvError;
pub use storage::{MemoryStorage, SledStorage, Storage, WriteSet};
pub use subspace::Subspace;
pub use transaction::Transaction;
pub use tuple::{printable, Element, TupleError};
