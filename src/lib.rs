//! wolfs3fs - Hierarchical Filesystem over S3 Object Storage
//!
//! Presents a flat, key-addressed object store as a seekable, hierarchical
//! filesystem so that a file-serving protocol layer (SFTP and friends) can
//! work against a bucket as if it were a mounted volume.
//!
//! # Architecture
//!
//! Directories are a convention over flat keys: a path is a directory when
//! a zero-length marker `key/` exists or any object shares that prefix.
//! Listings fold the store's common prefixes into directory entries, deletes
//! of directories enumerate and remove every key, and moves are a copy
//! followed by a delete.
//!
//! # Features
//!
//! - Immutable paths with normalization and resolution
//! - Lazy, paginated directory listings
//! - Ranged-read, write-on-close and buffered read-write byte channels
//! - Shared store handle with liveness probing and transparent recreation
//! - Per-user home directories
//! - S3 (via `rust-s3`) and in-memory storage backends

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod fs;
pub mod session;
pub mod storage;

pub use config::Wolfs3fsConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::channel::{AccessMode, OpenOptions, SeekableChannel};
    pub use crate::config::Wolfs3fsConfig;
    pub use crate::error::{Error, Result};
    pub use crate::factory::{FileSystemFactory, S3FileSystemFactory, SessionContext};
    pub use crate::fs::{DirectoryEntry, FileAttributes, S3FileSystem, S3Path};
    pub use crate::session::{PathResolver, SessionEventListener};
    pub use crate::storage::{MemoryStore, ObjectStore};
}
