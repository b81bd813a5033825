//! Object Storage
//!
//! The flat, key-addressed store the filesystem adapter sits on top of.
//! Only single-key operations, ranged reads and paginated prefix listings
//! are required from a backend.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::s3::S3Store;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Faults reported by a storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store request failed: {0}")]
    Backend(String),
}

/// Inclusive byte range for ranged GETs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range covering `len` bytes starting at `start`. `len` must be non-zero.
    pub fn with_len(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start + len - 1,
        }
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Metadata returned by a HEAD request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One listing request
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// Only keys starting with this prefix
    pub prefix: String,
    /// Group keys sharing the prefix up to this delimiter into common prefixes
    pub delimiter: Option<String>,
    /// Opaque cursor from the previous page
    pub continuation_token: Option<String>,
    /// Page size cap (backend default when `None`)
    pub max_keys: Option<usize>,
}

impl ListRequest {
    /// Flat listing of every key under a prefix
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Listing of immediate children (delimited by `/`)
    pub fn children(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: Some("/".to_string()),
            ..Default::default()
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }
}

/// Object summary inside a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of listing results
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    /// Set while more pages remain
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty() && self.common_prefixes.is_empty()
    }
}

/// Storage client contract.
///
/// Implementations are shared across sessions behind an `Arc`; retry,
/// multipart uploads and consistency are the backend's business.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, or the given inclusive byte range of it
    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> StoreResult<Bytes>;

    /// Replace an object with `body`
    async fn put_object(&self, key: &str, body: Bytes) -> StoreResult<()>;

    /// Fetch object metadata; `NoSuchKey` when absent
    async fn head_object(&self, key: &str) -> StoreResult<ObjectMeta>;

    /// Fetch one page of a prefix listing
    async fn list_objects(&self, request: ListRequest) -> StoreResult<ListPage>;

    /// Remove an object; removing an absent key succeeds
    async fn delete_object(&self, key: &str) -> StoreResult<()>;

    /// Server-side copy inside the bucket
    async fn copy_object(&self, src_key: &str, dst_key: &str) -> StoreResult<()>;

    /// Cheap liveness probe
    async fn health_check(&self) -> StoreResult<()>;

    /// Name of the bucket this store addresses
    fn bucket(&self) -> &str;
}

/// Builds store handles. Used by the client lifecycle to create and
/// recreate the shared handle.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> StoreResult<std::sync::Arc<dyn ObjectStore>>;
}
