//! In-process object store
//!
//! Keeps objects in an ordered map and implements prefix/delimiter listings
//! with continuation tokens the way an S3 endpoint does. Used by the
//! `memory` backend and throughout the test suite; it can be switched
//! offline or told to fail deletes to exercise error paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    ByteRange, ListPage, ListRequest, ObjectMeta, ObjectStore, ObjectSummary, StoreConnector,
    StoreError, StoreResult,
};

/// Default page size, matching S3
const DEFAULT_MAX_KEYS: usize = 1000;

struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// Request counters, handy for asserting how many round trips an
/// operation made
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: u64,
    pub puts: u64,
    pub heads: u64,
    pub lists: u64,
    pub deletes: u64,
    pub copies: u64,
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    puts: AtomicU64,
    heads: AtomicU64,
    lists: AtomicU64,
    deletes: AtomicU64,
    copies: AtomicU64,
}

struct Inner {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    offline: AtomicBool,
    failing_deletes: RwLock<HashSet<String>>,
    counters: Counters,
}

/// In-memory store; clones share the same objects
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store for `bucket`
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bucket: bucket.into(),
                objects: RwLock::new(BTreeMap::new()),
                offline: AtomicBool::new(false),
                failing_deletes: RwLock::new(HashSet::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// Take the store offline (every request fails as unavailable) or
    /// bring it back
    pub fn set_available(&self, available: bool) {
        self.inner.offline.store(!available, Ordering::SeqCst);
    }

    /// Make deletes of `key` fail until cleared
    pub async fn fail_deletes_of(&self, key: impl Into<String>) {
        self.inner.failing_deletes.write().await.insert(key.into());
    }

    /// Stop failing deletes
    pub async fn clear_delete_failures(&self) {
        self.inner.failing_deletes.write().await.clear();
    }

    /// All keys currently stored, in order
    pub async fn keys(&self) -> Vec<String> {
        self.inner.objects.read().await.keys().cloned().collect()
    }

    /// Snapshot of the request counters
    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            gets: c.gets.load(Ordering::Relaxed),
            puts: c.puts.load(Ordering::Relaxed),
            heads: c.heads.load(Ordering::Relaxed),
            lists: c.lists.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            copies: c.copies.load(Ordering::Relaxed),
        }
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "bucket {} is offline",
                self.inner.bucket
            )));
        }
        Ok(())
    }
}

/// Continuation cursor: the last item a page emitted, tagged by kind so a
/// marker key and a common prefix with the same spelling resume correctly
enum Cursor {
    Key(String),
    Prefix(String),
}

impl Cursor {
    fn decode(token: &str) -> StoreResult<Self> {
        if let Some(key) = token.strip_prefix("k:") {
            Ok(Cursor::Key(key.to_string()))
        } else if let Some(prefix) = token.strip_prefix("p:") {
            Ok(Cursor::Prefix(prefix.to_string()))
        } else {
            Err(StoreError::Backend(format!("invalid continuation token: {}", token)))
        }
    }

    fn encode(&self) -> String {
        match self {
            Cursor::Key(key) => format!("k:{}", key),
            Cursor::Prefix(prefix) => format!("p:{}", prefix),
        }
    }

    /// Whether `key` was already covered by the page that produced this cursor
    fn covers(&self, key: &str) -> bool {
        match self {
            Cursor::Key(last) => key <= last.as_str(),
            Cursor::Prefix(last) => key <= last.as_str() || key.starts_with(last.as_str()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> StoreResult<Bytes> {
        self.check_online()?;
        self.inner.counters.gets.fetch_add(1, Ordering::Relaxed);

        let objects = self.inner.objects.read().await;
        let object = objects
            .get(key)
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))?;

        match range {
            None => Ok(object.data.clone()),
            Some(range) => {
                let size = object.data.len() as u64;
                if range.start >= size {
                    return Ok(Bytes::new());
                }
                let end = range.end.min(size - 1);
                Ok(object.data.slice(range.start as usize..=end as usize))
            }
        }
    }

    async fn put_object(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.check_online()?;
        self.inner.counters.puts.fetch_add(1, Ordering::Relaxed);
        debug!("memory put {} ({} bytes)", key, body.len());

        self.inner.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectMeta> {
        self.check_online()?;
        self.inner.counters.heads.fetch_add(1, Ordering::Relaxed);

        let objects = self.inner.objects.read().await;
        objects
            .get(key)
            .map(|object| ObjectMeta {
                key: key.to_string(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
            })
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))
    }

    async fn list_objects(&self, request: ListRequest) -> StoreResult<ListPage> {
        self.check_online()?;
        self.inner.counters.lists.fetch_add(1, Ordering::Relaxed);

        let cursor = request
            .continuation_token
            .as_deref()
            .map(Cursor::decode)
            .transpose()?;
        let max_keys = request.max_keys.unwrap_or(DEFAULT_MAX_KEYS).max(1);
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());

        let objects = self.inner.objects.read().await;
        let mut page = ListPage::default();
        let mut emitted = 0usize;
        let mut last: Option<Cursor> = None;

        let candidates = objects
            .range(request.prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&request.prefix));

        for (key, object) in candidates {
            if let Some(cursor) = &cursor {
                if cursor.covers(key) {
                    continue;
                }
            }
            // Keys folded into the common prefix just emitted
            if let Some(Cursor::Prefix(prefix)) = &last {
                if key.starts_with(prefix.as_str()) {
                    continue;
                }
            }

            if emitted == max_keys {
                page.next_continuation_token = last.as_ref().map(Cursor::encode);
                return Ok(page);
            }

            let rest = &key[request.prefix.len()..];
            let grouped = delimiter.and_then(|d| rest.find(d).map(|pos| pos + d.len()));

            match grouped {
                Some(end) => {
                    let common = format!("{}{}", request.prefix, &rest[..end]);
                    page.common_prefixes.push(common.clone());
                    last = Some(Cursor::Prefix(common));
                }
                None => {
                    page.contents.push(ObjectSummary {
                        key: key.clone(),
                        size: object.data.len() as u64,
                        last_modified: object.last_modified,
                    });
                    last = Some(Cursor::Key(key.clone()));
                }
            }
            emitted += 1;
        }

        Ok(page)
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        self.check_online()?;
        self.inner.counters.deletes.fetch_add(1, Ordering::Relaxed);

        if self.inner.failing_deletes.read().await.contains(key) {
            return Err(StoreError::Backend(format!("delete of {} rejected", key)));
        }
        self.inner.objects.write().await.remove(key);
        Ok(())
    }

    async fn copy_object(&self, src_key: &str, dst_key: &str) -> StoreResult<()> {
        self.check_online()?;
        self.inner.counters.copies.fetch_add(1, Ordering::Relaxed);

        let mut objects = self.inner.objects.write().await;
        let data = objects
            .get(src_key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StoreError::NoSuchKey(src_key.to_string()))?;
        objects.insert(
            dst_key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.check_online()
    }

    fn bucket(&self) -> &str {
        &self.inner.bucket
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(&self) -> StoreResult<Arc<dyn ObjectStore>> {
        self.check_online()?;
        Ok(Arc::new(self.clone()))
    }
}
