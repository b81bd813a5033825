//! Directory listing
//!
//! Lazy, paginated enumeration of the immediate children of a prefix.
//! Pages are fetched only when the pending entries run out, so a caller
//! that stops early never pays for the pages it did not read.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures::Stream;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::{ListRequest, ObjectStore};

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
        }
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_directory {
            write!(f, "{}/", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Caller-supplied entry filter. An `Err` skips the entry.
pub type EntryFilter = Arc<dyn Fn(&DirectoryEntry) -> Result<bool> + Send + Sync>;

/// Lazy sequence of directory entries.
///
/// Within a page, object entries come before common-prefix entries. No
/// global order is imposed. Once drained the stream stays drained.
pub struct DirectoryStream {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    page_size: usize,
    filter: Option<EntryFilter>,
    pending: VecDeque<DirectoryEntry>,
    token: Option<String>,
    exhausted: bool,
    pages_fetched: usize,
}

impl DirectoryStream {
    /// `prefix` is a directory prefix: empty for the root, otherwise ending in `/`
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, page_size: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            page_size: page_size.max(1),
            filter: None,
            pending: VecDeque::new(),
            token: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of listing pages requested so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Next entry, or `None` once every page has been consumed
    pub async fn next(&mut self) -> Result<Option<DirectoryEntry>> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Ok(Some(entry));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let request = ListRequest::children(self.prefix.clone())
            .with_max_keys(self.page_size)
            .with_token(self.token.clone());
        let page = self.store.list_objects(request).await?;
        self.pages_fetched += 1;

        debug!(
            "Listing page {} for '{}': {} objects, {} prefixes",
            self.pages_fetched,
            self.prefix,
            page.contents.len(),
            page.common_prefixes.len()
        );

        for object in page.contents {
            // Skip the directory's own marker
            if object.key == self.prefix {
                continue;
            }
            let Some(name) = object.key.strip_prefix(&self.prefix) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            self.offer(DirectoryEntry::file(name));
        }

        for common in page.common_prefixes {
            let Some(name) = common.strip_prefix(&self.prefix) else {
                continue;
            };
            let name = name.trim_end_matches('/');
            if name.is_empty() {
                continue;
            }
            self.offer(DirectoryEntry::directory(name));
        }

        self.token = page.next_continuation_token;
        if self.token.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }

    fn offer(&mut self, entry: DirectoryEntry) {
        let accepted = match &self.filter {
            None => true,
            Some(filter) => match filter(&entry) {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Skipping listing entry {}: filter failed: {}", entry.name, e);
                    false
                }
            },
        };
        if accepted {
            self.pending.push_back(entry);
        }
    }

    /// Drain every remaining entry
    pub async fn collect_all(mut self) -> Result<Vec<DirectoryEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<DirectoryEntry>> + Send {
        futures::stream::try_unfold(self, |mut stream| async move {
            Ok(stream.next().await?.map(|entry| (entry, stream)))
        })
    }
}

/// Flat scan of every key under a prefix, used for recursive deletes
pub struct KeyScan {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    page_size: usize,
    token: Option<String>,
    exhausted: bool,
}

impl KeyScan {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, page_size: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            page_size: page_size.max(1),
            token: None,
            exhausted: false,
        }
    }

    /// Next page of keys, or `None` when the scan is complete
    pub async fn next_page(&mut self) -> Result<Option<Vec<String>>> {
        if self.exhausted {
            return Ok(None);
        }
        let request = ListRequest::prefix(self.prefix.clone())
            .with_max_keys(self.page_size)
            .with_token(self.token.clone());
        let page = self.store.list_objects(request).await?;

        self.token = page.next_continuation_token;
        self.exhausted = self.token.is_none();
        Ok(Some(page.contents.into_iter().map(|o| o.key).collect()))
    }

    /// Every key under the prefix
    pub async fn collect_all(mut self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        while let Some(page) = self.next_page().await? {
            keys.extend(page);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use bytes::Bytes;
    use futures::TryStreamExt;

    async fn populated(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::new("test");
        for key in keys {
            store.put_object(key, Bytes::from_static(b"x")).await.unwrap();
        }
        store
    }

    fn sorted(mut entries: Vec<DirectoryEntry>) -> Vec<DirectoryEntry> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    #[tokio::test]
    async fn test_children_at_every_page_size() {
        let store = populated(&["a/", "a/b/", "a/b/c.txt", "a/f.txt", "other.txt"]).await;
        let store: Arc<dyn ObjectStore> = Arc::new(store);

        for page_size in [1, 2, 3, 1000] {
            let entries = DirectoryStream::new(store.clone(), "a/", page_size)
                .collect_all()
                .await
                .unwrap();
            assert_eq!(
                sorted(entries),
                vec![DirectoryEntry::directory("b"), DirectoryEntry::file("f.txt")],
                "page size {}",
                page_size
            );
        }
    }

    #[tokio::test]
    async fn test_root_listing() {
        let store = populated(&["home/", "home/admin/", "readme.md"]).await;
        let entries = DirectoryStream::new(Arc::new(store), "", 100)
            .collect_all()
            .await
            .unwrap();

        assert_eq!(
            sorted(entries),
            vec![DirectoryEntry::directory("home"), DirectoryEntry::file("readme.md")]
        );
    }

    #[tokio::test]
    async fn test_missing_prefix_is_empty() {
        let store = populated(&["a/f.txt"]).await;
        let mut stream = DirectoryStream::new(Arc::new(store), "nope/", 10);

        assert!(stream.next().await.unwrap().is_none());
        assert!(stream.next().await.unwrap().is_none());
        assert_eq!(stream.pages_fetched(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_stream_fetches_no_more_pages() {
        let store = populated(&["d/1", "d/2", "d/3", "d/4", "d/5", "d/6"]).await;
        let mut stream = DirectoryStream::new(Arc::new(store.clone()), "d/", 2);

        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.is_directory);
        assert_eq!(stream.pages_fetched(), 1);
        drop(stream);

        assert_eq!(store.stats().lists, 1);
    }

    #[tokio::test]
    async fn test_filter_rejects_and_errors_skip() {
        let store = populated(&["d/keep.txt", "d/drop.tmp", "d/bad.txt", "d/sub/x"]).await;
        let filter: EntryFilter = Arc::new(|entry: &DirectoryEntry| {
            if entry.name == "bad.txt" {
                return Err(Error::InvalidArgument("unreadable name".into()));
            }
            Ok(!entry.name.ends_with(".tmp"))
        });

        let entries = DirectoryStream::new(Arc::new(store), "d/", 1)
            .with_filter(filter)
            .collect_all()
            .await
            .unwrap();

        assert_eq!(
            sorted(entries),
            vec![DirectoryEntry::file("keep.txt"), DirectoryEntry::directory("sub")]
        );
    }

    #[tokio::test]
    async fn test_into_stream() {
        let store = populated(&["s/a", "s/b", "s/c/d"]).await;
        let entries: Vec<DirectoryEntry> = DirectoryStream::new(Arc::new(store), "s/", 1)
            .into_stream()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries.iter().filter(|e| e.is_directory).count(), 1);
    }

    #[tokio::test]
    async fn test_listing_surfaces_unavailable() {
        let store = populated(&["a/f.txt"]).await;
        store.set_available(false);

        let err = DirectoryStream::new(Arc::new(store), "a/", 10)
            .collect_all()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_key_scan_is_recursive() {
        let store = populated(&["t/", "t/a", "t/b/", "t/b/c", "t/b/d/e", "u/z"]).await;
        let mut keys = KeyScan::new(Arc::new(store), "t/", 2)
            .collect_all()
            .await
            .unwrap();
        keys.sort();

        assert_eq!(keys, vec!["t/", "t/a", "t/b/", "t/b/c", "t/b/d/e"]);
    }
}
