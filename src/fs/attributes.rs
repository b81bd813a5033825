//! Attribute Resolution
//!
//! Decides whether a path names a file, a directory, or nothing, and
//! synthesizes basic metadata for it. Lookup order is fixed: the exact key
//! is probed as an object first, then the key plus `/` is probed as a
//! directory prefix. A file therefore shadows a same-named directory.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::path::S3Path;
use crate::error::{Error, Result};
use crate::storage::{ListRequest, ObjectMeta, ObjectStore, StoreError};

/// Kind of entry a path resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    RegularFile,
    Directory,
}

/// Fixed permission bits. Owner read/write, group and others read, plus
/// execute everywhere for directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(u32);

impl Permissions {
    pub const FILE: Permissions = Permissions(0o644);
    pub const DIRECTORY: Permissions = Permissions(0o755);

    pub fn for_kind(kind: FileKind) -> Self {
        match kind {
            FileKind::RegularFile => Self::FILE,
            FileKind::Directory => Self::DIRECTORY,
        }
    }

    pub fn mode(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const FLAGS: [(u32, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];
        for (bit, c) in FLAGS {
            write!(f, "{}", if self.0 & bit != 0 { c } else { '-' })?;
        }
        Ok(())
    }
}

/// Basic attributes of a file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    /// Object key backing the entry
    pub key: String,
    /// Size in bytes; always 0 for directories
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub kind: FileKind,
}

impl FileAttributes {
    fn file(meta: ObjectMeta) -> Self {
        Self {
            key: meta.key,
            size: meta.size,
            modified_at: meta.last_modified,
            kind: FileKind::RegularFile,
        }
    }

    fn directory(key: String) -> Self {
        Self {
            key,
            size: 0,
            modified_at: Utc::now(),
            kind: FileKind::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_regular_file(&self) -> bool {
        self.kind == FileKind::RegularFile
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::for_kind(self.kind)
    }

    /// Attribute map for the requested view
    pub fn to_map(
        &self,
        view: AttributeView,
        owner: &str,
        group: &str,
    ) -> BTreeMap<&'static str, AttributeValue> {
        let mut map = BTreeMap::new();
        map.insert("lastModifiedTime", AttributeValue::Time(self.modified_at));
        map.insert("lastAccessTime", AttributeValue::Time(self.modified_at));
        map.insert("creationTime", AttributeValue::Time(self.modified_at));
        map.insert("size", AttributeValue::Size(self.size));
        map.insert("isRegularFile", AttributeValue::Flag(self.is_regular_file()));
        map.insert("isDirectory", AttributeValue::Flag(self.is_directory()));
        map.insert("isSymbolicLink", AttributeValue::Flag(false));
        map.insert("isOther", AttributeValue::Flag(false));
        map.insert("fileKey", AttributeValue::Text(self.key.clone()));

        if view == AttributeView::Posix {
            map.insert(
                "permissions",
                AttributeValue::Text(self.permissions().to_string()),
            );
            map.insert("mode", AttributeValue::Size(u64::from(self.permissions().mode())));
            map.insert("owner", AttributeValue::Text(owner.to_string()));
            map.insert("group", AttributeValue::Text(group.to_string()));
        }
        map
    }
}

/// Value in an attribute map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Time(DateTime<Utc>),
    Size(u64),
    Flag(bool),
    Text(String),
}

/// Supported attribute views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeView {
    Basic,
    Posix,
}

impl AttributeView {
    /// Parse `view` or `view:attrs` (the attribute list is not filtered)
    pub fn parse(selector: &str) -> Result<Self> {
        let view = selector.split(':').next().unwrap_or_default();
        match view {
            "" | "basic" => Ok(AttributeView::Basic),
            "posix" | "unix" => Ok(AttributeView::Posix),
            other => Err(Error::NotSupported(format!("attribute view {}", other))),
        }
    }
}

/// Outcome of resolving a path against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    File(ObjectMeta),
    Directory,
}

/// Resolves paths to files and directories
#[derive(Clone)]
pub struct AttributeResolver {
    store: Arc<dyn ObjectStore>,
}

impl AttributeResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Probe the exact key as an object
    pub async fn probe_file(&self, key: &str) -> Result<Option<ObjectMeta>> {
        if key.is_empty() {
            return Ok(None);
        }
        match self.store.head_object(key).await {
            Ok(meta) => Ok(Some(meta)),
            Err(StoreError::NoSuchKey(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Probe a directory prefix: any key under it, marker included, means
    /// the directory exists
    pub async fn probe_directory(&self, prefix: &str) -> Result<bool> {
        if prefix.is_empty() {
            return Ok(true);
        }
        let page = self
            .store
            .list_objects(ListRequest::prefix(prefix).with_max_keys(1))
            .await?;
        Ok(!page.is_empty())
    }

    /// Resolve a path; `None` when neither probe finds anything
    pub async fn resolve(&self, path: &S3Path) -> Result<Option<Resolution>> {
        if path.is_root() {
            return Ok(Some(Resolution::Directory));
        }

        if let Some(meta) = self.probe_file(&path.object_key()).await? {
            debug!("{} resolved as file ({} bytes)", path, meta.size);
            return Ok(Some(Resolution::File(meta)));
        }

        if self.probe_directory(&path.directory_prefix()).await? {
            debug!("{} resolved as directory", path);
            return Ok(Some(Resolution::Directory));
        }

        debug!("{} not found", path);
        Ok(None)
    }

    /// Basic attributes, or `NotFound`
    pub async fn read_attributes(&self, path: &S3Path) -> Result<FileAttributes> {
        match self.resolve(path).await? {
            Some(Resolution::File(meta)) => Ok(FileAttributes::file(meta)),
            Some(Resolution::Directory) => Ok(FileAttributes::directory(path.object_key())),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    pub async fn exists(&self, path: &S3Path) -> Result<bool> {
        Ok(self.resolve(path).await?.is_some())
    }

    pub async fn is_directory(&self, path: &S3Path) -> Result<bool> {
        Ok(matches!(self.resolve(path).await?, Some(Resolution::Directory)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::path::FileSystemId;
    use crate::storage::MemoryStore;
    use bytes::Bytes;

    async fn setup(keys: &[(&str, &'static [u8])]) -> (MemoryStore, AttributeResolver, FileSystemId) {
        let store = MemoryStore::new("test");
        for (key, data) in keys {
            store.put_object(key, Bytes::from_static(data)).await.unwrap();
        }
        let resolver = AttributeResolver::new(Arc::new(store.clone()));
        (store, resolver, FileSystemId::new())
    }

    #[tokio::test]
    async fn test_file_attributes() {
        let (_, resolver, fs) = setup(&[("a/f.txt", b"hello")]).await;

        let attrs = resolver
            .read_attributes(&S3Path::parse(fs, "/a/f.txt"))
            .await
            .unwrap();
        assert!(attrs.is_regular_file());
        assert_eq!(attrs.size, 5);
        assert_eq!(attrs.key, "a/f.txt");
        assert_eq!(attrs.permissions().mode(), 0o644);
    }

    #[tokio::test]
    async fn test_directory_from_marker_and_prefix() {
        let (_, resolver, fs) = setup(&[("empty/", b""), ("implicit/child.txt", b"x")]).await;

        let marker = resolver.read_attributes(&S3Path::parse(fs, "/empty")).await.unwrap();
        assert!(marker.is_directory());
        assert_eq!(marker.size, 0);
        assert_eq!(marker.permissions().to_string(), "rwxr-xr-x");

        assert!(resolver.is_directory(&S3Path::parse(fs, "/implicit")).await.unwrap());
        assert!(resolver.is_directory(&S3Path::parse(fs, "/")).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_shadows_directory() {
        let (_, resolver, fs) = setup(&[("x", b"data"), ("x/", b""), ("x/y", b"z")]).await;
        let path = S3Path::parse(fs, "/x");

        assert!(!resolver.is_directory(&path).await.unwrap());
        assert!(matches!(
            resolver.resolve(&path).await.unwrap(),
            Some(Resolution::File(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_path() {
        let (_, resolver, fs) = setup(&[("ab", b"x")]).await;
        let path = S3Path::parse(fs, "/a");

        assert!(!resolver.exists(&path).await.unwrap());
        assert!(resolver.read_attributes(&path).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unavailable_is_not_not_found() {
        let (store, resolver, fs) = setup(&[]).await;
        store.set_available(false);

        let err = resolver
            .read_attributes(&S3Path::parse(fs, "/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[test]
    fn test_attribute_views() {
        assert_eq!(AttributeView::parse("basic:*").unwrap(), AttributeView::Basic);
        assert_eq!(AttributeView::parse("posix:permissions").unwrap(), AttributeView::Posix);
        assert!(matches!(AttributeView::parse("acl:*"), Err(Error::NotSupported(_))));

        let attrs = FileAttributes::directory("docs".into());
        let basic = attrs.to_map(AttributeView::Basic, "admin", "admin");
        assert_eq!(basic.get("isDirectory"), Some(&AttributeValue::Flag(true)));
        assert!(!basic.contains_key("owner"));

        let posix = attrs.to_map(AttributeView::Posix, "admin", "staff");
        assert_eq!(posix.get("group"), Some(&AttributeValue::Text("staff".into())));
        assert_eq!(posix.get("mode"), Some(&AttributeValue::Size(0o755)));
    }

    #[test]
    fn test_permission_strings() {
        assert_eq!(Permissions::FILE.to_string(), "rw-r--r--");
        assert_eq!(Permissions::DIRECTORY.to_string(), "rwxr-xr-x");
    }
}
