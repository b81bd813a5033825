//! Filesystem adapter
//!
//! The hierarchical view over one bucket that the protocol layer talks to.
//! Directories are derived: a path is a directory when a marker object
//! `key/` exists or any object shares the `key/` prefix.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::attributes::{AttributeResolver, AttributeValue, AttributeView, FileAttributes, Resolution};
use super::listing::{DirectoryStream, EntryFilter, KeyScan};
use super::path::{FileSystemId, S3Path, SEPARATOR};
use crate::channel::{open_channel, OpenOptions, SeekableChannel};
use crate::config::{AttributeConfig, ChannelConfig, ListingConfig, Wolfs3fsConfig};
use crate::error::{Error, Result};
use crate::storage::{ListRequest, ObjectStore};

/// Hierarchical filesystem over one bucket
pub struct S3FileSystem {
    id: FileSystemId,
    bucket: String,
    store: RwLock<Arc<dyn ObjectStore>>,
    listing: ListingConfig,
    channels: ChannelConfig,
    attributes: AttributeConfig,
    open: AtomicBool,
}

impl S3FileSystem {
    pub fn new(store: Arc<dyn ObjectStore>, config: &Wolfs3fsConfig) -> Self {
        Self::with_id(FileSystemId::new(), store, config)
    }

    /// Instance with a fixed identity, so paths outlive a rebuild
    pub fn with_id(id: FileSystemId, store: Arc<dyn ObjectStore>, config: &Wolfs3fsConfig) -> Self {
        Self {
            id,
            bucket: store.bucket().to_string(),
            store: RwLock::new(store),
            listing: config.listing.clone(),
            channels: config.channels.clone(),
            attributes: config.attributes.clone(),
            open: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> FileSystemId {
        self.id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Current store handle
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.read().clone()
    }

    /// Swap in a recreated store handle. Operations already running keep
    /// the handle they started with.
    pub fn replace_store(&self, store: Arc<dyn ObjectStore>) {
        *self.store.write() = store;
        debug!("File system {} switched to a new store handle", self.id);
    }

    fn resolver(&self) -> AttributeResolver {
        AttributeResolver::new(self.store())
    }

    /// Parse a path string in this filesystem
    pub fn path(&self, raw: &str) -> S3Path {
        S3Path::parse(self.id, raw)
    }

    pub fn root(&self) -> S3Path {
        S3Path::root(self.id)
    }

    pub fn root_directories(&self) -> Vec<S3Path> {
        vec![self.root()]
    }

    pub fn separator(&self) -> &'static str {
        SEPARATOR
    }

    pub fn supported_attribute_views(&self) -> &'static [&'static str] {
        &["basic", "posix"]
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Mark this instance closed. The shared store handle stays untouched.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("Closed file system {} on bucket {}", self.id, self.bucket());
        }
    }

    pub fn is_read_only(&self) -> bool {
        false
    }

    /// Check ownership and return the absolute, normalized form
    fn check_path(&self, path: &S3Path) -> Result<S3Path> {
        if path.file_system_id() != self.id {
            return Err(Error::InvalidArgument(format!(
                "path {} belongs to another file system",
                path
            )));
        }
        Ok(path.to_absolute().normalize())
    }

    fn non_root(&self, path: &S3Path, operation: &str) -> Result<S3Path> {
        let path = self.check_path(path)?;
        if path.is_root() {
            return Err(Error::InvalidArgument(format!("cannot {} the root directory", operation)));
        }
        Ok(path)
    }

    // Attributes

    pub async fn read_attributes(&self, path: &S3Path) -> Result<FileAttributes> {
        let path = self.check_path(path)?;
        self.resolver().read_attributes(&path).await
    }

    /// Attribute map for `selector` (`basic:*`, `posix:*`)
    pub async fn read_attributes_map(
        &self,
        path: &S3Path,
        selector: &str,
    ) -> Result<BTreeMap<&'static str, AttributeValue>> {
        let view = AttributeView::parse(selector)?;
        let attrs = self.read_attributes(path).await?;
        Ok(attrs.to_map(view, &self.attributes.owner, &self.attributes.group))
    }

    pub async fn exists(&self, path: &S3Path) -> Result<bool> {
        let path = self.check_path(path)?;
        self.resolver().exists(&path).await
    }

    pub async fn is_directory(&self, path: &S3Path) -> Result<bool> {
        let path = self.check_path(path)?;
        self.resolver().is_directory(&path).await
    }

    pub async fn is_regular_file(&self, path: &S3Path) -> Result<bool> {
        let path = self.check_path(path)?;
        Ok(matches!(self.resolver().resolve(&path).await?, Some(Resolution::File(_))))
    }

    pub fn is_hidden(&self, _path: &S3Path) -> bool {
        false
    }

    pub fn is_same_file(&self, a: &S3Path, b: &S3Path) -> Result<bool> {
        Ok(self.check_path(a)? == self.check_path(b)?)
    }

    /// Succeeds when the path is a directory or a file. The directory
    /// probe runs first.
    pub async fn check_access(&self, path: &S3Path) -> Result<()> {
        let path = self.check_path(path)?;
        if self.resolver().probe_directory(&path.directory_prefix()).await? {
            return Ok(());
        }
        if self.resolver().probe_file(&path.object_key()).await?.is_some() {
            return Ok(());
        }
        Err(Error::NotFound(path.to_string()))
    }

    // Directories

    /// Create a directory by writing its marker. Fails with `AlreadyExists`
    /// when a marker, a child object or a same-named file is present.
    pub async fn create_directory(&self, dir: &S3Path) -> Result<()> {
        let dir = self.check_path(dir)?;
        if dir.is_root() {
            return Err(Error::AlreadyExists(dir.to_string()));
        }
        let prefix = dir.directory_prefix();

        if self.resolver().probe_file(&prefix).await?.is_some() {
            return Err(Error::AlreadyExists(dir.to_string()));
        }
        if self.resolver().probe_directory(&prefix).await? {
            return Err(Error::AlreadyExists(dir.to_string()));
        }
        if self.resolver().probe_file(&dir.object_key()).await?.is_some() {
            return Err(Error::AlreadyExists(dir.to_string()));
        }

        self.store().put_object(&prefix, Bytes::new()).await?;
        info!("Created directory {}", dir);
        Ok(())
    }

    /// Lazy listing of the immediate children of `dir`. A missing
    /// directory lists as empty.
    pub fn list_directory(&self, dir: &S3Path, filter: Option<EntryFilter>) -> Result<DirectoryStream> {
        let dir = self.check_path(dir)?;
        let stream = DirectoryStream::new(
            self.store(),
            dir.directory_prefix(),
            self.listing.page_size,
        );
        Ok(match filter {
            Some(filter) => stream.with_filter(filter),
            None => stream,
        })
    }

    // Mutations

    /// Delete a file, or a directory with everything under it.
    ///
    /// Directory deletes remove keys one by one and are not rolled back.
    /// Each step is idempotent, so repeating a failed delete finishes it.
    pub async fn delete(&self, path: &S3Path) -> Result<()> {
        let path = self.non_root(path, "delete")?;

        match self.resolver().resolve(&path).await? {
            None => Err(Error::NotFound(path.to_string())),
            Some(Resolution::File(meta)) => {
                self.store().delete_object(&meta.key).await?;
                debug!("Deleted file {}", path);
                Ok(())
            }
            Some(Resolution::Directory) => self.delete_tree(&path).await,
        }
    }

    async fn delete_tree(&self, dir: &S3Path) -> Result<()> {
        let prefix = dir.directory_prefix();
        let store = self.store();
        let keys = KeyScan::new(store.clone(), prefix.clone(), self.listing.page_size)
            .collect_all()
            .await?;

        let mut deleted = 0usize;
        for key in keys.iter().filter(|key| **key != prefix).chain(std::iter::once(&prefix)) {
            if let Err(e) = store.delete_object(key).await {
                warn!("Delete of {} stopped at {} after {} keys: {}", dir, key, deleted, e);
                return Err(Error::DeleteIncomplete {
                    path: dir.to_string(),
                    deleted,
                    failed_key: key.clone(),
                    reason: e.to_string(),
                });
            }
            deleted += 1;
        }

        info!("Deleted directory {} ({} keys)", dir, deleted);
        Ok(())
    }

    /// Copy one object. A directory copies only its marker; its contents
    /// are not recursed into. An existing target is overwritten.
    pub async fn copy(&self, source: &S3Path, target: &S3Path) -> Result<()> {
        let source = self.non_root(source, "copy")?;
        let target = self.non_root(target, "copy onto")?;
        if source == target {
            return Ok(());
        }

        match self.resolver().resolve(&source).await? {
            None => Err(Error::NotFound(source.to_string())),
            Some(Resolution::File(meta)) => {
                self.store().copy_object(&meta.key, &target.object_key()).await?;
                debug!("Copied {} -> {}", source, target);
                Ok(())
            }
            Some(Resolution::Directory) => {
                let marker = source.directory_prefix();
                if self.resolver().probe_file(&marker).await?.is_some() {
                    self.store().copy_object(&marker, &target.directory_prefix()).await?;
                } else {
                    self.store().put_object(&target.directory_prefix(), Bytes::new()).await?;
                }
                debug!("Copied directory marker {} -> {}", source, target);
                Ok(())
            }
        }
    }

    /// Copy then delete the source. Not atomic: when the delete fails both
    /// paths exist and `MoveIncomplete` is returned.
    pub async fn move_path(&self, source: &S3Path, target: &S3Path) -> Result<()> {
        let source = self.non_root(source, "move")?;
        let target = self.non_root(target, "move onto")?;
        if source == target {
            return Ok(());
        }

        let source_key = match self.resolver().resolve(&source).await? {
            None => return Err(Error::NotFound(source.to_string())),
            Some(Resolution::File(meta)) => meta.key,
            Some(Resolution::Directory) => {
                if self.has_children(&source).await? {
                    return Err(Error::NotSupported(format!(
                        "moving non-empty directory {}",
                        source
                    )));
                }
                source.directory_prefix()
            }
        };

        self.copy(&source, &target).await?;

        if let Err(e) = self.store().delete_object(&source_key).await {
            warn!("Move {} -> {} left the source in place: {}", source, target, e);
            return Err(Error::MoveIncomplete {
                from: source.to_string(),
                to: target.to_string(),
                reason: e.to_string(),
            });
        }

        info!("Moved {} -> {}", source, target);
        Ok(())
    }

    async fn has_children(&self, dir: &S3Path) -> Result<bool> {
        let prefix = dir.directory_prefix();
        let page = self
            .store()
            .list_objects(ListRequest::prefix(prefix.clone()).with_max_keys(2))
            .await?;
        Ok(page.contents.iter().any(|o| o.key != prefix))
    }

    // Channels

    pub async fn open_channel(
        &self,
        path: &S3Path,
        options: &OpenOptions,
    ) -> Result<Box<dyn SeekableChannel>> {
        let path = self.non_root(path, "open")?;
        open_channel(self.store(), &path.object_key(), options, &self.channels).await
    }

    /// Read a whole file
    pub async fn read(&self, path: &S3Path) -> Result<Bytes> {
        let path = self.non_root(path, "read")?;
        Ok(self.store().get_object(&path.object_key(), None).await?)
    }

    /// Replace a whole file
    pub async fn write(&self, path: &S3Path, data: Bytes) -> Result<()> {
        let path = self.non_root(path, "write")?;
        self.store().put_object(&path.object_key(), data).await?;
        Ok(())
    }

    // Unsupported

    pub fn create_symbolic_link(&self, _link: &S3Path, _target: &S3Path) -> Result<()> {
        Err(Error::NotSupported("symbolic links".into()))
    }

    pub fn create_link(&self, _link: &S3Path, _existing: &S3Path) -> Result<()> {
        Err(Error::NotSupported("hard links".into()))
    }

    pub fn new_watch_service(&self) -> Result<()> {
        Err(Error::NotSupported("watch service".into()))
    }

    pub fn path_matcher(&self, _syntax_and_pattern: &str) -> Result<()> {
        Err(Error::NotSupported("path matcher".into()))
    }

    pub fn file_store(&self, _path: &S3Path) -> Result<()> {
        Err(Error::NotSupported("file store".into()))
    }

    pub fn set_attribute(&self, _path: &S3Path, attribute: &str) -> Result<()> {
        Err(Error::NotSupported(format!("setting attribute {}", attribute)))
    }
}
