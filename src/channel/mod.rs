//! Byte channels
//!
//! Seekable byte channels over whole-object PUT and ranged GET. Three
//! variants exist, chosen from the open options:
//!
//! - read only: [`RangedReadChannel`], one ranged GET per read
//! - write only: [`WriteChannel`], accumulates and PUTs once on close
//! - read + write (or append): [`BufferedChannel`], whole object in memory

pub mod buffered;
pub mod ranged;
pub mod writer;

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

pub use buffered::BufferedChannel;
pub use ranged::RangedReadChannel;
pub use writer::WriteChannel;

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::storage::{ObjectStore, StoreError};

/// Direction a channel was opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Options for opening a channel, in the style of `std::fs::OpenOptions`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub create_new: bool,
    pub append: bool,
    pub truncate: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn create_new(mut self, create_new: bool) -> Self {
        self.create_new = create_new;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Whether a missing object may be created
    pub fn may_create(&self) -> bool {
        self.create || self.create_new
    }

    /// Channel variant these options select
    pub fn access_mode(&self) -> Result<AccessMode> {
        let write = self.write || self.append;
        match (self.read, write) {
            (true, false) => Ok(AccessMode::ReadOnly),
            // Appending needs the existing bytes
            (false, true) if self.append => Ok(AccessMode::ReadWrite),
            (false, true) => Ok(AccessMode::WriteOnly),
            (true, true) => Ok(AccessMode::ReadWrite),
            (false, false) => Err(Error::InvalidArgument(
                "channel must be opened for reading or writing".into(),
            )),
        }
    }
}

/// Seekable byte channel.
///
/// Every method, `close` included, fails with [`Error::ChannelClosed`]
/// once the channel is closed; operations the variant cannot perform fail
/// with [`Error::NotSupported`].
#[async_trait]
pub trait SeekableChannel: Send {
    fn mode(&self) -> AccessMode;

    fn is_open(&self) -> bool;

    /// Read into `buf` at the current position. `Ok(0)` means end of data.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` at the current position
    async fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn position(&self) -> Result<u64>;

    fn set_position(&mut self, position: u64) -> Result<()>;

    /// Current size of the data visible through this channel
    fn size(&self) -> Result<u64>;

    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Push buffered bytes to the store without closing
    async fn flush(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        ensure_open(self.is_open())?;
        let target = match from {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.position()?) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.size()?) + i128::from(delta),
        };
        if target < 0 {
            return Err(Error::InvalidArgument(format!(
                "seek to negative position {}",
                target
            )));
        }
        let target = u64::try_from(target)
            .map_err(|_| Error::InvalidArgument(format!("seek position {} overflows", target)))?;
        self.set_position(target)?;
        Ok(target)
    }

    /// Positioned read that leaves the channel position untouched
    async fn read_at(&mut self, _buf: &mut [u8], _position: u64) -> Result<usize> {
        ensure_open(self.is_open())?;
        Err(unsupported("read_at", self.mode()))
    }

    async fn write_at(&mut self, _buf: &[u8], _position: u64) -> Result<usize> {
        ensure_open(self.is_open())?;
        Err(unsupported("write_at", self.mode()))
    }

    fn lock(&mut self) -> Result<()> {
        ensure_open(self.is_open())?;
        Err(unsupported("lock", self.mode()))
    }
}

pub(crate) fn ensure_open(open: bool) -> Result<()> {
    if open {
        Ok(())
    } else {
        Err(Error::ChannelClosed)
    }
}

pub(crate) fn unsupported(operation: &str, mode: AccessMode) -> Error {
    Error::NotSupported(format!("{} on {:?} channel", operation, mode))
}

/// Open the channel variant selected by `options` for `key`
pub async fn open_channel(
    store: Arc<dyn ObjectStore>,
    key: &str,
    options: &OpenOptions,
    config: &ChannelConfig,
) -> Result<Box<dyn SeekableChannel>> {
    let mode = options.access_mode()?;
    if key.is_empty() || key.ends_with('/') {
        return Err(Error::InvalidArgument(format!(
            "cannot open a channel on directory key '{}'",
            key
        )));
    }

    if options.create_new {
        match store.head_object(key).await {
            Ok(_) => return Err(Error::AlreadyExists(key.to_string())),
            Err(StoreError::NoSuchKey(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    debug!("Opening {:?} channel on {}", mode, key);
    let channel: Box<dyn SeekableChannel> = match mode {
        AccessMode::ReadOnly => Box::new(RangedReadChannel::open(store, key).await?),
        AccessMode::WriteOnly => Box::new(WriteChannel::new(store, key)),
        AccessMode::ReadWrite => Box::new(BufferedChannel::open(store, key, options, config).await?),
    };
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use bytes::Bytes;

    #[test]
    fn test_access_modes() {
        let opts = OpenOptions::new().read(true);
        assert_eq!(opts.access_mode().unwrap(), AccessMode::ReadOnly);

        let opts = OpenOptions::new().write(true).create(true);
        assert_eq!(opts.access_mode().unwrap(), AccessMode::WriteOnly);

        let opts = OpenOptions::new().read(true).write(true);
        assert_eq!(opts.access_mode().unwrap(), AccessMode::ReadWrite);

        let opts = OpenOptions::new().append(true);
        assert_eq!(opts.access_mode().unwrap(), AccessMode::ReadWrite);

        assert!(matches!(
            OpenOptions::new().create(true).access_mode(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_write_then_ranged_read() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new("test"));
        let config = ChannelConfig::default();

        let mut writer = open_channel(
            store.clone(),
            "a/f.txt",
            &OpenOptions::new().write(true).create(true),
            &config,
        )
        .await
        .unwrap();
        assert_eq!(writer.mode(), AccessMode::WriteOnly);
        writer.write(b"hello").await.unwrap();
        writer.close().await.unwrap();

        let mut reader = open_channel(store, "a/f.txt", &OpenOptions::new().read(true), &config)
            .await
            .unwrap();
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_new_rejects_existing() {
        let store = MemoryStore::new("test");
        store.put_object("x.bin", Bytes::from_static(b"1")).await.unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(store);

        let opts = OpenOptions::new().write(true).create_new(true);
        let err = open_channel(store.clone(), "x.bin", &opts, &ChannelConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::AlreadyExists(_)));

        assert!(open_channel(store, "y.bin", &opts, &ChannelConfig::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_directory_keys_rejected() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new("test"));
        let opts = OpenOptions::new().read(true);

        for key in ["", "a/"] {
            let err = open_channel(store.clone(), key, &opts, &ChannelConfig::default())
                .await
                .err()
                .unwrap();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
    }
}
