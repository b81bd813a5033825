//! Write-only channel that uploads on close

use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use tracing::{debug, warn};

use super::{ensure_open, unsupported, AccessMode, SeekableChannel};
use crate::error::Result;
use crate::storage::ObjectStore;

/// Write-only channel. Writes append to an in-memory buffer and `close`
/// uploads it with a single PUT. A close that fails leaves the channel
/// open with its data intact so the close can be retried. Closing without
/// writing uploads an empty object.
pub struct WriteChannel {
    store: Arc<dyn ObjectStore>,
    key: String,
    buffer: BytesMut,
    open: bool,
}

impl WriteChannel {
    pub fn new(store: Arc<dyn ObjectStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
            buffer: BytesMut::new(),
            open: true,
        }
    }
}

#[async_trait]
impl SeekableChannel for WriteChannel {
    fn mode(&self) -> AccessMode {
        AccessMode::WriteOnly
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        ensure_open(self.open)?;
        Err(unsupported("read", self.mode()))
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        ensure_open(self.open)?;
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn position(&self) -> Result<u64> {
        ensure_open(self.open)?;
        Ok(self.buffer.len() as u64)
    }

    fn set_position(&mut self, _position: u64) -> Result<()> {
        ensure_open(self.open)?;
        Err(unsupported("seek", self.mode()))
    }

    fn size(&self) -> Result<u64> {
        ensure_open(self.open)?;
        Ok(self.buffer.len() as u64)
    }

    fn truncate(&mut self, _size: u64) -> Result<()> {
        ensure_open(self.open)?;
        Err(unsupported("truncate", self.mode()))
    }

    /// Nothing is uploaded before close
    async fn flush(&mut self) -> Result<()> {
        ensure_open(self.open)
    }

    async fn close(&mut self) -> Result<()> {
        ensure_open(self.open)?;

        let body = self.buffer.split().freeze();
        let len = body.len();
        if let Err(e) = self.store.put_object(&self.key, body.clone()).await {
            self.buffer.extend_from_slice(&body);
            return Err(e.into());
        }

        self.open = false;
        debug!("Uploaded {} ({} bytes)", self.key, len);
        Ok(())
    }
}

impl Drop for WriteChannel {
    fn drop(&mut self) {
        if self.open {
            warn!(
                "Write channel for {} dropped without close, {} bytes discarded",
                self.key,
                self.buffer.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use std::io::SeekFrom;

    #[tokio::test]
    async fn test_single_put_on_close() {
        let store = MemoryStore::new("test");
        let mut channel = WriteChannel::new(Arc::new(store.clone()), "out.txt");

        channel.write(b"hel").await.unwrap();
        channel.write(b"lo").await.unwrap();
        channel.flush().await.unwrap();
        assert_eq!(channel.position().unwrap(), 5);
        assert_eq!(store.stats().puts, 0);

        channel.close().await.unwrap();
        assert!(matches!(channel.close().await, Err(Error::ChannelClosed)));
        assert_eq!(store.stats().puts, 1);
        assert_eq!(&store.get_object("out.txt", None).await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_empty_close_creates_empty_object() {
        let store = MemoryStore::new("test");
        let mut channel = WriteChannel::new(Arc::new(store.clone()), "dir/");
        channel.close().await.unwrap();

        assert_eq!(store.head_object("dir/").await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_failed_close_can_be_retried() {
        let store = MemoryStore::new("test");
        let mut channel = WriteChannel::new(Arc::new(store.clone()), "retry.bin");
        channel.write(b"payload").await.unwrap();

        store.set_available(false);
        assert!(matches!(channel.close().await, Err(Error::StorageUnavailable(_))));
        assert!(channel.is_open());

        store.set_available(true);
        channel.close().await.unwrap();
        assert!(!channel.is_open());
        assert_eq!(&store.get_object("retry.bin", None).await.unwrap()[..], b"payload");
    }

    #[tokio::test]
    async fn test_guards() {
        let store = MemoryStore::new("test");
        let mut channel = WriteChannel::new(Arc::new(store), "g.txt");
        let mut buf = [0u8; 4];

        assert!(matches!(channel.read(&mut buf).await, Err(Error::NotSupported(_))));
        assert!(matches!(channel.seek(SeekFrom::Start(0)), Err(Error::NotSupported(_))));
        assert!(matches!(channel.write_at(b"x", 0).await, Err(Error::NotSupported(_))));

        channel.close().await.unwrap();
        assert!(matches!(channel.write(b"late").await, Err(Error::ChannelClosed)));
        assert!(matches!(channel.flush().await, Err(Error::ChannelClosed)));
    }
}
