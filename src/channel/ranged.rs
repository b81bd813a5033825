//! Read-only channel backed by ranged GETs

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ensure_open, unsupported, AccessMode, SeekableChannel};
use crate::error::Result;
use crate::storage::{ByteRange, ObjectStore};

/// Read-only channel. The object size is learned once on open; every read
/// issues one ranged GET for exactly the bytes requested and seeking does
/// no I/O.
pub struct RangedReadChannel {
    store: Arc<dyn ObjectStore>,
    key: String,
    size: u64,
    position: u64,
    open: bool,
}

impl RangedReadChannel {
    pub async fn open(store: Arc<dyn ObjectStore>, key: &str) -> Result<Self> {
        let meta = store.head_object(key).await?;
        debug!("Opened {} for ranged reads ({} bytes)", key, meta.size);
        Ok(Self {
            store,
            key: key.to_string(),
            size: meta.size,
            position: 0,
            open: true,
        })
    }

    async fn fetch(&self, buf: &mut [u8], position: u64) -> Result<usize> {
        if buf.is_empty() || position >= self.size {
            return Ok(0);
        }
        let wanted = (buf.len() as u64).min(self.size - position);
        let data = self
            .store
            .get_object(&self.key, Some(ByteRange::with_len(position, wanted)))
            .await?;

        // The object may have shrunk since open
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

#[async_trait]
impl SeekableChannel for RangedReadChannel {
    fn mode(&self) -> AccessMode {
        AccessMode::ReadOnly
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        ensure_open(self.open)?;
        let n = self.fetch(buf, self.position).await?;
        self.position += n as u64;
        Ok(n)
    }

    async fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        ensure_open(self.open)?;
        Err(unsupported("write", self.mode()))
    }

    fn position(&self) -> Result<u64> {
        ensure_open(self.open)?;
        Ok(self.position)
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        ensure_open(self.open)?;
        self.position = position;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        ensure_open(self.open)?;
        Ok(self.size)
    }

    fn truncate(&mut self, _size: u64) -> Result<()> {
        ensure_open(self.open)?;
        Err(unsupported("truncate", self.mode()))
    }

    async fn flush(&mut self) -> Result<()> {
        ensure_open(self.open)
    }

    async fn close(&mut self) -> Result<()> {
        ensure_open(self.open)?;
        self.open = false;
        Ok(())
    }

    async fn read_at(&mut self, buf: &mut [u8], position: u64) -> Result<usize> {
        ensure_open(self.open)?;
        self.fetch(buf, position).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use bytes::Bytes;
    use std::io::SeekFrom;

    async fn channel_over(data: &'static [u8]) -> (MemoryStore, RangedReadChannel) {
        let store = MemoryStore::new("test");
        store.put_object("obj", Bytes::from_static(data)).await.unwrap();
        let channel = RangedReadChannel::open(Arc::new(store.clone()), "obj")
            .await
            .unwrap();
        (store, channel)
    }

    #[tokio::test]
    async fn test_reads_are_ranged() {
        let (store, mut channel) = channel_over(b"0123456789").await;
        let mut buf = [0u8; 4];

        assert_eq!(channel.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(channel.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"4567");
        assert_eq!(channel.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(channel.read(&mut buf).await.unwrap(), 0);

        // The read at end of data does not hit the store
        assert_eq!(store.stats().gets, 3);
    }

    #[tokio::test]
    async fn test_seek_is_lazy() {
        let (store, mut channel) = channel_over(b"abcdefghij").await;

        assert_eq!(channel.seek(SeekFrom::End(-3)).unwrap(), 7);
        assert_eq!(channel.seek(SeekFrom::Current(-2)).unwrap(), 5);
        assert_eq!(store.stats().gets, 0);

        let mut buf = [0u8; 2];
        channel.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"fg");

        assert!(matches!(
            channel.seek(SeekFrom::Current(-100)),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(channel.position().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_read_at_keeps_position() {
        let (_, mut channel) = channel_over(b"abcdefghij").await;
        let mut buf = [0u8; 3];

        assert_eq!(channel.read_at(&mut buf, 4).await.unwrap(), 3);
        assert_eq!(&buf, b"efg");
        assert_eq!(channel.position().unwrap(), 0);
        assert_eq!(channel.read_at(&mut buf, 20).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_guards() {
        let (_, mut channel) = channel_over(b"abc").await;

        assert!(matches!(channel.write(b"x").await, Err(Error::NotSupported(_))));
        assert!(matches!(channel.truncate(0), Err(Error::NotSupported(_))));
        assert!(matches!(channel.lock(), Err(Error::NotSupported(_))));

        channel.close().await.unwrap();
        assert!(matches!(channel.close().await, Err(Error::ChannelClosed)));
        let mut buf = [0u8; 1];
        assert!(matches!(channel.read(&mut buf).await, Err(Error::ChannelClosed)));
        assert!(matches!(channel.write(b"x").await, Err(Error::ChannelClosed)));
        assert!(matches!(channel.position(), Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_open_missing_object() {
        let store = MemoryStore::new("test");
        let err = RangedReadChannel::open(Arc::new(store), "missing")
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }
}
