//! Read-write channel over an in-memory copy of the object

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use super::{ensure_open, AccessMode, OpenOptions, SeekableChannel};
use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::storage::{ObjectStore, StoreError};

/// Read-write channel.
///
/// The whole object is fetched on open. Reads and writes work against the
/// local buffer; `flush` uploads the current contents and `close` flushes
/// once more before closing. Writes past the end zero-fill any gap; a
/// write that would grow the object past `max_size` is rejected.
pub struct BufferedChannel {
    store: Arc<dyn ObjectStore>,
    key: String,
    /// Backing storage; only `buffer[..len]` is data
    buffer: Vec<u8>,
    len: usize,
    position: u64,
    initial_capacity: usize,
    max_size: u64,
    dirty: bool,
    open: bool,
}

impl BufferedChannel {
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        key: &str,
        options: &OpenOptions,
        config: &ChannelConfig,
    ) -> Result<Self> {
        let existing = if options.truncate {
            Self::probe(&store, key).await?.map(|_| Bytes::new())
        } else {
            match store.get_object(key, None).await {
                Ok(data) => Some(data),
                Err(StoreError::NoSuchKey(_)) => None,
                Err(e) => return Err(e.into()),
            }
        };

        let (data, created) = match existing {
            Some(data) => (data, false),
            None if options.may_create() => (Bytes::new(), true),
            None => return Err(Error::NotFound(key.to_string())),
        };

        let initial_capacity = config.initial_buffer_size.max(1);
        let mut buffer = vec![0u8; initial_capacity.max(data.len())];
        buffer[..data.len()].copy_from_slice(&data);
        let len = data.len();
        let position = if options.append { len as u64 } else { 0 };

        debug!(
            "Opened {} read-write ({} bytes{})",
            key,
            len,
            if created { ", new" } else { "" }
        );

        Ok(Self {
            store,
            key: key.to_string(),
            buffer,
            len,
            position,
            initial_capacity,
            max_size: config.max_buffer_size,
            dirty: created || options.truncate,
            open: true,
        })
    }

    async fn probe(store: &Arc<dyn ObjectStore>, key: &str) -> Result<Option<()>> {
        match store.head_object(key).await {
            Ok(_) => Ok(Some(())),
            Err(StoreError::NoSuchKey(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Current contents
    pub fn contents(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Capacity of the backing buffer
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Grow by doubling until `required` bytes fit, never past `max_size`
    fn ensure_capacity(&mut self, required: usize) -> Result<()> {
        if required <= self.buffer.len() {
            return Ok(());
        }
        let limit = usize::try_from(self.max_size).unwrap_or(usize::MAX).max(required);
        let mut capacity = self.buffer.len().max(self.initial_capacity);
        while capacity < required {
            capacity = capacity.saturating_mul(2);
        }
        let capacity = capacity.min(limit);

        self.buffer
            .try_reserve_exact(capacity - self.buffer.len())
            .map_err(|e| {
                Error::InvalidArgument(format!("cannot grow buffer for {} to {} bytes: {}", self.key, capacity, e))
            })?;
        self.buffer.resize(capacity, 0);
        Ok(())
    }

    fn position_index(&self) -> Result<usize> {
        usize::try_from(self.position).map_err(|_| {
            Error::InvalidArgument(format!("position {} exceeds addressable memory", self.position))
        })
    }
}

#[async_trait]
impl SeekableChannel for BufferedChannel {
    fn mode(&self) -> AccessMode {
        AccessMode::ReadWrite
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        ensure_open(self.open)?;
        let start = self.position_index()?;
        if start >= self.len {
            return Ok(0);
        }
        let n = buf.len().min(self.len - start);
        buf[..n].copy_from_slice(&self.buffer[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        ensure_open(self.open)?;
        let start = self.position_index()?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| Error::InvalidArgument("write extends past addressable memory".into()))?;
        if end as u64 > self.max_size {
            return Err(Error::InvalidArgument(format!(
                "write to {} would end at byte {}, limit is {}",
                self.key, end, self.max_size
            )));
        }

        self.ensure_capacity(end)?;
        if start > self.len {
            self.buffer[self.len..start].fill(0);
        }
        self.buffer[start..end].copy_from_slice(buf);
        self.len = self.len.max(end);
        self.position = end as u64;
        self.dirty = true;
        Ok(buf.len())
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
        Ok(self.len as u64)
    }

    /// Shrink to `size` bytes; growing is a no-op. The position is clamped.
    fn truncate(&mut self, size: u64) -> Result<()> {
        ensure_open(self.open)?;
        if size < self.len as u64 {
            self.len = size as usize;
            self.dirty = true;
        }
        self.position = self.position.min(size);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        ensure_open(self.open)?;
        let body = Bytes::copy_from_slice(self.contents());
        self.store.put_object(&self.key, body).await?;
        self.dirty = false;
        debug!("Flushed {} ({} bytes)", self.key, self.len);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        ensure_open(self.open)?;
        self.flush().await?;
        self.open = false;
        Ok(())
    }
}

impl Drop for BufferedChannel {
    fn drop(&mut self) {
        if self.open && self.dirty {
            warn!(
                "Read-write channel for {} dropped with {} unflushed bytes",
                self.key, self.len
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::SeekFrom;

    use crate::storage::MemoryStore;

    fn rw() -> OpenOptions {
        OpenOptions::new().read(true).write(true)
    }

    fn sized(initial: usize) -> ChannelConfig {
        ChannelConfig {
            initial_buffer_size: initial,
            ..ChannelConfig::default()
        }
    }

    async fn store_with(key: &str, data: &'static [u8]) -> MemoryStore {
        let store = MemoryStore::new("test");
        store.put_object(key, Bytes::from_static(data)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_without_create() {
        let store = MemoryStore::new("test");
        let err = BufferedChannel::open(Arc::new(store), "nope", &rw(), &sized(16))
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_write_flush() {
        let store = MemoryStore::new("test");
        let mut channel = BufferedChannel::open(Arc::new(store.clone()), "new.txt", &rw().create(true), &sized(16))
            .await
            .unwrap();
        assert_eq!(channel.size().unwrap(), 0);

        channel.write(b"written").await.unwrap();
        channel.flush().await.unwrap();
        assert!(channel.is_open());
        assert_eq!(&store.get_object("new.txt", None).await.unwrap()[..], b"written");

        channel.close().await.unwrap();
        assert!(matches!(channel.flush().await, Err(Error::ChannelClosed)));
        assert!(matches!(channel.close().await, Err(Error::ChannelClosed)));
        assert_eq!(store.stats().puts, 2);
    }

    #[tokio::test]
    async fn test_read_modify_write() {
        let store = store_with("doc", b"hello world").await;
        let mut channel = BufferedChannel::open(Arc::new(store.clone()), "doc", &rw(), &sized(4))
            .await
            .unwrap();

        let mut buf = [0u8; 5];
        channel.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        channel.seek(SeekFrom::Start(6)).unwrap();
        channel.write(b"rusty!").await.unwrap();
        channel.close().await.unwrap();

        assert_eq!(&store.get_object("doc", None).await.unwrap()[..], b"hello rusty!");
    }

    #[tokio::test]
    async fn test_growth_doubles_and_zero_fills() {
        let store = MemoryStore::new("test");
        let mut channel = BufferedChannel::open(Arc::new(store), "sparse", &rw().create(true), &sized(4))
            .await
            .unwrap();
        assert_eq!(channel.capacity(), 4);

        channel.write(b"ab").await.unwrap();
        channel.set_position(6).unwrap();
        channel.write(b"cd").await.unwrap();

        assert_eq!(channel.capacity(), 8);
        assert_eq!(channel.contents(), b"ab\0\0\0\0cd");

        channel.write(&[1u8; 10]).await.unwrap();
        assert_eq!(channel.capacity(), 32);
        assert_eq!(channel.size().unwrap(), 18);
    }

    #[tokio::test]
    async fn test_truncate_clamps_position() {
        let store = store_with("t", b"0123456789").await;
        let mut channel = BufferedChannel::open(Arc::new(store), "t", &rw(), &sized(16))
            .await
            .unwrap();

        channel.seek(SeekFrom::End(0)).unwrap();
        channel.truncate(4).unwrap();
        assert_eq!(channel.size().unwrap(), 4);
        assert_eq!(channel.position().unwrap(), 4);

        channel.truncate(100).unwrap();
        assert_eq!(channel.size().unwrap(), 4);

        // Bytes past a truncation never reappear
        channel.set_position(6).unwrap();
        channel.write(b"x").await.unwrap();
        assert_eq!(channel.contents(), b"0123\0\0x");
    }

    #[tokio::test]
    async fn test_append_and_truncate_options() {
        let store = store_with("log", b"one\n").await;
        let store: Arc<dyn ObjectStore> = Arc::new(store);

        let mut channel = BufferedChannel::open(store.clone(), "log", &OpenOptions::new().append(true), &sized(16))
            .await
            .unwrap();
        assert_eq!(channel.position().unwrap(), 4);
        channel.write(b"two\n").await.unwrap();
        channel.close().await.unwrap();
        assert_eq!(&store.get_object("log", None).await.unwrap()[..], b"one\ntwo\n");

        let mut channel = BufferedChannel::open(store.clone(), "log", &rw().truncate(true), &sized(16))
            .await
            .unwrap();
        assert_eq!(channel.size().unwrap(), 0);
        channel.close().await.unwrap();
        assert!(store.get_object("log", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_at_not_supported() {
        let store = store_with("r", b"abc").await;
        let mut channel = BufferedChannel::open(Arc::new(store), "r", &rw(), &sized(16))
            .await
            .unwrap();
        let mut buf = [0u8; 1];

        assert!(matches!(channel.read_at(&mut buf, 0).await, Err(Error::NotSupported(_))));
        channel.close().await.unwrap();
        assert!(matches!(channel.read_at(&mut buf, 0).await, Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_far_write_rejected() {
        let store = MemoryStore::new("test");
        let mut channel = BufferedChannel::open(Arc::new(store), "far", &rw().create(true), &sized(16))
            .await
            .unwrap();

        channel.set_position(1u64 << 62).unwrap();
        assert!(matches!(channel.write(b"x").await, Err(Error::InvalidArgument(_))));
        assert_eq!(channel.size().unwrap(), 0);
        assert_eq!(channel.capacity(), 16);

        // The channel stays usable after the rejected write
        channel.set_position(0).unwrap();
        channel.write(b"near").await.unwrap();
        assert_eq!(channel.contents(), b"near");
    }

    #[tokio::test]
    async fn test_growth_capped_at_max_size() {
        let store = MemoryStore::new("test");
        let config = ChannelConfig {
            initial_buffer_size: 4,
            max_buffer_size: 10,
        };
        let mut channel = BufferedChannel::open(Arc::new(store), "capped", &rw().create(true), &config)
            .await
            .unwrap();

        channel.write(b"0123456789").await.unwrap();
        assert_eq!(channel.capacity(), 10);
        assert!(matches!(channel.write(b"!").await, Err(Error::InvalidArgument(_))));
        assert_eq!(channel.size().unwrap(), 10);
    }
}
