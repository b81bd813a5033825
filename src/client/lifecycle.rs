//! Storage client lifecycle
//!
//! Owns the shared store handle. The handle is created lazily, probed
//! before it is handed out, and replaced wholesale when the probe fails.
//! Check, discard and recreate all happen under one lock, so no caller
//! sees a handle mid-replacement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::storage::{ObjectStore, StoreConnector};

/// Manages the single shared store handle
pub struct ClientManager {
    connector: Arc<dyn StoreConnector>,
    slot: Mutex<Option<Arc<dyn ObjectStore>>>,
    /// Bumped every time a new handle is installed
    generation: AtomicU64,
}

impl ClientManager {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Return a handle that just passed a liveness probe, creating or
    /// recreating it as needed
    pub async fn ensure_valid(&self) -> Result<Arc<dyn ObjectStore>> {
        let mut slot = self.slot.lock().await;

        if let Some(store) = slot.as_ref() {
            match store.health_check().await {
                Ok(()) => return Ok(store.clone()),
                Err(e) => {
                    warn!(
                        "Storage client for bucket {} failed health check, recreating: {}",
                        store.bucket(),
                        e
                    );
                    *slot = None;
                }
            }
        }

        let store = self
            .connector
            .connect()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("cannot create storage client: {}", e)))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Storage client for bucket {} ready (generation {})",
            store.bucket(),
            generation
        );
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Current handle without probing it
    pub async fn current(&self) -> Option<Arc<dyn ObjectStore>> {
        self.slot.lock().await.clone()
    }

    /// Generation of the installed handle (0 before the first one)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Release the handle. Returns whether one was held; later calls are
    /// no-ops. Holders of the old `Arc` keep a working handle, and the next
    /// `ensure_valid` creates a fresh one.
    pub async fn shutdown(&self) -> bool {
        match self.slot.lock().await.take() {
            Some(store) => {
                info!("Released storage client for bucket {}", store.bucket());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Connector that counts how many handles it built
    struct CountingConnector {
        store: MemoryStore,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl StoreConnector for CountingConnector {
        async fn connect(&self) -> StoreResult<Arc<dyn ObjectStore>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.store.connect().await
        }
    }

    fn manager() -> (MemoryStore, Arc<CountingConnector>, ClientManager) {
        let store = MemoryStore::new("lifecycle");
        let connector = Arc::new(CountingConnector {
            store: store.clone(),
            connects: AtomicUsize::new(0),
        });
        let manager = ClientManager::new(connector.clone());
        (store, connector, manager)
    }

    #[tokio::test]
    async fn test_lazy_create_and_reuse() {
        let (_, connector, manager) = manager();
        assert!(manager.current().await.is_none());
        assert_eq!(manager.generation(), 0);

        let first = manager.ensure_valid().await.unwrap();
        let second = manager.ensure_valid().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(manager.generation(), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_recreates() {
        let (store, connector, manager) = manager();
        manager.ensure_valid().await.unwrap();

        store.set_available(false);
        let err = manager.ensure_valid().await.err().unwrap();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(manager.current().await.is_none());

        store.set_available(true);
        manager.ensure_valid().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        assert_eq!(manager.generation(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal_for_the_handle() {
        let (_, connector, manager) = manager();
        let held = manager.ensure_valid().await.unwrap();

        assert!(manager.shutdown().await);
        assert!(!manager.shutdown().await);

        // The released handle still works for whoever holds it
        held.health_check().await.unwrap();

        let fresh = manager.ensure_valid().await.unwrap();
        assert!(!Arc::ptr_eq(&held, &fresh));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_handle() {
        let (_, connector, manager) = manager();
        let manager = Arc::new(manager);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move { manager.ensure_valid().await.map(|_| ()) }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(manager.generation(), 1);
    }
}
