//! Storage client management

pub mod lifecycle;

use std::sync::Arc;

pub use lifecycle::ClientManager;

use crate::config::{StorageBackend, StorageConfig};
use crate::storage::{s3::S3Connector, MemoryStore, StoreConnector};

/// Connector for the configured backend
pub fn connector_for(config: &StorageConfig) -> Arc<dyn StoreConnector> {
    match config.backend {
        StorageBackend::S3 => Arc::new(S3Connector::new(config.clone())),
        StorageBackend::Memory => Arc::new(MemoryStore::new(config.bucket.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectStore;

    #[tokio::test]
    async fn test_memory_connector() {
        let connector = connector_for(&StorageConfig::memory("scratch"));
        let store = connector.connect().await.unwrap();
        assert_eq!(store.bucket(), "scratch");
    }
}
