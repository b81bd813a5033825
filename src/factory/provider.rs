//! Shared filesystem provider

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{FileSystemFactory, HomeDirectories, SessionContext};
use crate::client::{connector_for, ClientManager};
use crate::config::Wolfs3fsConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystemId, S3FileSystem, S3Path};
use crate::storage::StoreConnector;

struct CachedFileSystem {
    generation: u64,
    fs: Arc<S3FileSystem>,
}

/// Factory that shares one filesystem instance across sessions.
///
/// The filesystem identity is fixed for the factory's lifetime, so paths
/// handed out before a client recreation or shutdown stay usable.
pub struct S3FileSystemFactory {
    config: Wolfs3fsConfig,
    id: FileSystemId,
    clients: ClientManager,
    cached: Mutex<Option<CachedFileSystem>>,
    homes: HomeDirectories,
}

impl S3FileSystemFactory {
    /// Factory for the configured storage backend
    pub fn new(config: Wolfs3fsConfig) -> Self {
        let connector = connector_for(&config.storage);
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: Wolfs3fsConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            homes: HomeDirectories::new(&config.homes),
            id: FileSystemId::new(),
            clients: ClientManager::new(connector),
            cached: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &Wolfs3fsConfig {
        &self.config
    }

    pub fn homes(&self) -> &HomeDirectories {
        &self.homes
    }

    /// The shared filesystem. The store handle is probed on every call; a
    /// replaced handle is swapped into the live instance, and a closed
    /// instance is rebuilt under the same identity.
    pub async fn file_system(&self) -> Result<Arc<S3FileSystem>> {
        let mut cached = self.cached.lock().await;
        let store = self.clients.ensure_valid().await?;
        let generation = self.clients.generation();

        if let Some(entry) = cached.as_mut() {
            if entry.fs.is_open() {
                if entry.generation != generation {
                    entry.fs.replace_store(store);
                    entry.generation = generation;
                    info!(
                        "File system {} now on client generation {}",
                        entry.fs.id(),
                        generation
                    );
                }
                return Ok(entry.fs.clone());
            }
        }

        let fs = Arc::new(S3FileSystem::with_id(self.id, store, &self.config));
        info!(
            "Created file system {} on bucket {} (client generation {})",
            fs.id(),
            fs.bucket(),
            generation
        );
        *cached = Some(CachedFileSystem {
            generation,
            fs: fs.clone(),
        });
        Ok(fs)
    }

    pub async fn add_home_directory(&self, user: &str, home: &str) -> Result<()> {
        self.homes.insert(user, home).await
    }

    /// Create the configured bootstrap directories that are missing.
    /// Failures are logged and skipped. Returns how many were created.
    pub async fn initialize_directory_structure(&self) -> Result<usize> {
        let fs = self.file_system().await?;
        let mut created = 0;

        for dir in &self.config.homes.bootstrap {
            match fs.create_directory(&fs.path(dir)).await {
                Ok(()) => created += 1,
                Err(Error::AlreadyExists(_)) => debug!("Directory {} already exists", dir),
                Err(e) => warn!("Failed to create directory {}: {}", dir, e),
            }
        }

        info!("Directory structure initialized ({} created)", created);
        Ok(created)
    }

    /// Close the cached filesystem and release the store handle. Safe to
    /// call repeatedly; the next `file_system` call starts over.
    pub async fn shutdown(&self) {
        if let Some(entry) = self.cached.lock().await.take() {
            entry.fs.close();
        }
        if self.clients.shutdown().await {
            info!("File system factory shut down");
        }
    }
}

#[async_trait]
impl FileSystemFactory for S3FileSystemFactory {
    async fn create_file_system(&self, session: &SessionContext) -> Result<Arc<S3FileSystem>> {
        let fs = self.file_system().await?;
        debug!(
            "Session {} ({}) using file system {}",
            session.session_id,
            session.username,
            fs.id()
        );
        Ok(fs)
    }

    async fn user_home_dir(&self, session: &SessionContext) -> Result<S3Path> {
        let home = self.homes.lookup(&session.username).await;
        let fs = self.file_system().await?;
        Ok(fs.path(&home))
    }
}
