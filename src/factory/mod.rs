//! Filesystem factory
//!
//! Entry point for the session layer: hands out the shared filesystem
//! instance and resolves per-user home directories.

pub mod home;
pub mod provider;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

pub use home::HomeDirectories;
pub use provider::S3FileSystemFactory;

use crate::error::Result;
use crate::fs::{S3FileSystem, S3Path};

/// Identity of a protocol session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub username: String,
    pub remote_address: Option<String>,
}

impl SessionContext {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            username: username.into(),
            remote_address: None,
        }
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }
}

/// Contract consumed by the protocol layer
#[async_trait]
pub trait FileSystemFactory: Send + Sync {
    /// Filesystem for a session; reuses the cached instance while the
    /// store handle stays valid
    async fn create_file_system(&self, session: &SessionContext) -> Result<Arc<S3FileSystem>>;

    /// Home directory of the session's user
    async fn user_home_dir(&self, session: &SessionContext) -> Result<S3Path>;
}
