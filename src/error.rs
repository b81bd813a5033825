//! wolfs3fs Error Types

use thiserror::Error;

use crate::storage::StoreError;

/// Result type alias for wolfs3fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// wolfs3fs error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Filesystem errors
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Channel errors
    #[error("Channel is closed")]
    ChannelClosed,

    // Storage errors
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // Multi-step operations
    #[error("Delete of {path} stopped after removing {deleted} keys: failed on {failed_key}: {reason}")]
    DeleteIncomplete {
        path: String,
        deleted: usize,
        failed_key: String,
        reason: String,
    },

    #[error("Move from {from} to {to} copied the target but failed to remove the source: {reason}")]
    MoveIncomplete {
        from: String,
        to: String,
        reason: String,
    },

    // Output errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error means the path does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_)
                | Error::DeleteIncomplete { .. }
        )
    }

    /// Convert to a `std::io::Error` for consumers that speak io kinds
    pub fn to_io_error(&self) -> std::io::Error {
        use std::io::ErrorKind;

        let kind = match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::NotSupported(_) => ErrorKind::Unsupported,
            Error::InvalidArgument(_) => ErrorKind::InvalidInput,
            Error::ChannelClosed => ErrorKind::BrokenPipe,
            Error::StorageUnavailable(_) => ErrorKind::NotConnected,
            Error::Io(e) => e.kind(),
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, self.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoSuchKey(key) => Error::NotFound(key),
            StoreError::Unavailable(reason) => Error::StorageUnavailable(reason),
            StoreError::Backend(reason) => Error::Storage(reason),
        }
    }
}
