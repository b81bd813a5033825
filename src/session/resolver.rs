//! Working-directory path resolution for protocol sessions

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::{S3FileSystem, S3Path};

/// Tracks a session's working directory and resolves the paths clients
/// send against it
pub struct PathResolver {
    fs: Arc<S3FileSystem>,
    cwd: S3Path,
}

impl PathResolver {
    /// Start in `home`, creating it and its ancestors when missing
    pub async fn new(fs: Arc<S3FileSystem>, home: &S3Path) -> Result<Self> {
        let home = home.to_absolute().normalize();

        let mut dir = fs.root();
        for component in home.components() {
            dir = dir.resolve(&component);
            match fs.create_directory(&dir).await {
                Ok(()) | Err(Error::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(Self { fs, cwd: home })
    }

    /// Start in `cwd` without touching the store
    pub fn with_cwd(fs: Arc<S3FileSystem>, cwd: &S3Path) -> Self {
        Self {
            fs,
            cwd: cwd.to_absolute().normalize(),
        }
    }

    pub fn cwd(&self) -> &S3Path {
        &self.cwd
    }

    pub fn file_system(&self) -> &Arc<S3FileSystem> {
        &self.fs
    }

    /// Resolve a client path: empty or `.` is the working directory, `..`
    /// its parent, absolute paths stand alone and relative paths are
    /// joined to the working directory. The result is normalized.
    pub fn resolve(&self, remote: &str) -> S3Path {
        let resolved = match remote {
            "" | "." => self.cwd.clone(),
            ".." => self.cwd.parent().unwrap_or_else(|| self.fs.root()),
            absolute if absolute.starts_with('/') => self.fs.path(absolute).normalize(),
            relative => self.cwd.resolve_str(relative).normalize(),
        };
        debug!("Resolved '{}' in {} to {}", remote, self.cwd, resolved);
        resolved
    }

    /// Change the working directory; the target must be a directory
    pub async fn change_directory(&mut self, remote: &str) -> Result<&S3Path> {
        let target = self.resolve(remote);
        if !self.fs.is_directory(&target).await? {
            return Err(Error::NotFound(target.to_string()));
        }
        self.cwd = target;
        Ok(&self.cwd)
    }
}
