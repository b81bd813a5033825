//! wolfs3fs Configuration
//!
//! This module provides configuration structures for the object-store
//! backed filesystem adapter.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Main wolfs3fs configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wolfs3fsConfig {
    /// Object storage configuration
    pub storage: StorageConfig,

    /// Directory listing configuration
    #[serde(default)]
    pub listing: ListingConfig,

    /// Byte channel configuration
    #[serde(default)]
    pub channels: ChannelConfig,

    /// Synthetic attribute configuration
    #[serde(default)]
    pub attributes: AttributeConfig,

    /// Home directory configuration
    #[serde(default)]
    pub homes: HomeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3-compatible endpoint
    S3,
    /// In-process store (development and tests)
    Memory,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Bucket name
    pub bucket: String,

    /// Region name
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint URL (MinIO, Ceph RGW, ...)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Access key (falls back to the environment when unset)
    #[serde(default)]
    pub access_key: Option<String>,

    /// Secret key (falls back to the environment when unset)
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Use path-style addressing instead of virtual-hosted buckets
    #[serde(default)]
    pub path_style: bool,
}

/// Directory listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Keys requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Byte channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Initial capacity of read-write channel buffers in bytes
    #[serde(default = "default_initial_buffer_size")]
    pub initial_buffer_size: usize,

    /// Largest object a read-write channel will hold in memory
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: u64,
}

/// Synthetic attribute configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    /// Owner name reported for every entry
    #[serde(default = "default_principal")]
    pub owner: String,

    /// Group name reported for every entry
    #[serde(default = "default_principal")]
    pub group: String,
}

/// Home directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeConfig {
    /// Template for unmapped users; `{user}` is replaced by the user name
    #[serde(default = "default_home_template")]
    pub default_template: String,

    /// Explicit user -> home path mappings
    #[serde(default = "default_home_users")]
    pub users: HashMap<String, String>,

    /// Directories created by `bootstrap` when missing
    #[serde(default = "default_bootstrap_dirs")]
    pub bootstrap: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (full, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_backend() -> StorageBackend {
    StorageBackend::S3
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_initial_buffer_size() -> usize {
    8192
}

/// 5 GiB, the largest single PUT S3 accepts
fn default_max_buffer_size() -> u64 {
    5 * 1024 * 1024 * 1024
}

fn default_principal() -> String {
    "admin".to_string()
}

fn default_home_template() -> String {
    "/home/{user}".to_string()
}

fn default_home_users() -> HashMap<String, String> {
    HashMap::from([("admin".to_string(), "/home/admin".to_string())])
}

fn default_bootstrap_dirs() -> Vec<String> {
    vec!["/home".to_string(), "/home/admin".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "full".to_string()
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: default_initial_buffer_size(),
            max_buffer_size: default_max_buffer_size(),
        }
    }
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            owner: default_principal(),
            group: default_principal(),
        }
    }
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            default_template: default_home_template(),
            users: default_home_users(),
            bootstrap: default_bootstrap_dirs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl StorageConfig {
    /// In-process store for `bucket`
    pub fn memory(bucket: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Memory,
            bucket: bucket.into(),
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

impl Wolfs3fsConfig {
    /// Configuration with defaults everywhere except the storage section
    pub fn with_storage(storage: StorageConfig) -> Self {
        Self {
            storage,
            listing: ListingConfig::default(),
            channels: ChannelConfig::default(),
            attributes: AttributeConfig::default(),
            homes: HomeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: Wolfs3fsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.storage.bucket.is_empty() {
            return Err(crate::Error::Config("storage.bucket cannot be empty".into()));
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(crate::Error::Config(
                "storage.access_key and storage.secret_key must be set together".into(),
            ));
        }

        if self.listing.page_size == 0 || self.listing.page_size > 1000 {
            return Err(crate::Error::Config(
                "listing.page_size must be between 1 and 1000".into(),
            ));
        }

        if self.channels.initial_buffer_size == 0 {
            return Err(crate::Error::Config(
                "channels.initial_buffer_size cannot be zero".into(),
            ));
        }

        if self.channels.max_buffer_size < self.channels.initial_buffer_size as u64 {
            return Err(crate::Error::Config(
                "channels.max_buffer_size cannot be smaller than channels.initial_buffer_size".into(),
            ));
        }

        if !self.homes.default_template.starts_with('/') {
            return Err(crate::Error::Config(
                "homes.default_template must be an absolute path".into(),
            ));
        }

        for (user, home) in &self.homes.users {
            if !home.starts_with('/') {
                return Err(crate::Error::Config(format!(
                    "home directory for {} must be an absolute path",
                    user
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[storage]
bucket = "customsftpfolderpath"
region = "eu-west-1"
endpoint = "http://localhost:9000"
access_key = "minio"
secret_key = "minio123"
path_style = true

[listing]
page_size = 250

[homes]
users = { admin = "/home/admin", ops = "/srv/ops" }
"#;

        let config = Wolfs3fsConfig::from_str(toml).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.bucket, "customsftpfolderpath");
        assert!(config.storage.path_style);
        assert_eq!(config.listing.page_size, 250);
        assert_eq!(config.homes.users.get("ops").map(String::as_str), Some("/srv/ops"));
        assert_eq!(config.homes.default_template, "/home/{user}");
        assert_eq!(config.channels.initial_buffer_size, 8192);
        assert_eq!(config.channels.max_buffer_size, 5 * 1024 * 1024 * 1024);
        assert_eq!(config.attributes.owner, "admin");
    }

    #[test]
    fn test_memory_backend_defaults() {
        let toml = r#"
[storage]
backend = "memory"
bucket = "scratch"
"#;
        let config = Wolfs3fsConfig::from_str(toml).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.homes.bootstrap, vec!["/home", "/home/admin"]);
    }

    #[test]
    fn test_validation_errors() {
        let err = Wolfs3fsConfig::from_str("[storage]\nbucket = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("storage.bucket"));

        let err = Wolfs3fsConfig::from_str(
            "[storage]\nbucket = \"b\"\naccess_key = \"only-half\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("secret_key"));

        let err = Wolfs3fsConfig::from_str("[storage]\nbucket = \"b\"\n[listing]\npage_size = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("page_size"));

        let err = Wolfs3fsConfig::from_str(
            "[storage]\nbucket = \"b\"\n[homes]\ndefault_template = \"home/{user}\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("absolute"));

        let err = Wolfs3fsConfig::from_str(
            "[storage]\nbucket = \"b\"\n[channels]\ninitial_buffer_size = 4096\nmax_buffer_size = 1024\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_buffer_size"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nbucket = \"from-disk\"").unwrap();

        let config = Wolfs3fsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.storage.bucket, "from-disk");

        let missing = Wolfs3fsConfig::from_file(std::path::Path::new("/nonexistent/wolfs3fs.toml"));
        assert!(matches!(missing, Err(crate::Error::Io(_))));
    }
}
