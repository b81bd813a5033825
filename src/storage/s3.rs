//! S3 backend
//!
//! `ObjectStore` over an S3-compatible endpoint using `rust-s3`. The crate
//! is built without `fail-on-err`, so HTTP status codes are inspected here
//! and folded into `StoreError`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use s3::Bucket;
use tracing::{debug, info};

use super::{
    ByteRange, ListPage, ListRequest, ObjectMeta, ObjectStore, ObjectSummary, StoreConnector,
    StoreError, StoreResult,
};
use crate::config::StorageConfig;

/// S3-backed object store
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    /// Build a bucket handle from configuration. No request is made.
    pub fn new(config: &StorageConfig) -> StoreResult<Self> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse::<Region>()
                .map_err(|e| StoreError::Backend(format!("invalid region {}: {}", config.region, e)))?,
        };

        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => {
                Credentials::new(Some(access.as_str()), Some(secret.as_str()), None, None, None)
            }
            _ => Credentials::default(),
        }
        .map_err(|e| StoreError::Unavailable(format!("credentials: {}", e)))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials).map_err(classify)?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket })
    }
}

/// Map a transport-level `rust-s3` error
fn classify(e: S3Error) -> StoreError {
    match e {
        S3Error::HttpFailWithBody(code, body) => from_status(code, &body, ""),
        other => StoreError::Unavailable(other.to_string()),
    }
}

/// Map a non-2xx status code
fn from_status(code: u16, body: &str, key: &str) -> StoreError {
    match code {
        404 => StoreError::NoSuchKey(key.to_string()),
        500..=599 => StoreError::Unavailable(format!("HTTP {}: {}", code, body)),
        _ => StoreError::Backend(format!("HTTP {}: {}", code, body)),
    }
}

fn check_status(code: u16, body: &[u8], key: &str) -> StoreResult<()> {
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(from_status(code, &String::from_utf8_lossy(body), key))
    }
}

fn keyed(e: S3Error, key: &str) -> StoreError {
    match classify(e) {
        StoreError::NoSuchKey(_) => StoreError::NoSuchKey(key.to_string()),
        other => other,
    }
}

fn parse_listing_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_header_time(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> StoreResult<Bytes> {
        debug!("s3 get {} {:?}", key, range);
        let response = match range {
            None => self.bucket.get_object(key).await,
            Some(range) => {
                self.bucket
                    .get_object_range(key, range.start, Some(range.end))
                    .await
            }
        }
        .map_err(|e| keyed(e, key))?;

        // Requested range starts past the end of the object
        if response.status_code() == 416 {
            return Ok(Bytes::new());
        }
        check_status(response.status_code(), response.bytes(), key)?;
        Ok(response.bytes().clone())
    }

    async fn put_object(&self, key: &str, body: Bytes) -> StoreResult<()> {
        debug!("s3 put {} ({} bytes)", key, body.len());
        let response = self
            .bucket
            .put_object(key, &body)
            .await
            .map_err(|e| keyed(e, key))?;
        check_status(response.status_code(), response.bytes(), key)
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectMeta> {
        debug!("s3 head {}", key);
        let (head, code) = self.bucket.head_object(key).await.map_err(|e| keyed(e, key))?;
        check_status(code, &[], key)?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size: head.content_length.unwrap_or(0).max(0) as u64,
            last_modified: parse_header_time(head.last_modified.as_deref()),
        })
    }

    async fn list_objects(&self, request: ListRequest) -> StoreResult<ListPage> {
        debug!(
            "s3 list prefix={} delimiter={:?} token={:?}",
            request.prefix, request.delimiter, request.continuation_token
        );
        let (result, code) = self
            .bucket
            .list_page(
                request.prefix.clone(),
                request.delimiter.clone(),
                request.continuation_token.clone(),
                None,
                request.max_keys,
            )
            .await
            .map_err(classify)?;
        check_status(code, &[], &request.prefix)?;

        let contents = result
            .contents
            .into_iter()
            .map(|object| ObjectSummary {
                last_modified: parse_listing_time(&object.last_modified),
                key: object.key,
                size: object.size,
            })
            .collect();
        let common_prefixes = result
            .common_prefixes
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.prefix)
            .collect();
        let next_continuation_token = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };

        Ok(ListPage {
            contents,
            common_prefixes,
            next_continuation_token,
        })
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        debug!("s3 delete {}", key);
        let response = match self.bucket.delete_object(key).await {
            Ok(response) => response,
            Err(e) => {
                return match keyed(e, key) {
                    StoreError::NoSuchKey(_) => Ok(()),
                    other => Err(other),
                }
            }
        };
        match response.status_code() {
            404 => Ok(()),
            code => check_status(code, response.bytes(), key),
        }
    }

    async fn copy_object(&self, src_key: &str, dst_key: &str) -> StoreResult<()> {
        debug!("s3 copy {} -> {}", src_key, dst_key);
        let code = self
            .bucket
            .copy_object_internal(src_key, dst_key)
            .await
            .map_err(|e| keyed(e, src_key))?;
        check_status(code, &[], src_key)
    }

    async fn health_check(&self) -> StoreResult<()> {
        let (_, code) = self
            .bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await
            .map_err(classify)?;
        check_status(code, &[], "")
    }

    fn bucket(&self) -> &str {
        &self.bucket.name
    }
}

/// Connector that builds a fresh `S3Store` and probes it before use
pub struct S3Connector {
    config: StorageConfig,
}

impl S3Connector {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreConnector for S3Connector {
    async fn connect(&self) -> StoreResult<Arc<dyn ObjectStore>> {
        let store = S3Store::new(&self.config)?;
        store.health_check().await?;
        info!("Connected to S3 bucket {}", self.config.bucket);
        Ok(Arc::new(store))
    }
}
