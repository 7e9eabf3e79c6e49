//! Raw archiving to object storage.
//!
//! The post-transform record batch is serialized as a JSON array and written under
//! `raw/<name>` in the raw bucket. Archiving is independent of the warehouse path: neither
//! side's failure rolls back or blocks the other.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};

use crate::types::Record;

/// Key prefix for every archived object.
pub const RAW_PREFIX: &str = "raw/";

/// Default bucket for raw data.
pub const DEFAULT_BUCKET: &str = "raw";

const CONTENT_TYPE_JSON: &str = "application/json";

/// Errors that can occur while archiving.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("object store configuration error: {0}")]
    Config(String),

    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// The store refused the write for a backend-specific reason.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Minimal write interface to the raw object store.
#[async_trait]
pub trait RawStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> ArchiveResult<()>;

    /// Make one cheap request proving the store is reachable.
    async fn check(&self) -> ArchiveResult<()> {
        Ok(())
    }
}

/// Connection settings for an S3-compatible store (MinIO, AWS).
#[derive(Clone)]
pub struct ObjectStoreConfig {
    /// `host:port` or a full URL.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Use https when `endpoint` has no scheme.
    pub secure: bool,
}

impl fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"****")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("secure", &self.secure)
            .finish()
    }
}

impl ObjectStoreConfig {
    /// Endpoint as a URL, adding a scheme when missing.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.secure {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// [`RawStore`] over any `object_store` backend.
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl fmt::Debug for ObjectStoreSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreSink")
            .field("store", &self.store.to_string())
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Build an S3-compatible sink. No request is made until [`RawStore::check`] or the first write.
    pub fn s3(config: &ObjectStoreConfig) -> ArchiveResult<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(ArchiveError::Config("object store endpoint is empty".to_string()));
        }
        let store = AmazonS3Builder::new()
            .with_endpoint(config.endpoint_url())
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .with_allow_http(!config.secure)
            .build()?;
        tracing::info!(endpoint = %config.endpoint_url(), bucket = %config.bucket, "object store configured");
        Ok(Self::new(Arc::new(store), config.bucket.clone()))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl RawStore for ObjectStoreSink {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> ArchiveResult<()> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(&ObjectPath::from(key), PutPayload::from(body), opts)
            .await?;
        Ok(())
    }

    /// Lists the `raw/` prefix.
    async fn check(&self) -> ArchiveResult<()> {
        let prefix = ObjectPath::from(RAW_PREFIX.trim_end_matches('/'));
        let listing = self.store.list_with_delimiter(Some(&prefix)).await?;
        tracing::debug!(
            bucket = %self.bucket,
            objects = listing.objects.len(),
            "object store reachable"
        );
        Ok(())
    }
}

/// Receipt of a successful archive write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub key: String,
    pub bytes: usize,
    pub records: usize,
}

/// Writes record batches to a [`RawStore`].
#[derive(Clone)]
pub struct RawArchiver {
    store: Arc<dyn RawStore>,
}

impl fmt::Debug for RawArchiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawArchiver").finish_non_exhaustive()
    }
}

impl RawArchiver {
    pub fn new(store: Arc<dyn RawStore>) -> Self {
        Self { store }
    }

    /// Object key for a file source: `raw/raw_<file name>`.
    pub fn file_key(file_name: &str) -> String {
        format!("{RAW_PREFIX}raw_{file_name}")
    }

    /// Object key for a query source: `raw/raw_sql_<query>`.
    pub fn query_key(query: &str) -> String {
        format!("{RAW_PREFIX}raw_sql_{query}")
    }

    /// Serialize `records` as a JSON array and write it under `key`.
    pub async fn archive(&self, key: &str, records: &[Record]) -> ArchiveResult<ArchiveReceipt> {
        let body = serde_json::to_vec(records)?;
        let bytes = body.len();
        self.store.put(key, body, CONTENT_TYPE_JSON).await?;
        tracing::info!(key, bytes, records = records.len(), "archived raw records");
        Ok(ArchiveReceipt {
            key: key.to_string(),
            bytes,
            records: records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic_and_prefixed() {
        assert_eq!(RawArchiver::file_key("orders.csv"), "raw/raw_orders.csv");
        assert_eq!(
            RawArchiver::query_key("SELECT 1"),
            "raw/raw_sql_SELECT 1"
        );
    }

    #[test]
    fn endpoint_gets_scheme() {
        let mut config = ObjectStoreConfig {
            endpoint: "minio:9000".into(),
            access_key: "a".into(),
            secret_key: "s".into(),
            bucket: DEFAULT_BUCKET.into(),
            region: "us-east-1".into(),
            secure: false,
        };
        assert_eq!(config.endpoint_url(), "http://minio:9000");
        config.secure = true;
        assert_eq!(config.endpoint_url(), "https://minio:9000");
        config.endpoint = "http://localhost:9000".into();
        assert_eq!(config.endpoint_url(), "http://localhost:9000");
        assert!(!format!("{config:?}").contains("\"s\""));
    }

    #[test]
    fn empty_endpoint_is_a_config_error() {
        let config = ObjectStoreConfig {
            endpoint: " ".into(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: DEFAULT_BUCKET.into(),
            region: "us-east-1".into(),
            secure: false,
        };
        assert!(matches!(ObjectStoreSink::s3(&config), Err(ArchiveError::Config(_))));
    }

    #[tokio::test]
    async fn check_lists_the_raw_prefix() {
        let store = Arc::new(object_store::memory::InMemory::new());
        let sink = ObjectStoreSink::new(store.clone(), DEFAULT_BUCKET);
        sink.check().await.unwrap();

        RawArchiver::new(Arc::new(sink)).archive("raw/raw_a.csv", &[]).await.unwrap();
        let listing = store
            .list_with_delimiter(Some(&ObjectPath::from("raw")))
            .await
            .unwrap();
        assert_eq!(listing.objects.len(), 1);
    }

    #[tokio::test]
    async fn check_fails_when_the_endpoint_is_down() {
        let store = AmazonS3Builder::new()
            .with_endpoint("http://127.0.0.1:1")
            .with_bucket_name(DEFAULT_BUCKET)
            .with_region("us-east-1")
            .with_access_key_id("a")
            .with_secret_access_key("s")
            .with_allow_http(true)
            .with_retry(object_store::RetryConfig {
                max_retries: 0,
                retry_timeout: std::time::Duration::from_secs(1),
                ..Default::default()
            })
            .build()
            .unwrap();
        let sink = ObjectStoreSink::new(Arc::new(store), DEFAULT_BUCKET);

        let err = sink.check().await.unwrap_err();
        assert!(matches!(err, ArchiveError::ObjectStore(_)));
    }
}
