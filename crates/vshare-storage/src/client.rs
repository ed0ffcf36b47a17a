//! Object store client implementation.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Object store operations the pipeline depends on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Time-limited URL granting read access to one object.
    async fn signed_download_url(&self, bucket: &str, key: &str, ttl: Duration)
        -> StorageResult<String>;

    /// Time-limited URL granting write access to one object.
    async fn signed_upload_url(&self, bucket: &str, key: &str, ttl: Duration)
        -> StorageResult<String>;

    /// Store `data` at `key`, replacing any existing object.
    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()>;
}

/// Configuration for the object store client.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Region ("auto" for most S3-compatible providers)
    pub region: String,
    /// Upper bound on a single upload, retries included
    pub upload_timeout: Duration,
}

/// Default bound on a single upload.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

impl ObjectStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        })
    }
}

/// S3-compatible object store client. Buckets are chosen per call.
#[derive(Clone)]
pub struct ObjectStoreClient {
    client: Client,
    upload_timeout: Duration,
}

impl ObjectStoreClient {
    /// Create a new client from configuration.
    pub async fn new(config: ObjectStoreConfig) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vshare",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            upload_timeout: config.upload_timeout,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = ObjectStoreConfig::from_env()?;
        Self::new(config).await
    }

    /// Check connectivity to a bucket.
    pub async fn check_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| StorageError::config_error(format!("bucket {} unreachable: {}", bucket, e)))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for ObjectStoreClient {
    async fn signed_download_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        debug!("Signed download URL for {}/{} ({:?})", bucket, key, ttl);
        Ok(presigned.uri().to_string())
    }

    async fn signed_upload_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        let len = data.len();
        debug!("Uploading {} bytes to {}/{}", len, bucket, key);

        // PutObject replaces an existing key, so retries overwrite
        let put = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send();

        match tokio::time::timeout(self.upload_timeout, put).await {
            Ok(result) => {
                result.map_err(|e| StorageError::upload_failed(format!("{}/{}: {}", bucket, key, e)))?;
            }
            Err(_) => {
                warn!("Upload to {}/{} timed out after {:?}", bucket, key, self.upload_timeout);
                return Err(StorageError::Timeout(self.upload_timeout.as_secs()));
            }
        }

        info!("Uploaded {} bytes to {}/{}", len, bucket, key);
        Ok(())
    }
}
