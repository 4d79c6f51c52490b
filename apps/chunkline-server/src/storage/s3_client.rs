//! S3-compatible storage client
//!
//! Wraps the AWS SDK for S3-compatible storage access.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};

use super::BlobStore;
use crate::config::S3Config;
use crate::error::{Result, StorageError};

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
    url_expiry: Duration,
}

impl S3Client {
    /// Create a new S3 client from configuration
    pub async fn new(config: &S3Config, url_expiry_secs: u64) -> Result<Self> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "chunkline",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and other S3-compatible services
            .build();

        let client = Client::from_conf(s3_config);

        let bucket = config.bucket.clone();
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            // Some providers deny HeadBucket to scoped keys that can still read and write
            tracing::warn!(bucket = %bucket, error = %e, "Could not verify bucket");
        }

        Ok(Self {
            client,
            bucket,
            url_expiry: Duration::from_secs(url_expiry_secs),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for S3Client {
    async fn put_file(&self, key: &str, source: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StorageError::backend("open", key, e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::backend("put", key, e))?;

        tracing::debug!(bucket = %self.bucket, key = %key, "Stored object");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => {
                    StorageError::ObjectNotFound(key.to_string())
                }
                _ => StorageError::backend("get", key, e),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::backend("read", key, e))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn public_url(&self, key: &str) -> Result<String> {
        let presigning = PresigningConfig::expires_in(self.url_expiry)
            .map_err(|e| StorageError::backend("presign", key, e))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::backend("presign", key, e))?;

        Ok(request.uri().to_string())
    }
}
