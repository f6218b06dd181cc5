use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use uuid::Uuid;

use crate::error::ObjectStoreError;
use crate::ObjectStore;

/// S3-compatible object store, used when `BROKER_S3_REGION`/`BROKER_S3_BUCKET`
/// are configured; otherwise the broker falls back to [`crate::FsObjectStore`].
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(region: &str, bucket: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        S3ObjectStore {
            client: Client::new(&config),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, bytes: &[u8], key_prefix: &str) -> Result<String, ObjectStoreError> {
        let key = format!("{}/{}.png", key_prefix.trim_end_matches('/'), Uuid::new_v4());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(bytes.to_vec().into())
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        Ok(key)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|_| ObjectStoreError::NotFound(key.to_string()))?;
        let data = out
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn presigned_url(&self, key: &str, ttl_secs: u64) -> Result<String, ObjectStoreError> {
        let presign_config = PresigningConfig::expires_in(Duration::from_secs(ttl_secs))
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }
}
