use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ObjectStoreError;
use crate::ObjectStore;

/// Local-filesystem fallback for the object store contract: blobs live
/// under `root`, served over HTTP at `base_url` by a static file server
/// running alongside this process (out of scope for this crate).
pub struct FsObjectStore {
    root: PathBuf,
    base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        FsObjectStore {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(&self, bytes: &[u8], key_prefix: &str) -> Result<String, ObjectStoreError> {
        let key = format!("{}/{}.png", key_prefix.trim_end_matches('/'), Uuid::new_v4());
        let path = self.path_for(&key);
        if let Some(parent) = Path::new(&path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(key)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.path_for(key);
        tokio::fs::read(&path)
            .await
            .map_err(|_| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn presigned_url(&self, key: &str, _ttl_secs: u64) -> Result<String, ObjectStoreError> {
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let dir = tempfile_dir();
        let store = FsObjectStore::new(dir.clone(), "http://localhost:8080/static");
        let key = store.upload(b"hello", "output/req-1").await.unwrap();
        assert!(key.starts_with("output/req-1/"));
        let bytes = store.download(&key).await.unwrap();
        assert_eq!(bytes, b"hello");
        let url = store.presigned_url(&key, 3600).await.unwrap();
        assert!(url.starts_with("http://localhost:8080/static/output/req-1/"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn download_missing_key_is_not_found() {
        let dir = tempfile_dir();
        let store = FsObjectStore::new(dir.clone(), "http://localhost:8080/static");
        let err = store.download("output/missing.png").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::NotFound(_)));
        let _ = std::fs::remove_dir_all(dir);
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("broker-objectstore-test-{}", Uuid::new_v4()));
        dir
    }
}
