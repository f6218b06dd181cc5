//! An in-memory [`ObjectStore`] for tests that should not touch the
//! filesystem or a real S3 bucket.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ObjectStoreError;
use crate::ObjectStore;

#[derive(Default)]
pub struct MemoryObjectStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        MemoryObjectStore::default()
    }

    /// Pre-seed a key, e.g. to stand in for an already-uploaded input blob.
    pub fn seed(&self, key: &str, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, bytes: &[u8], key_prefix: &str) -> Result<String, ObjectStoreError> {
        let key = format!("{}/{}.png", key_prefix.trim_end_matches('/'), Uuid::new_v4());
        self.blobs.lock().unwrap().insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn presigned_url(&self, key: &str, _ttl_secs: u64) -> Result<String, ObjectStoreError> {
        Ok(format!("memory://{key}"))
    }
}
