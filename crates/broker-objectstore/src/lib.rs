//! Object store adapter for job input/output blobs.
//!
//! `upload`/`download`/`presigned_url` are satisfied by either a local
//! filesystem directory served over HTTP, or (feature `s3`) an S3-compatible
//! bucket, behind the same [`ObjectStore`] trait.

mod error;
mod fs_store;
#[cfg(feature = "s3")]
mod s3_store;
pub mod testing;

pub use error::ObjectStoreError;
pub use fs_store::FsObjectStore;
#[cfg(feature = "s3")]
pub use s3_store::S3ObjectStore;

use async_trait::async_trait;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under a freshly generated key beginning with `key_prefix`.
    async fn upload(&self, bytes: &[u8], key_prefix: &str) -> Result<String, ObjectStoreError>;

    /// Retrieve the bytes stored under `key`.
    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// A publicly resolvable URL for `key`, valid for roughly `ttl_secs`.
    async fn presigned_url(&self, key: &str, ttl_secs: u64) -> Result<String, ObjectStoreError>;
}
