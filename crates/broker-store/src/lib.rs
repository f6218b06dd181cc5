//! Thin typed facade over the key/value store backing the job broker.
//!
//! Every operation is single-key atomic; no multi-key transactions are
//! required or used. String values are UTF-8; numbers are stored as decimal
//! strings by the caller (this crate never interprets field contents).

mod error;
mod redis_store;
pub mod testing;

pub use error::StoreError;
pub use redis_store::RedisStore;

use std::collections::HashMap;

use async_trait::async_trait;

/// The store adapter contract. Implemented by [`RedisStore`] for production
/// use and by [`testing::MemoryStore`] for unit tests that exercise the
/// dispatch loop without a running Redis instance.
#[async_trait]
pub trait Store: Send + Sync {
    /// Push a value onto the left end of list `q`.
    async fn list_push_left(&self, q: &str, v: &str) -> Result<(), StoreError>;

    /// Pop a value from the right end of list `q`, FIFO with `list_push_left`.
    async fn list_pop_right(&self, q: &str) -> Result<Option<String>, StoreError>;

    /// Current length of list `q`.
    async fn list_len(&self, q: &str) -> Result<i64, StoreError>;

    /// All field/value pairs of hash `k`. Empty map if the key does not exist.
    async fn hash_get_all(&self, k: &str) -> Result<HashMap<String, String>, StoreError>;

    /// A single field of hash `k`.
    async fn hash_get(&self, k: &str, f: &str) -> Result<Option<String>, StoreError>;

    /// Merge `m` into hash `k`, creating it if absent.
    async fn hash_set(&self, k: &str, m: &HashMap<String, String>) -> Result<(), StoreError>;

    /// Whether key `k` exists at all (any type).
    async fn key_exists(&self, k: &str) -> Result<bool, StoreError>;

    /// All keys whose name begins with prefix `p`.
    async fn scan_by_prefix(&self, p: &str) -> Result<Vec<String>, StoreError>;

    /// Read string key `k`.
    async fn string_get(&self, k: &str) -> Result<Option<String>, StoreError>;

    /// Write string key `k`.
    async fn string_set(&self, k: &str, v: &str) -> Result<(), StoreError>;
}
