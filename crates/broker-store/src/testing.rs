//! An in-memory [`Store`] implementation for tests.
//!
//! Mirrors the `MockStore` pattern used to test `JobManager` against a fake
//! backend: a `Mutex`-guarded map standing in for the real server, so the
//! dispatch loop's scenario tests (retry, watchdog reap, FIFO activation)
//! run without a Redis instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Store, StoreError};

#[derive(Default)]
struct Inner {
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    strings: HashMap<String, String>,
}

/// A single-process, in-memory stand-in for [`crate::RedisStore`].
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_push_left(&self, q: &str, v: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.lists.entry(q.to_string()).or_default().push_front(v.to_string());
        Ok(())
    }

    async fn list_pop_right(&self, q: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.lists.get_mut(q).and_then(|l| l.pop_back()))
    }

    async fn list_len(&self, q: &str) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.lists.get(q).map(|l| l.len() as i64).unwrap_or(0))
    }

    async fn hash_get_all(&self, k: &str) -> Result<HashMap<String, String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hashes.get(k).cloned().unwrap_or_default())
    }

    async fn hash_get(&self, k: &str, f: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hashes.get(k).and_then(|h| h.get(f).cloned()))
    }

    async fn hash_set(&self, k: &str, m: &HashMap<String, String>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.hashes.entry(k.to_string()).or_default();
        for (field, value) in m {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn key_exists(&self, k: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hashes.contains_key(k)
            || inner.lists.contains_key(k)
            || inner.strings.contains_key(k))
    }

    async fn scan_by_prefix(&self, p: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<String> = inner
            .hashes
            .keys()
            .chain(inner.strings.keys())
            .filter(|k| k.starts_with(p))
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn string_get(&self, k: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.strings.get(k).cloned())
    }

    async fn string_set(&self, k: &str, v: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.insert(k.to_string(), v.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_push_left_pop_right_is_fifo() {
        let store = MemoryStore::new();
        store.list_push_left("q", "a").await.unwrap();
        store.list_push_left("q", "b").await.unwrap();
        store.list_push_left("q", "c").await.unwrap();
        assert_eq!(store.list_pop_right("q").await.unwrap(), Some("a".into()));
        assert_eq!(store.list_pop_right("q").await.unwrap(), Some("b".into()));
        assert_eq!(store.list_pop_right("q").await.unwrap(), Some("c".into()));
        assert_eq!(store.list_pop_right("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hash_set_merges_fields() {
        let store = MemoryStore::new();
        let mut m1 = HashMap::new();
        m1.insert("status".into(), "queued".into());
        store.hash_set("job:1", &m1).await.unwrap();
        let mut m2 = HashMap::new();
        m2.insert("attempt".into(), "2".into());
        store.hash_set("job:1", &m2).await.unwrap();
        let all = store.hash_get_all("job:1").await.unwrap();
        assert_eq!(all.get("status"), Some(&"queued".to_string()));
        assert_eq!(all.get("attempt"), Some(&"2".to_string()));
    }

    #[tokio::test]
    async fn scan_by_prefix_finds_matching_keys_only() {
        let store = MemoryStore::new();
        let mut m = HashMap::new();
        m.insert("status".into(), "queued".into());
        store.hash_set("job:1", &m).await.unwrap();
        store.hash_set("job:2", &m).await.unwrap();
        store.string_set("avg_processing_time", "80").await.unwrap();
        let keys = store.scan_by_prefix("job:").await.unwrap();
        assert_eq!(keys.len(), 2);
    }
}
