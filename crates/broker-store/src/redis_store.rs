use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::StoreError;
use crate::Store;

/// A [`Store`] backed by a Redis-compatible server, reached over a
/// multiplexed, auto-reconnecting connection.
///
/// `LPUSH`/`RPOP`/`LLEN`/`HGETALL`/`HGET`/`HSET`/`EXISTS`/`SCAN`/`GET`/`SET`
/// map directly onto the adapter contract, which is why this is a thin
/// wrapper rather than a query builder: the store adapter's job is just to
/// give the rest of the broker a typed, single-key-atomic facade.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(RedisStore { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn list_push_left(&self, q: &str, v: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(q, v).await?;
        Ok(())
    }

    async fn list_pop_right(&self, q: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let v: Option<String> = conn.rpop(q, None).await?;
        Ok(v)
    }

    async fn list_len(&self, q: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let n: i64 = conn.llen(q).await?;
        Ok(n)
    }

    async fn hash_get_all(&self, k: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        let m: HashMap<String, String> = conn.hgetall(k).await?;
        Ok(m)
    }

    async fn hash_get(&self, k: &str, f: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let v: Option<String> = conn.hget(k, f).await?;
        Ok(v)
    }

    async fn hash_set(&self, k: &str, m: &HashMap<String, String>) -> Result<(), StoreError> {
        if m.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let pairs: Vec<(&str, &str)> = m.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        conn.hset_multiple::<_, _, _, ()>(k, &pairs).await?;
        Ok(())
    }

    async fn key_exists(&self, k: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(k).await?;
        Ok(exists)
    }

    async fn scan_by_prefix(&self, p: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{p}*");
        let mut cursor = 0u64;
        let mut out = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(StoreError::from)?;
            out.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(out)
    }

    async fn string_get(&self, k: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let v: Option<String> = conn.get(k).await?;
        Ok(v)
    }

    async fn string_set(&self, k: &str, v: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(k, v).await?;
        Ok(())
    }
}
