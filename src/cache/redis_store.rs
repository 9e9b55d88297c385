//! Redis-backed cache store.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use super::store::{CacheError, CacheStore};

const SCAN_BATCH: usize = 100;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|err| CacheError::backend("connect", err.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| CacheError::backend("connect", err.to_string()))?;
        Ok(Self { conn })
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor = 0u64;
        let mut found = Vec::new();
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::backend("scan", err.to_string()))?;
            found.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        // SCAN may return a key more than once.
        found.sort();
        found.dedup();
        Ok(found)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|err| CacheError::backend("get", err.to_string()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|err| CacheError::backend("set", err.to_string()))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys)
            .await
            .map_err(|err| CacheError::backend("delete", err.to_string()))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let keys = self.scan(pattern).await?;
        for chunk in keys.chunks(SCAN_BATCH) {
            self.delete(chunk).await?;
        }
        debug!(pattern, deleted = keys.len(), "Redis pattern delete complete");
        Ok(keys)
    }

    async fn flush_all(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| CacheError::backend("flush_all", err.to_string()))
    }
}
