//! Redis-backed key-value store

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError, Script};

use super::kv::{KeyValueStore, KvError, KvResult};

/// SET the key only if it still holds ARGV[1]
static COMPARE_AND_SWAP: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            redis.call('SET', KEYS[1], ARGV[2])
            return 1
        end
        return 0
        ",
    )
});

/// DEL the key only if it still holds ARGV[1]
static COMPARE_AND_DELETE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        end
        return 0
        ",
    )
});

impl From<RedisError> for KvError {
    fn from(e: RedisError) -> Self {
        if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
        {
            KvError::Unavailable(e.to_string())
        } else {
            KvError::Backend(e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and check the connection with a PING
    pub async fn new(url: &str) -> KvResult<Self> {
        let client = Client::open(url)
            .map_err(|e| KvError::Backend(format!("Failed to create Redis client: {}", e)))?;

        let conn = ConnectionManager::new(client).await?;
        let store = Self { conn };
        store.ping().await?;

        Ok(store)
    }
}

/// Escape glob metacharacters so a key prefix matches literally in SCAN MATCH
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        Ok(conn.get::<_, Option<Vec<u8>>>(key).await?)
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists::<_, bool>(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut iter = conn.scan_match::<_, String>(scan_pattern(prefix)).await?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        // SCAN may report a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn set_if_absent(&self, key: &str, value: &[u8]) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.set_nx::<_, _, bool>(key, value).await?)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new_value: &[u8],
    ) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        let swapped: i64 = COMPARE_AND_SWAP
            .key(key)
            .arg(expected)
            .arg(new_value)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = COMPARE_AND_DELETE
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn ping(&self) -> KvResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
