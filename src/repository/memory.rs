//! In-memory key-value store
//!
//! Same semantics as the Redis backend without any I/O. Used by the test
//! suites and when the server runs with `store.backend = "memory"`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::kv::{KeyValueStore, KvResult};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.inner.lock().await.contains_key(key))
    }

    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.inner.lock().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        Ok(self.inner.lock().await.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8]) -> KvResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.contains_key(key) {
            return Ok(false);
        }
        inner.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        new_value: &[u8],
    ) -> KvResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(key) {
            Some(current) if current.as_slice() == expected => {
                *current = new_value.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        let mut inner = self.inner.lock().await;
        let matches = matches!(inner.get(key), Some(current) if current.as_slice() == expected);
        if matches {
            inner.remove(key);
        }
        Ok(matches)
    }

    async fn ping(&self) -> KvResult<()> {
        Ok(())
    }
}
