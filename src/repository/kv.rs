//! Key-value store contract
//!
//! Single-key operations only: there is no multi-key transaction. The
//! conditional writes (`set_if_absent`, `compare_and_swap`,
//! `compare_and_delete`) are each atomic on their own key, which is what the
//! loan engine builds its consistency on.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// The store could not be reached or did not answer in time
    #[error("{0}")]
    Unavailable(String),

    /// The store answered with an error
    #[error("{0}")]
    Backend(String),
}

pub type KvResult<T> = Result<T, KvError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, `None` when absent
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    async fn exists(&self, key: &str) -> KvResult<bool>;

    /// Unconditional write
    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()>;

    /// Returns whether a value was actually removed
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// All keys starting with `prefix`, in no particular order
    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<String>>;

    /// Write only if `key` holds nothing; returns whether the write happened
    async fn set_if_absent(&self, key: &str, value: &[u8]) -> KvResult<bool>;

    /// Replace the value only if it is still exactly `expected`
    async fn compare_and_swap(&self, key: &str, expected: &[u8], new_value: &[u8])
        -> KvResult<bool>;

    /// Delete only if the value is still exactly `expected`
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool>;

    async fn ping(&self) -> KvResult<()>;
}
