//! Repository layer over the key-value store
//!
//! Records are JSON documents under `loan_<id>`, `book_<id>` and
//! `user_<lowercase username>`. Every read-modify-write goes through
//! [`update_record`], which commits with a compare-and-swap against the
//! bytes it read and retries when another writer got there first.

pub mod books;
pub mod kv;
pub mod loans;
pub mod memory;
pub mod redis;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
};
use kv::KeyValueStore;

/// Bounds for optimistic retries
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl RetryPolicy {
    async fn backoff(&self) {
        if self.delay_ms == 0 {
            tokio::task::yield_now().await;
            return;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.delay_ms);
        tokio::time::sleep(Duration::from_millis(jitter)).await;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LoansConfig::default())
    }
}

impl From<&LoansConfig> for RetryPolicy {
    fn from(config: &LoansConfig) -> Self {
        Self {
            max_retries: config.cas_max_retries.max(1),
            delay_ms: config.cas_retry_delay_ms,
        }
    }
}

/// A decoded record together with the exact bytes it was read from
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    raw: Vec<u8>,
}

impl<T> Versioned<T> {
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

pub(crate) async fn fetch<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> AppResult<Option<Versioned<T>>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(Versioned {
            value: serde_json::from_slice(&raw)?,
            raw,
        })),
        None => Ok(None),
    }
}

/// Atomically apply `apply` to the record under `key`.
///
/// `apply` returns `Ok(true)` when it changed the record, `Ok(false)` to
/// leave it as is, or an error to abort without writing. Returns the record
/// as committed, or `None` if the key holds nothing.
pub(crate) async fn update_record<T, F>(
    store: &dyn KeyValueStore,
    policy: RetryPolicy,
    key: &str,
    mut apply: F,
) -> AppResult<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(&mut T) -> AppResult<bool>,
{
    let mut attempt = 0;

    loop {
        let Some(current) = store.get(key).await? else {
            return Ok(None);
        };

        let mut record: T = serde_json::from_slice(&current)?;
        if !apply(&mut record)? {
            return Ok(Some(record));
        }

        let next = serde_json::to_vec(&record)?;
        if store.compare_and_swap(key, &current, &next).await? {
            return Ok(Some(record));
        }

        attempt += 1;
        if attempt >= policy.max_retries {
            return Err(AppError::Conflict(format!(
                "{} kept changing, gave up after {} attempts",
                key, attempt
            )));
        }
        tracing::debug!(key, attempt, "concurrent write detected, retrying");
        policy.backoff().await;
    }
}

/// Main repository struct holding the store handle
#[derive(Clone)]
pub struct Repository {
    pub store: Arc<dyn KeyValueStore>,
    pub loans: loans::LoansRepository,
    pub books: books::BooksRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository on top of the given store
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RetryPolicy) -> Self {
        Self {
            loans: loans::LoansRepository::new(store.clone(), policy),
            books: books::BooksRepository::new(store.clone(), policy),
            users: users::UsersRepository::new(store.clone(), policy),
            store,
        }
    }
}
