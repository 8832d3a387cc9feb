//! Users repository: loan index access

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::user::{user_key, UserRecord, USER_PREFIX},
};

use super::{fetch, kv::KeyValueStore, update_record, RetryPolicy};

#[derive(Clone)]
pub struct UsersRepository {
    store: Arc<dyn KeyValueStore>,
    policy: RetryPolicy,
}

impl UsersRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Get user by username (case-insensitive)
    pub async fn get_by_username(&self, username: &str) -> AppResult<UserRecord> {
        fetch::<UserRecord>(self.store.as_ref(), &user_key(username))
            .await?
            .map(|v| v.value)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))
    }

    /// Write a whole user record, as account management does
    pub async fn save(&self, user: &UserRecord) -> AppResult<()> {
        let bytes = serde_json::to_vec(user)?;
        self.store.set(&user_key(&user.username), &bytes).await?;
        Ok(())
    }

    pub async fn update<F>(&self, username: &str, apply: F) -> AppResult<Option<UserRecord>>
    where
        F: FnMut(&mut UserRecord) -> AppResult<bool>,
    {
        update_record(self.store.as_ref(), self.policy, &user_key(username), apply).await
    }

    /// Every user record, paired with the username taken from its key
    pub async fn list(&self) -> AppResult<Vec<(String, UserRecord)>> {
        let mut users = Vec::new();
        for key in self.store.scan_prefix(USER_PREFIX).await? {
            if let Some(user) = fetch::<UserRecord>(self.store.as_ref(), &key).await? {
                let username = key.strip_prefix(USER_PREFIX).unwrap_or(&key).to_string();
                users.push((username, user.value));
            }
        }
        users.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(users)
    }
}
