//! Loans repository

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::loan::{loan_id_from_key, loan_key, Loan, LOAN_PREFIX},
};

use super::{fetch, kv::KeyValueStore, update_record, RetryPolicy, Versioned};

#[derive(Clone)]
pub struct LoansRepository {
    store: Arc<dyn KeyValueStore>,
    policy: RetryPolicy,
}

impl LoansRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Loan> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    pub async fn find(&self, id: i64) -> AppResult<Option<Loan>> {
        Ok(self.fetch(id).await?.map(|v| v.value))
    }

    /// Loan along with the stored bytes, for conditional deletes
    pub async fn fetch(&self, id: i64) -> AppResult<Option<Versioned<Loan>>> {
        fetch(self.store.as_ref(), &loan_key(id)).await
    }

    pub async fn exists(&self, id: i64) -> AppResult<bool> {
        Ok(self.store.exists(&loan_key(id)).await?)
    }

    /// Store a loan under an id nobody holds yet; `false` if the id is taken
    pub async fn insert_new(&self, loan: &Loan) -> AppResult<bool> {
        let bytes = serde_json::to_vec(loan)?;
        Ok(self.store.set_if_absent(&loan.key(), &bytes).await?)
    }

    /// Atomically modify a loan, `None` if it does not exist
    pub async fn update<F>(&self, id: i64, apply: F) -> AppResult<Option<Loan>>
    where
        F: FnMut(&mut Loan) -> AppResult<bool>,
    {
        update_record(self.store.as_ref(), self.policy, &loan_key(id), apply).await
    }

    /// Delete the loan only if it is still exactly what was read
    pub async fn delete_if_unchanged(&self, loan: &Versioned<Loan>) -> AppResult<bool> {
        Ok(self
            .store
            .compare_and_delete(&loan.value.key(), loan.raw())
            .await?)
    }

    /// Loans for the given ids, skipping ids whose record is gone
    pub async fn get_many(&self, ids: &[i64]) -> AppResult<Vec<Loan>> {
        let mut loans = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.find(id).await? {
                Some(loan) => loans.push(loan),
                None => tracing::warn!(loan_id = id, "indexed loan has no record, skipping"),
            }
        }
        Ok(loans)
    }

    /// Every loan in the store, ordered by id
    pub async fn list(&self) -> AppResult<Vec<Loan>> {
        let mut ids: Vec<i64> = self
            .store
            .scan_prefix(LOAN_PREFIX)
            .await?
            .iter()
            .filter_map(|key| loan_id_from_key(key))
            .collect();
        ids.sort_unstable();

        let mut loans = Vec::with_capacity(ids.len());
        for id in ids {
            // Records can disappear between the scan and the read
            if let Some(loan) = self.find(id).await? {
                loans.push(loan);
            }
        }
        Ok(loans)
    }
}
