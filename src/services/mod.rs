//! Business logic services

pub mod audit;
pub mod ids;
pub mod inventory;
pub mod loan_index;
pub mod loans;

use std::sync::Arc;

use crate::{
    config::LoansConfig,
    error::AppResult,
    repository::{kv::KeyValueStore, Repository, RetryPolicy},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub loans: loans::LoansService,
    pub audit: audit::AuditService,
    pub repository: Repository,
}

impl Services {
    /// Create all services on top of the given store
    pub fn new(store: Arc<dyn KeyValueStore>, config: &LoansConfig) -> Self {
        let repository = Repository::new(store, RetryPolicy::from(config));
        Self {
            loans: loans::LoansService::new(repository.clone(), config.id_claim_max_retries),
            audit: audit::AuditService::new(repository.clone()),
            repository,
        }
    }

    /// Check that the store answers
    pub async fn ping_store(&self) -> AppResult<()> {
        Ok(self.repository.store.ping().await?)
    }
}
