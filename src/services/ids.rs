//! Loan identifier allocation
//!
//! Identifiers are the smallest positive integers not held by a loan
//! record. Probing alone is not safe against concurrent allocators, so an
//! id only counts as allocated once the loan has been written under it with
//! a create-if-absent; a lost claim probes again.

use crate::{
    error::{AppError, AppResult},
    models::Loan,
    repository::loans::LoansRepository,
};

#[derive(Clone)]
pub struct IdAllocator {
    loans: LoansRepository,
    max_retries: u32,
}

impl IdAllocator {
    pub fn new(loans: LoansRepository, max_retries: u32) -> Self {
        Self {
            loans,
            max_retries: max_retries.max(1),
        }
    }

    /// Smallest positive id with no loan record right now.
    ///
    /// The answer can be stale by the time the caller uses it; use
    /// [`IdAllocator::claim`] to actually take an id.
    pub async fn next_free(&self) -> AppResult<i64> {
        let mut candidate: i64 = 1;
        while self.loans.exists(candidate).await? {
            candidate = candidate
                .checked_add(1)
                .ok_or_else(|| AppError::Internal("loan id space exhausted".to_string()))?;
        }
        Ok(candidate)
    }

    /// Allocate an id and store the loan built for it in one step
    pub async fn claim<F>(&self, build: F) -> AppResult<Loan>
    where
        F: Fn(i64) -> Loan,
    {
        for attempt in 1..=self.max_retries {
            let id = self.next_free().await?;
            let loan = build(id);
            if self.loans.insert_new(&loan).await? {
                return Ok(loan);
            }
            tracing::debug!(loan_id = id, attempt, "loan id taken concurrently, probing again");
        }

        Err(AppError::Conflict(format!(
            "could not claim a loan id after {} attempts",
            self.max_retries
        )))
    }
}
