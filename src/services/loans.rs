//! Loan lifecycle engine
//!
//! A loan is created pending, then either approved and later returned, or
//! declined. Returned and declined loans are deleted. The loan record, the
//! book counter and the borrower's index live under separate keys with no
//! transaction spanning them, so each operation orders its single-key steps
//! so that the record deciding the loan's fate is written last.

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{normalize_username, LoanFilter},
        Loan,
    },
    repository::Repository,
};

use super::{ids::IdAllocator, inventory::InventoryCounter, loan_index::LoanIndex};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    ids: IdAllocator,
    inventory: InventoryCounter,
    index: LoanIndex,
}

impl LoansService {
    pub fn new(repository: Repository, id_claim_max_retries: u32) -> Self {
        Self {
            ids: IdAllocator::new(repository.loans.clone(), id_claim_max_retries),
            inventory: InventoryCounter::new(repository.books.clone()),
            index: LoanIndex::new(repository.users.clone()),
            repository,
        }
    }

    /// Request a loan of `book_id` for `username`
    pub async fn create(&self, book_id: i64, username: &str) -> AppResult<Loan> {
        if book_id == 0 {
            return Err(AppError::InvalidRequest("book id is required".to_string()));
        }
        if username.is_empty() {
            return Err(AppError::InvalidRequest("username is required".to_string()));
        }
        let username = normalize_username(username);

        // No id is claimed for a borrower without a user record
        self.repository.users.get_by_username(&username).await?;

        let loan = self.ids.claim(|id| Loan::new(id, book_id, &username)).await?;

        // The loan is stored but not indexed until this succeeds
        if let Err(e) = self.index.add(&username, loan.id).await {
            tracing::warn!(
                loan_id = loan.id,
                username = %username,
                "loan stored but not added to the user's index: {}",
                e
            );
            return Err(e);
        }

        tracing::info!(loan_id = loan.id, book_id, username = %username, "loan requested");
        Ok(loan)
    }

    /// Approve a pending loan, taking one copy of its book
    pub async fn approve(&self, loan_id: i64) -> AppResult<Loan> {
        let loan = self.repository.loans.get_by_id(loan_id).await?;
        if loan.approved {
            return Err(AppError::AlreadyApproved(loan_id));
        }

        // Counter first: a full book must never leave the loan marked approved
        self.inventory.apply_delta(loan.book_id, 1).await?;

        let flipped = self
            .repository
            .loans
            .update(loan_id, |loan| {
                if loan.approved {
                    return Err(AppError::AlreadyApproved(loan_id));
                }
                loan.approved = true;
                Ok(true)
            })
            .await;

        match flipped {
            Ok(Some(loan)) => {
                tracing::info!(loan_id, book_id = loan.book_id, "loan approved");
                Ok(loan)
            }
            Ok(None) => {
                self.give_back_copy(loan.book_id, loan_id).await;
                Err(AppError::NotFound(format!("Loan with id {} not found", loan_id)))
            }
            Err(e) => {
                self.give_back_copy(loan.book_id, loan_id).await;
                Err(e)
            }
        }
    }

    /// Undo the increment of an approval that did not go through
    async fn give_back_copy(&self, book_id: i64, loan_id: i64) {
        match self.inventory.apply_delta(book_id, -1).await {
            Ok(_) => tracing::warn!(loan_id, book_id, "approval lost a race, copy given back"),
            Err(e) => tracing::error!(
                loan_id,
                book_id,
                "approval lost a race and the copy could not be given back: {}",
                e
            ),
        }
    }

    /// Decline a pending loan and delete it
    pub async fn decline(&self, loan_id: i64) -> AppResult<()> {
        let loan = self
            .repository
            .loans
            .fetch(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;
        if loan.value.approved {
            return Err(AppError::AlreadyApproved(loan_id));
        }

        self.index.remove(&loan.value.username, loan_id).await?;

        if self.repository.loans.delete_if_unchanged(&loan).await? {
            tracing::info!(loan_id, username = %loan.value.username, "loan declined");
            return Ok(());
        }

        // The record moved on after it was read
        match self.repository.loans.find(loan_id).await? {
            Some(current) => {
                self.index.add(&current.username, loan_id).await?;
                if current.approved {
                    Err(AppError::AlreadyApproved(loan_id))
                } else {
                    Err(AppError::Conflict(format!(
                        "Loan {} changed while being declined",
                        loan_id
                    )))
                }
            }
            None => Err(AppError::NotFound(format!("Loan with id {} not found", loan_id))),
        }
    }

    /// Confirm the return of an approved loan, freeing its copy.
    ///
    /// Steps run index, record, counter. Deleting the record with a
    /// compare-and-delete decides which caller returned the loan, so only
    /// that caller releases the copy. A failure at the counter step leaves
    /// the copy counted as on loan; nothing is rolled back.
    pub async fn return_loan(&self, loan_id: i64) -> AppResult<()> {
        let loan = self
            .repository
            .loans
            .fetch(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;
        if !loan.value.approved {
            return Err(AppError::NotYetApproved(loan_id));
        }

        self.index.remove(&loan.value.username, loan_id).await?;

        if !self.repository.loans.delete_if_unchanged(&loan).await? {
            // Returned by someone else, and the id may already be reused
            if let Some(current) = self.repository.loans.find(loan_id).await? {
                self.index.add(&current.username, loan_id).await?;
            }
            return Err(AppError::NotFound(format!("Loan with id {} not found", loan_id)));
        }

        let book_id = loan.value.book_id;
        if let Err(e) = self.inventory.apply_delta(book_id, -1).await {
            tracing::warn!(loan_id, book_id, "loan deleted but counter not released: {}", e);
            return Err(e);
        }

        tracing::info!(loan_id, book_id, username = %loan.value.username, "loan returned");
        Ok(())
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, loan_id: i64) -> AppResult<Loan> {
        self.repository.loans.get_by_id(loan_id).await
    }

    /// Get a loan only if it sits in the user's index
    pub async fn get_for_user(&self, username: &str, loan_id: i64) -> AppResult<Loan> {
        let ids = self.index.loan_ids(username).await?;
        if !ids.contains(&loan_id) {
            return Err(AppError::NotFound(format!(
                "You have no loan with id {}",
                loan_id
            )));
        }
        self.repository.loans.get_by_id(loan_id).await
    }

    pub async fn get_all_for_user(&self, username: &str) -> AppResult<Vec<Loan>> {
        self.list_for_user(username, LoanFilter::All).await
    }

    pub async fn get_pending_for_user(&self, username: &str) -> AppResult<Vec<Loan>> {
        self.list_for_user(username, LoanFilter::Pending).await
    }

    pub async fn get_active_for_user(&self, username: &str) -> AppResult<Vec<Loan>> {
        self.list_for_user(username, LoanFilter::Active).await
    }

    pub async fn get_all(&self) -> AppResult<Vec<Loan>> {
        self.list(LoanFilter::All).await
    }

    pub async fn get_all_pending(&self) -> AppResult<Vec<Loan>> {
        self.list(LoanFilter::Pending).await
    }

    pub async fn get_all_active(&self) -> AppResult<Vec<Loan>> {
        self.list(LoanFilter::Active).await
    }

    async fn list_for_user(&self, username: &str, filter: LoanFilter) -> AppResult<Vec<Loan>> {
        let ids = self.index.loan_ids(username).await?;
        let mut loans = self.repository.loans.get_many(&ids).await?;
        loans.retain(|loan| filter.matches(loan));
        loans.sort_by_key(|loan| loan.id);
        Ok(loans)
    }

    async fn list(&self, filter: LoanFilter) -> AppResult<Vec<Loan>> {
        let mut loans = self.repository.loans.list().await?;
        loans.retain(|loan| filter.matches(loan));
        Ok(loans)
    }
}
