//! Per-user index of open loan ids

use crate::{
    error::{AppError, AppResult},
    repository::users::UsersRepository,
};

#[derive(Clone)]
pub struct LoanIndex {
    users: UsersRepository,
}

impl LoanIndex {
    pub fn new(users: UsersRepository) -> Self {
        Self { users }
    }

    /// Record `loan_id` as belonging to `username`. Adding an id that is
    /// already there changes nothing.
    pub async fn add(&self, username: &str, loan_id: i64) -> AppResult<()> {
        self.users
            .update(username, |user| {
                if user.holds(loan_id) {
                    return Ok(false);
                }
                user.loan_ids.push(loan_id);
                Ok(true)
            })
            .await?
            .ok_or_else(|| no_such_user(username))?;
        Ok(())
    }

    /// Drop `loan_id` from the user's index. Returns whether it was there;
    /// removing an absent id is not an error, and neither is a user without
    /// a record, whose index holds nothing.
    pub async fn remove(&self, username: &str, loan_id: i64) -> AppResult<bool> {
        let mut removed = false;
        let user = self
            .users
            .update(username, |user| {
                removed = user.drop_loan(loan_id);
                Ok(removed)
            })
            .await?;
        if user.is_none() {
            tracing::debug!(loan_id, username, "no user record, nothing to remove");
        }
        Ok(removed)
    }

    pub async fn loan_ids(&self, username: &str) -> AppResult<Vec<i64>> {
        Ok(self.users.get_by_username(username).await?.loan_ids)
    }
}

fn no_such_user(username: &str) -> AppError {
    AppError::NotFound(format!("User {} not found", username))
}
