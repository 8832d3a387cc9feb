//! Loan model and related types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Key prefix of loan records
pub const LOAN_PREFIX: &str = "loan_";

/// A user's claim on one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    #[serde(alias = "ID")]
    pub id: i64,
    #[serde(alias = "BookID")]
    pub book_id: i64,
    /// Lowercase username of the borrower
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Approved", default)]
    pub approved: bool,
}

impl Loan {
    /// A fresh, pending loan request
    pub fn new(id: i64, book_id: i64, username: &str) -> Self {
        Self {
            id,
            book_id,
            username: normalize_username(username),
            approved: false,
        }
    }

    pub fn key(&self) -> String {
        loan_key(self.id)
    }
}

/// Filter applied by the loan listing queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanFilter {
    All,
    Pending,
    Active,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        match self {
            LoanFilter::All => true,
            LoanFilter::Pending => !loan.approved,
            LoanFilter::Active => loan.approved,
        }
    }
}

pub fn loan_key(id: i64) -> String {
    format!("{}{}", LOAN_PREFIX, id)
}

/// Parse the numeric id out of a `loan_<id>` key
pub fn loan_id_from_key(key: &str) -> Option<i64> {
    key.strip_prefix(LOAN_PREFIX)?.parse().ok()
}

pub fn normalize_username(username: &str) -> String {
    username.to_lowercase()
}
