//! Book model: only the inventory counters are interpreted here

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key prefix of book records
pub const BOOK_PREFIX: &str = "book_";

/// A book record as stored by book management.
///
/// Only the counters are owned by the loan engine. Every other field is
/// kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: i64,
    /// Capacity: how many copies the library holds
    #[serde(alias = "TotalCount", default)]
    pub total_count: i64,
    /// Copies currently lent out, always within `0..=total_count`
    #[serde(alias = "OnLoanCount", default)]
    pub on_loan_count: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Book {
    pub fn new(book_id: i64, total_count: i64) -> Self {
        Self {
            book_id,
            total_count,
            on_loan_count: 0,
            extra: Map::new(),
        }
    }

    pub fn key(&self) -> String {
        book_key(self.book_id)
    }

    /// Whether `on_loan_count + delta` stays within capacity
    pub fn accepts_delta(&self, delta: i64) -> bool {
        match self.on_loan_count.checked_add(delta) {
            Some(next) => (0..=self.total_count).contains(&next),
            None => false,
        }
    }
}

pub fn book_key(id: i64) -> String {
    format!("{}{}", BOOK_PREFIX, id)
}
