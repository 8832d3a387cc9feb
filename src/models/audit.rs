//! Consistency audit report

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// A loan id sitting in a user's index that does not belong there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct IndexEntry {
    pub username: String,
    pub loan_id: i64,
}

/// A book whose on-loan counter disagrees with the approved loans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CounterMismatch {
    pub book_id: i64,
    pub total_count: i64,
    pub on_loan_count: i64,
    pub approved_loans: i64,
}

/// Result of a read-only consistency sweep over loans, users and books
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub loans_scanned: usize,
    pub users_scanned: usize,
    pub books_scanned: usize,
    /// Loans present in storage but missing from their owner's index
    pub orphaned_loans: Vec<i64>,
    /// Index entries whose loan is gone or owned by someone else
    pub dangling_entries: Vec<IndexEntry>,
    /// Index entries that appear more than once in the same index
    pub duplicated_entries: Vec<IndexEntry>,
    pub counter_mismatches: Vec<CounterMismatch>,
    /// Approved loans that point at a book record that does not exist
    pub loans_without_book: Vec<i64>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_loans.is_empty()
            && self.dangling_entries.is_empty()
            && self.duplicated_entries.is_empty()
            && self.counter_mismatches.is_empty()
            && self.loans_without_book.is_empty()
    }
}
