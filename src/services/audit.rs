//! Read-only consistency audit
//!
//! Loans, books and users are written by separate single-key operations,
//! so a failure halfway through a lifecycle step leaves them disagreeing.
//! The audit finds those disagreements; repairing them is left to an
//! operator.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;

use crate::{
    error::AppResult,
    models::audit::{AuditReport, CounterMismatch, IndexEntry},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuditService {
    repository: Repository,
}

impl AuditService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn run(&self) -> AppResult<AuditReport> {
        let loans = self.repository.loans.list().await?;
        let users = self.repository.users.list().await?;
        let books = self.repository.books.list().await?;

        let owners: HashMap<i64, &str> = loans
            .iter()
            .map(|loan| (loan.id, loan.username.as_str()))
            .collect();

        let mut indexed: HashSet<(String, i64)> = HashSet::new();
        let mut dangling_entries = Vec::new();
        let mut duplicated_entries = Vec::new();

        for (username, user) in &users {
            let mut seen = HashSet::new();
            for &loan_id in &user.loan_ids {
                let entry = IndexEntry {
                    username: username.clone(),
                    loan_id,
                };
                if !seen.insert(loan_id) {
                    duplicated_entries.push(entry);
                    continue;
                }
                match owners.get(&loan_id) {
                    Some(owner) if *owner == username.as_str() => {
                        indexed.insert((username.clone(), loan_id));
                    }
                    _ => dangling_entries.push(entry),
                }
            }
        }

        let orphaned_loans: Vec<i64> = loans
            .iter()
            .filter(|loan| !indexed.contains(&(loan.username.clone(), loan.id)))
            .map(|loan| loan.id)
            .collect();

        let mut approved_per_book: BTreeMap<i64, i64> = BTreeMap::new();
        for loan in loans.iter().filter(|loan| loan.approved) {
            *approved_per_book.entry(loan.book_id).or_default() += 1;
        }

        let mut counter_mismatches = Vec::new();
        for book in &books {
            let approved = approved_per_book.remove(&book.book_id).unwrap_or(0);
            let out_of_bounds = book.on_loan_count < 0 || book.on_loan_count > book.total_count;
            if out_of_bounds || book.on_loan_count != approved {
                counter_mismatches.push(CounterMismatch {
                    book_id: book.book_id,
                    total_count: book.total_count,
                    on_loan_count: book.on_loan_count,
                    approved_loans: approved,
                });
            }
        }

        // Whatever is left counts approved loans of books that do not exist
        let missing_books: HashSet<i64> = approved_per_book.into_keys().collect();
        let loans_without_book = loans
            .iter()
            .filter(|loan| loan.approved && missing_books.contains(&loan.book_id))
            .map(|loan| loan.id)
            .collect();

        let report = AuditReport {
            generated_at: Utc::now(),
            loans_scanned: loans.len(),
            users_scanned: users.len(),
            books_scanned: books.len(),
            orphaned_loans,
            dangling_entries,
            duplicated_entries,
            counter_mismatches,
            loans_without_book,
        };

        if report.is_consistent() {
            tracing::info!(loans = report.loans_scanned, "audit found no inconsistency");
        } else {
            tracing::warn!(
                orphaned = report.orphaned_loans.len(),
                dangling = report.dangling_entries.len(),
                duplicated = report.duplicated_entries.len(),
                counters = report.counter_mismatches.len(),
                "audit found inconsistencies"
            );
        }

        Ok(report)
    }
}
