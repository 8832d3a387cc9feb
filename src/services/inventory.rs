//! Inventory counter: bounded on-loan deltas on a book record

use crate::{
    error::{AppError, AppResult},
    models::Book,
    repository::books::BooksRepository,
};

#[derive(Clone)]
pub struct InventoryCounter {
    books: BooksRepository,
}

impl InventoryCounter {
    pub fn new(books: BooksRepository) -> Self {
        Self { books }
    }

    /// Add `delta` to the book's on-loan count, keeping it within
    /// `0..=total_count`.
    ///
    /// The bound is checked against the exact value being replaced, so
    /// concurrent callers cannot push the count past capacity together.
    pub async fn apply_delta(&self, book_id: i64, delta: i64) -> AppResult<Book> {
        let book = self
            .books
            .update(book_id, |book| {
                if !book.accepts_delta(delta) {
                    return Err(if delta > 0 {
                        AppError::CapacityExceeded(book_id)
                    } else {
                        AppError::InvalidReturn(book_id)
                    });
                }
                book.on_loan_count += delta;
                Ok(delta != 0)
            })
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        tracing::debug!(
            book_id,
            delta,
            on_loan = book.on_loan_count,
            total = book.total_count,
            "inventory counter updated"
        );
        Ok(book)
    }
}
