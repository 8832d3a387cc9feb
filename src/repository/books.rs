//! Books repository: counter access for the loan engine

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::book::{book_key, Book, BOOK_PREFIX},
};

use super::{fetch, kv::KeyValueStore, update_record, RetryPolicy};

#[derive(Clone)]
pub struct BooksRepository {
    store: Arc<dyn KeyValueStore>,
    policy: RetryPolicy,
}

impl BooksRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Book> {
        fetch::<Book>(self.store.as_ref(), &book_key(id))
            .await?
            .map(|v| v.value)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Write a whole book record, as book management does
    pub async fn save(&self, book: &Book) -> AppResult<()> {
        let bytes = serde_json::to_vec(book)?;
        self.store.set(&book.key(), &bytes).await?;
        Ok(())
    }

    pub async fn update<F>(&self, id: i64, apply: F) -> AppResult<Option<Book>>
    where
        F: FnMut(&mut Book) -> AppResult<bool>,
    {
        update_record(self.store.as_ref(), self.policy, &book_key(id), apply).await
    }

    /// Every book record in the store
    pub async fn list(&self) -> AppResult<Vec<Book>> {
        let mut books = Vec::new();
        for key in self.store.scan_prefix(BOOK_PREFIX).await? {
            if let Some(book) = fetch::<Book>(self.store.as_ref(), &key).await? {
                books.push(book.value);
            }
        }
        books.sort_by_key(|b| b.book_id);
        Ok(books)
    }
}
