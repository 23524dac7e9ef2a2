//! Inventory ledger: the single owner of available-copy counts
//!
//! Every mutation goes through the storage layer's conditional updates, so a
//! committed state can never hold `available_copies < 0` or
//! `available_copies > total_copies`. A release that would exceed the total
//! signals a bug elsewhere; the book is quarantined and all further
//! circulation mutations on it are refused until an operator reconciles the
//! stock.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    repository::BookRepository,
};

pub struct InventoryLedger {
    books: Arc<dyn BookRepository>,
    quarantined: RwLock<HashSet<Uuid>>,
}

impl InventoryLedger {
    pub fn new(books: Arc<dyn BookRepository>) -> Self {
        Self {
            books,
            quarantined: RwLock::new(HashSet::new()),
        }
    }

    /// Take one copy. Fails `OutOfStock` when none are on the shelf;
    /// returns the new available count for propagation.
    pub async fn reserve_copy(&self, book_id: Uuid) -> AppResult<i32> {
        match self.books.decrement_available(book_id).await? {
            Some(available) => Ok(available),
            None => Err(AppError::OutOfStock(format!(
                "no available copies of book {}",
                book_id
            ))),
        }
    }

    /// Put one copy back. A release that would push the count above
    /// `total_copies` quarantines the book and fails `InvariantViolation`.
    pub async fn release_copy(&self, book_id: Uuid) -> AppResult<i32> {
        match self.books.increment_available(book_id).await? {
            Some(available) => Ok(available),
            None => {
                self.quarantine(book_id).await;
                Err(AppError::InvariantViolation(format!(
                    "release would push book {} above its total copy count",
                    book_id
                )))
            }
        }
    }

    pub async fn is_quarantined(&self, book_id: Uuid) -> bool {
        self.quarantined.read().await.contains(&book_id)
    }

    pub async fn ensure_unquarantined(&self, book_id: Uuid) -> AppResult<()> {
        if self.is_quarantined(book_id).await {
            return Err(AppError::ReconciliationRequired(format!(
                "book {} is awaiting inventory reconciliation",
                book_id
            )));
        }
        Ok(())
    }

    pub async fn quarantine(&self, book_id: Uuid) {
        if self.quarantined.write().await.insert(book_id) {
            tracing::error!(%book_id, "book quarantined pending inventory reconciliation");
        }
    }

    /// Operator action; returns whether the book was quarantined.
    pub async fn clear_quarantine(&self, book_id: Uuid) -> bool {
        self.quarantined.write().await.remove(&book_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Book;
    use crate::repository::memory::InMemoryStore;

    async fn ledger_with_book(total: i32) -> (InventoryLedger, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let book = Book::register("9780000000001".into(), "Title".into(), "Author".into(), total);
        let book_id = book.id;
        BookRepository::insert(store.as_ref(), &book).await.unwrap();
        (InventoryLedger::new(store), book_id)
    }

    #[tokio::test]
    async fn reserve_runs_down_to_out_of_stock() {
        let (ledger, book_id) = ledger_with_book(2).await;

        assert_eq!(ledger.reserve_copy(book_id).await.unwrap(), 1);
        assert_eq!(ledger.reserve_copy(book_id).await.unwrap(), 0);
        assert!(matches!(
            ledger.reserve_copy(book_id).await,
            Err(AppError::OutOfStock(_))
        ));
    }

    #[tokio::test]
    async fn release_restores_reserved_copies() {
        let (ledger, book_id) = ledger_with_book(2).await;

        ledger.reserve_copy(book_id).await.unwrap();
        assert_eq!(ledger.release_copy(book_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn release_past_total_quarantines_the_book() {
        let (ledger, book_id) = ledger_with_book(1).await;

        let err = ledger.release_copy(book_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
        assert!(ledger.is_quarantined(book_id).await);
        assert!(matches!(
            ledger.ensure_unquarantined(book_id).await,
            Err(AppError::ReconciliationRequired(_))
        ));

        assert!(ledger.clear_quarantine(book_id).await);
        assert!(!ledger.is_quarantined(book_id).await);
        assert!(ledger.ensure_unquarantined(book_id).await.is_ok());
    }

    #[tokio::test]
    async fn reserve_unknown_book_is_not_found() {
        let (ledger, _book_id) = ledger_with_book(1).await;
        assert!(matches!(
            ledger.reserve_copy(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
