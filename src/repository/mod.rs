//! Storage layer: trait contracts plus Postgres and in-memory backends
//!
//! The circulation services only see these traits; the coordinator's
//! per-book lock provides mutual exclusion, so the backends expose plain
//! record operations plus the two conditional copy-count updates the ledger
//! is built on.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, Checkout},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn insert(&self, book: &Book) -> AppResult<()>;
    async fn fetch(&self, id: Uuid) -> AppResult<Book>;
    async fn fetch_by_isbn(&self, isbn: &str) -> AppResult<Book>;
    async fn list(&self) -> AppResult<Vec<Book>>;
    /// Take one copy off the shelf. `Ok(None)` when none are available;
    /// `Ok(Some(n))` is the new available count.
    async fn decrement_available(&self, id: Uuid) -> AppResult<Option<i32>>;
    /// Put one copy back. `Ok(None)` when the count is already at
    /// `total_copies`; `Ok(Some(n))` is the new available count.
    async fn increment_available(&self, id: Uuid) -> AppResult<Option<i32>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckoutRepository: Send + Sync {
    async fn insert(&self, checkout: &Checkout) -> AppResult<()>;
    async fn fetch(&self, id: Uuid) -> AppResult<Checkout>;
    async fn update(&self, checkout: &Checkout) -> AppResult<()>;
    async fn set_overdue_email_sent(&self, id: Uuid) -> AppResult<()>;
    /// The user's open (ACTIVE/OVERDUE) checkout of this book, if any.
    async fn find_open_by_user_and_book(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> AppResult<Option<Checkout>>;
    async fn count_open_by_user(&self, user_id: Uuid, include_overdue: bool) -> AppResult<i64>;
    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<Checkout>>;
    /// ACTIVE checkouts whose due date has passed: the sweeper's work list.
    async fn list_active_due_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Checkout>>;
    /// Overdue snapshot: OVERDUE records plus ACTIVE ones already past due.
    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Checkout>>;
    /// OVERDUE records whose notice has not yet been dispatched.
    async fn list_overdue_unnotified(&self) -> AppResult<Vec<Checkout>>;
}

/// Read-only lookup against the externally managed patron registry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatronDirectory: Send + Sync {
    async fn patron_email(&self, user_id: Uuid) -> AppResult<Option<String>>;
}

/// Container bundling the storage backends behind their trait objects
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookRepository>,
    pub checkouts: Arc<dyn CheckoutRepository>,
    pub patrons: Arc<dyn PatronDirectory>,
}

impl Repository {
    /// Postgres-backed repository over a shared connection pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(postgres::PgBookRepository::new(pool.clone())),
            checkouts: Arc::new(postgres::PgCheckoutRepository::new(pool.clone())),
            patrons: Arc::new(postgres::PgPatronDirectory::new(pool)),
        }
    }

    /// In-memory repository, used by the engine test suites
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::InMemoryStore::new());
        Self {
            books: store.clone(),
            checkouts: store.clone(),
            patrons: store,
        }
    }
}
