//! In-memory repository backend
//!
//! Mirrors the Postgres backend's semantics, including the conditional
//! copy-count updates. Used by the engine test suites and kept shareable
//! through a single store instance.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Book, Checkout, CheckoutStatus},
};

use super::{BookRepository, CheckoutRepository, PatronDirectory};

#[derive(Default)]
pub struct InMemoryStore {
    books: RwLock<HashMap<Uuid, Book>>,
    checkouts: RwLock<HashMap<Uuid, Checkout>>,
    patrons: RwLock<HashMap<Uuid, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a patron's email address (test setup helper).
    pub async fn register_patron(&self, user_id: Uuid, email: &str) {
        self.patrons.write().await.insert(user_id, email.to_string());
    }
}

#[async_trait]
impl BookRepository for InMemoryStore {
    async fn insert(&self, book: &Book) -> AppResult<()> {
        self.books.write().await.insert(book.id, book.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> AppResult<Book> {
        self.books
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn fetch_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        let books = self.books.read().await;
        let mut matches: Vec<&Book> = books.values().filter(|b| b.isbn == isbn).collect();
        matches.sort_by_key(|b| b.created_at);
        matches
            .first()
            .map(|b| (*b).clone())
            .ok_or_else(|| AppError::NotFound(format!("Book with ISBN {} not found", isbn)))
    }

    async fn list(&self) -> AppResult<Vec<Book>> {
        let mut books: Vec<Book> = self.books.read().await.values().cloned().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books)
    }

    async fn decrement_available(&self, id: Uuid) -> AppResult<Option<i32>> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        if book.available_copies <= 0 {
            return Ok(None);
        }
        book.available_copies -= 1;
        book.updated_at = Utc::now();
        Ok(Some(book.available_copies))
    }

    async fn increment_available(&self, id: Uuid) -> AppResult<Option<i32>> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        if book.available_copies >= book.total_copies {
            return Ok(None);
        }
        book.available_copies += 1;
        book.updated_at = Utc::now();
        Ok(Some(book.available_copies))
    }
}

#[async_trait]
impl CheckoutRepository for InMemoryStore {
    async fn insert(&self, checkout: &Checkout) -> AppResult<()> {
        self.checkouts.write().await.insert(checkout.id, checkout.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> AppResult<Checkout> {
        self.checkouts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Checkout with id {} not found", id)))
    }

    async fn update(&self, checkout: &Checkout) -> AppResult<()> {
        let mut checkouts = self.checkouts.write().await;
        match checkouts.get_mut(&checkout.id) {
            Some(existing) => {
                *existing = checkout.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Checkout with id {} not found",
                checkout.id
            ))),
        }
    }

    async fn set_overdue_email_sent(&self, id: Uuid) -> AppResult<()> {
        let mut checkouts = self.checkouts.write().await;
        let checkout = checkouts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Checkout with id {} not found", id)))?;
        checkout.overdue_email_sent = true;
        checkout.updated_at = Utc::now();
        Ok(())
    }

    async fn find_open_by_user_and_book(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> AppResult<Option<Checkout>> {
        let checkouts = self.checkouts.read().await;
        Ok(checkouts
            .values()
            .find(|c| c.user_id == user_id && c.book_id == book_id && c.is_open())
            .cloned())
    }

    async fn count_open_by_user(&self, user_id: Uuid, include_overdue: bool) -> AppResult<i64> {
        let checkouts = self.checkouts.read().await;
        let count = checkouts
            .values()
            .filter(|c| c.user_id == user_id)
            .filter(|c| match c.status {
                CheckoutStatus::Active => true,
                CheckoutStatus::Overdue => include_overdue,
                CheckoutStatus::Returned => false,
            })
            .count();
        Ok(count as i64)
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<Checkout>> {
        let checkouts = self.checkouts.read().await;
        let mut result: Vec<Checkout> = checkouts
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.checked_out_at.cmp(&a.checked_out_at));
        Ok(result)
    }

    async fn list_active_due_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Checkout>> {
        let checkouts = self.checkouts.read().await;
        let mut result: Vec<Checkout> = checkouts
            .values()
            .filter(|c| c.status == CheckoutStatus::Active && c.due_date < cutoff)
            .cloned()
            .collect();
        result.sort_by_key(|c| c.due_date);
        Ok(result)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Checkout>> {
        let checkouts = self.checkouts.read().await;
        let mut result: Vec<Checkout> = checkouts
            .values()
            .filter(|c| {
                c.status == CheckoutStatus::Overdue
                    || (c.status == CheckoutStatus::Active && c.due_date < now)
            })
            .cloned()
            .collect();
        result.sort_by_key(|c| c.due_date);
        Ok(result)
    }

    async fn list_overdue_unnotified(&self) -> AppResult<Vec<Checkout>> {
        let checkouts = self.checkouts.read().await;
        let mut result: Vec<Checkout> = checkouts
            .values()
            .filter(|c| c.status == CheckoutStatus::Overdue && !c.overdue_email_sent)
            .cloned()
            .collect();
        result.sort_by_key(|c| c.due_date);
        Ok(result)
    }
}

#[async_trait]
impl PatronDirectory for InMemoryStore {
    async fn patron_email(&self, user_id: Uuid) -> AppResult<Option<String>> {
        Ok(self.patrons.read().await.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conditional_copy_updates_respect_the_bounds() {
        let store = InMemoryStore::new();
        let book = Book::register("9780140187397".into(), "Title".into(), "Author".into(), 1);
        BookRepository::insert(&store, &book).await.unwrap();

        assert_eq!(store.decrement_available(book.id).await.unwrap(), Some(0));
        assert_eq!(store.decrement_available(book.id).await.unwrap(), None);

        assert_eq!(store.increment_available(book.id).await.unwrap(), Some(1));
        assert_eq!(store.increment_available(book.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn patron_lookup_misses_return_none() {
        let store = InMemoryStore::new();
        let patron = Uuid::new_v4();

        assert_eq!(store.patron_email(patron).await.unwrap(), None);

        store.register_patron(patron, "reader@example.org").await;
        assert_eq!(
            store.patron_email(patron).await.unwrap(),
            Some("reader@example.org".to_string())
        );
    }
}
