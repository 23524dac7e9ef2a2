//! Catalog service: ISBN resolution and the minimal registration surface
//! needed to seed inventory

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Book,
    repository::BookRepository,
};

#[derive(Clone)]
pub struct CatalogService {
    books: Arc<dyn BookRepository>,
}

impl CatalogService {
    pub fn new(books: Arc<dyn BookRepository>) -> Self {
        Self { books }
    }

    /// Register a new title; every copy starts available.
    pub async fn register_book(
        &self,
        isbn: String,
        title: String,
        author: String,
        total_copies: i32,
    ) -> AppResult<Book> {
        if total_copies < 0 {
            return Err(AppError::Validation(
                "total_copies must be non-negative".to_string(),
            ));
        }

        let book = Book::register(isbn, title, author, total_copies);
        self.books.insert(&book).await?;

        tracing::info!(book_id = %book.id, isbn = %book.isbn, "book registered");

        Ok(book)
    }

    pub async fn resolve_isbn(&self, isbn: &str) -> AppResult<Book> {
        self.books.fetch_by_isbn(isbn).await
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.books.fetch(id).await
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.books.list().await
    }
}
