//! Postgres repository implementations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Book, Checkout},
};

use super::{BookRepository, CheckoutRepository, PatronDirectory};

#[derive(Clone)]
pub struct PgBookRepository {
    pool: Pool<Postgres>,
}

impl PgBookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookRepository for PgBookRepository {
    async fn insert(&self, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, isbn, title, author, total_copies, available_copies, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(book.id)
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn fetch_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE isbn = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with ISBN {} not found", isbn)))
    }

    async fn list(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn decrement_available(&self, id: Uuid) -> AppResult<Option<i32>> {
        let available = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1, updated_at = NOW()
            WHERE id = $1 AND available_copies > 0
            RETURNING available_copies
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(available)
    }

    async fn increment_available(&self, id: Uuid) -> AppResult<Option<i32>> {
        let available = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE books
            SET available_copies = available_copies + 1, updated_at = NOW()
            WHERE id = $1 AND available_copies < total_copies
            RETURNING available_copies
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(available)
    }
}

#[derive(Clone)]
pub struct PgCheckoutRepository {
    pool: Pool<Postgres>,
}

impl PgCheckoutRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckoutRepository for PgCheckoutRepository {
    async fn insert(&self, checkout: &Checkout) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO checkouts (
                id, user_id, book_id, status, checked_out_at, due_date, returned_at,
                renewal_count, max_renewals, overdue_email_sent, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(checkout.id)
        .bind(checkout.user_id)
        .bind(checkout.book_id)
        .bind(checkout.status)
        .bind(checkout.checked_out_at)
        .bind(checkout.due_date)
        .bind(checkout.returned_at)
        .bind(checkout.renewal_count)
        .bind(checkout.max_renewals)
        .bind(checkout.overdue_email_sent)
        .bind(checkout.created_at)
        .bind(checkout.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> AppResult<Checkout> {
        sqlx::query_as::<_, Checkout>("SELECT * FROM checkouts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Checkout with id {} not found", id)))
    }

    async fn update(&self, checkout: &Checkout) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE checkouts
            SET status = $2, due_date = $3, returned_at = $4, renewal_count = $5,
                overdue_email_sent = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(checkout.id)
        .bind(checkout.status)
        .bind(checkout.due_date)
        .bind(checkout.returned_at)
        .bind(checkout.renewal_count)
        .bind(checkout.overdue_email_sent)
        .bind(checkout.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Checkout with id {} not found",
                checkout.id
            )));
        }

        Ok(())
    }

    async fn set_overdue_email_sent(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE checkouts SET overdue_email_sent = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Checkout with id {} not found", id)));
        }

        Ok(())
    }

    async fn find_open_by_user_and_book(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> AppResult<Option<Checkout>> {
        let checkout = sqlx::query_as::<_, Checkout>(
            r#"
            SELECT * FROM checkouts
            WHERE user_id = $1 AND book_id = $2 AND status IN ('ACTIVE', 'OVERDUE')
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(checkout)
    }

    async fn count_open_by_user(&self, user_id: Uuid, include_overdue: bool) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM checkouts
            WHERE user_id = $1
              AND (status = 'ACTIVE' OR ($2 AND status = 'OVERDUE'))
            "#,
        )
        .bind(user_id)
        .bind(include_overdue)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<Checkout>> {
        let checkouts = sqlx::query_as::<_, Checkout>(
            "SELECT * FROM checkouts WHERE user_id = $1 ORDER BY checked_out_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(checkouts)
    }

    async fn list_active_due_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Checkout>> {
        let checkouts = sqlx::query_as::<_, Checkout>(
            "SELECT * FROM checkouts WHERE status = 'ACTIVE' AND due_date < $1 ORDER BY due_date",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(checkouts)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Checkout>> {
        let checkouts = sqlx::query_as::<_, Checkout>(
            r#"
            SELECT * FROM checkouts
            WHERE status = 'OVERDUE' OR (status = 'ACTIVE' AND due_date < $1)
            ORDER BY due_date
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(checkouts)
    }

    async fn list_overdue_unnotified(&self) -> AppResult<Vec<Checkout>> {
        let checkouts = sqlx::query_as::<_, Checkout>(
            "SELECT * FROM checkouts WHERE status = 'OVERDUE' AND overdue_email_sent = FALSE ORDER BY due_date",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(checkouts)
    }
}

#[derive(Clone)]
pub struct PgPatronDirectory {
    pool: Pool<Postgres>,
}

impl PgPatronDirectory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatronDirectory for PgPatronDirectory {
    async fn patron_email(&self, user_id: Uuid) -> AppResult<Option<String>> {
        let email: Option<String> =
            sqlx::query_scalar("SELECT email FROM patrons WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(email)
    }
}
