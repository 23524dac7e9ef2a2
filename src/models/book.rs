//! Book model: the inventory-relevant slice of a catalog record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A title with its copy counts. `available_copies` is mutated only by the
/// inventory ledger; `0 <= available_copies <= total_copies` holds at every
/// committed state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// New title entering the catalog; every copy starts on the shelf.
    pub fn register(isbn: String, title: String, author: String, total_copies: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            isbn,
            title,
            author,
            total_copies,
            available_copies: total_copies,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Availability delta published after every committed ledger mutation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookAvailability {
    pub book_id: Uuid,
    pub available_copies: i32,
}
