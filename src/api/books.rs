//! Catalog endpoints: book registration and availability reads

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::Book,
};

use super::Identity;

/// Book registration request
#[derive(Deserialize, Validate, ToSchema)]
pub struct RegisterBookRequest {
    /// ISBN-10 or ISBN-13
    #[validate(length(min = 10, max = 17))]
    pub isbn: String,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub author: String,
    /// Number of physical copies entering the collection
    #[validate(range(min = 0))]
    pub total_copies: i32,
}

/// List all books with their current availability
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("identity_headers" = [])),
    responses(
        (status = 200, description = "Book list", body = Vec<Book>)
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    Identity(_claims): Identity,
) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.catalog.list_books().await?;
    Ok(Json(books))
}

/// Get a book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Identity(_claims): Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Register a new book
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("identity_headers" = [])),
    request_body = RegisterBookRequest,
    responses(
        (status = 201, description = "Book registered", body = Book),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn register_book(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Json(request): Json<RegisterBookRequest>,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let book = state
        .services
        .catalog
        .register_book(request.isbn, request.title, request.author, request.total_copies)
        .await?;

    Ok((StatusCode::CREATED, Json(book)))
}
