//! Circulation endpoints: checkout, return, renewal, overdue listing

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{Book, Checkout},
};

use super::Identity;

/// Checkout request: a scanned ISBN plus the borrowing user
#[derive(Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 10, max = 17))]
    pub isbn: String,
    pub user_id: Uuid,
}

/// Return response. `reconciliation_required` means the return itself is
/// committed but the shelf count could not be updated and an operator needs
/// to reconcile the book's inventory.
#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub status: String,
    pub reconciliation_required: bool,
    pub checkout: Checkout,
}

/// Check a book out to a user
#[utoipa::path(
    post,
    path = "/circulation/checkout",
    tag = "circulation",
    security(("identity_headers" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Checkout created", body = Checkout),
        (status = 404, description = "No book with that ISBN"),
        (status = 409, description = "Out of stock, duplicate checkout, or checkout limit reached"),
        (status = 503, description = "Lock wait timed out; retry")
    )
)]
pub async fn checkout_book(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<Checkout>)> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let checkout = state
        .services
        .circulation
        .checkout_book(&request.isbn, request.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(checkout)))
}

/// Return a checked-out book
#[utoipa::path(
    post,
    path = "/circulation/checkouts/{id}/return",
    tag = "circulation",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "Checkout ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 404, description = "Checkout not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Path(checkout_id): Path<Uuid>,
) -> AppResult<Json<ReturnResponse>> {
    claims.require_staff()?;

    let outcome = state.services.circulation.return_book(checkout_id).await?;

    Ok(Json(ReturnResponse {
        status: "returned".to_string(),
        reconciliation_required: outcome.reconciliation_required,
        checkout: outcome.checkout,
    }))
}

/// Renew a checkout
#[utoipa::path(
    post,
    path = "/circulation/checkouts/{id}/renew",
    tag = "circulation",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "Checkout ID")
    ),
    responses(
        (status = 200, description = "Checkout renewed", body = Checkout),
        (status = 404, description = "Checkout not found"),
        (status = 409, description = "Already returned"),
        (status = 422, description = "Renewal limit reached")
    )
)]
pub async fn renew_checkout(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Path(checkout_id): Path<Uuid>,
) -> AppResult<Json<Checkout>> {
    claims.require_staff()?;

    let checkout = state.services.circulation.renew_checkout(checkout_id).await?;
    Ok(Json(checkout))
}

/// Get a checkout by ID
#[utoipa::path(
    get,
    path = "/circulation/checkouts/{id}",
    tag = "circulation",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "Checkout ID")
    ),
    responses(
        (status = 200, description = "Checkout details", body = Checkout),
        (status = 404, description = "Checkout not found")
    )
)]
pub async fn get_checkout(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Path(checkout_id): Path<Uuid>,
) -> AppResult<Json<Checkout>> {
    let checkout = state.services.circulation.get_checkout(checkout_id).await?;
    claims.require_self_or_staff(checkout.user_id)?;
    Ok(Json(checkout))
}

/// Get a user's checkouts
#[utoipa::path(
    get,
    path = "/circulation/users/{id}/checkouts",
    tag = "circulation",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "The user's checkouts", body = Vec<Checkout>)
    )
)]
pub async fn get_user_checkouts(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Checkout>>> {
    claims.require_self_or_staff(user_id)?;

    let checkouts = state.services.circulation.list_user_checkouts(user_id).await?;
    Ok(Json(checkouts))
}

/// List overdue checkouts
#[utoipa::path(
    get,
    path = "/circulation/overdue",
    tag = "circulation",
    security(("identity_headers" = [])),
    responses(
        (status = 200, description = "Overdue checkouts", body = Vec<Checkout>)
    )
)]
pub async fn list_overdue(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
) -> AppResult<Json<Vec<Checkout>>> {
    claims.require_staff()?;

    let overdue = state.services.circulation.list_overdue(Utc::now()).await?;
    Ok(Json(overdue))
}

/// Clear a book's inventory quarantine after manual stock correction
#[utoipa::path(
    post,
    path = "/circulation/books/{id}/reconcile",
    tag = "circulation",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Quarantine cleared", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn reconcile_book(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<Book>> {
    claims.require_admin()?;

    let book = state.services.circulation.reconcile_book(book_id).await?;
    Ok(Json(book))
}
