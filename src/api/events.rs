//! Server-sent event streams bridged from the change propagator
//!
//! Each connection gets its own subscription. When the client disconnects
//! the receiver is dropped and the propagator prunes the subscriber on its
//! next publish; deltas are advisory and clients re-fetch canonical records.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use tokio_stream::{wrappers::UnboundedReceiverStream, Stream, StreamExt};
use uuid::Uuid;

use crate::{
    error::AppResult,
    services::events::{ChangeEvent, Topic},
};

use super::Identity;

fn sse_event(change: &ChangeEvent) -> Event {
    match serde_json::to_string(change) {
        Ok(payload) => Event::default().event("change").data(payload),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize change event");
            Event::default().comment("serialization failure")
        }
    }
}

fn sse_stream(
    rx: tokio::sync::mpsc::UnboundedReceiver<ChangeEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = UnboundedReceiverStream::new(rx).map(|change| Ok(sse_event(&change)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Stream availability changes for one book
#[utoipa::path(
    get,
    path = "/events/books/{id}",
    tag = "events",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "SSE stream of availability deltas", content_type = "text/event-stream")
    )
)]
pub async fn book_availability_events(
    State(state): State<crate::AppState>,
    Identity(_claims): Identity,
    Path(book_id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (_handle, rx) = state
        .services
        .events
        .subscribe(Topic::BookAvailability(book_id))
        .await;
    Ok(sse_stream(rx))
}

/// Stream status changes for one checkout
#[utoipa::path(
    get,
    path = "/events/checkouts/{id}",
    tag = "events",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "Checkout ID")
    ),
    responses(
        (status = 200, description = "SSE stream of checkout status deltas", content_type = "text/event-stream"),
        (status = 404, description = "Checkout not found")
    )
)]
pub async fn checkout_events(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Path(checkout_id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let checkout = state.services.circulation.get_checkout(checkout_id).await?;
    claims.require_self_or_staff(checkout.user_id)?;

    let (_handle, rx) = state
        .services
        .events
        .subscribe(Topic::Checkout(checkout_id))
        .await;
    Ok(sse_stream(rx))
}

/// Stream status changes for all of a user's checkouts
#[utoipa::path(
    get,
    path = "/events/users/{id}/checkouts",
    tag = "events",
    security(("identity_headers" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "SSE stream of the user's checkout deltas", content_type = "text/event-stream")
    )
)]
pub async fn user_checkout_events(
    State(state): State<crate::AppState>,
    Identity(claims): Identity,
    Path(user_id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    claims.require_self_or_staff(user_id)?;

    let (_handle, rx) = state
        .services
        .events
        .subscribe(Topic::UserCheckouts(user_id))
        .await;
    Ok(sse_stream(rx))
}
