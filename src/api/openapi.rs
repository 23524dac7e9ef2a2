//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, circulation, events, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "1.0.0",
        description = "Library Circulation Engine REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::register_book,
        // Circulation
        circulation::checkout_book,
        circulation::return_book,
        circulation::renew_checkout,
        circulation::get_checkout,
        circulation::get_user_checkouts,
        circulation::list_overdue,
        circulation::reconcile_book,
        // Events
        events::book_availability_events,
        events::checkout_events,
        events::user_checkout_events,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookAvailability,
            books::RegisterBookRequest,
            // Circulation
            crate::models::checkout::Checkout,
            crate::models::checkout::CheckoutStatus,
            circulation::CheckoutRequest,
            circulation::ReturnResponse,
            // Events
            crate::services::events::ChangeEvent,
            crate::services::events::CheckoutDelta,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Catalog registration and availability"),
        (name = "circulation", description = "Checkout, return, and renewal"),
        (name = "events", description = "Realtime change streams")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
