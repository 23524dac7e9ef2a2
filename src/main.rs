//! Libris Server - Library Circulation Engine
//!
//! REST API server around the checkout/inventory consistency engine.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_server::{
    api,
    config::AppConfig,
    repository::Repository,
    services::{
        email::{EmailService, SmtpOverdueNotifier},
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=debug", config.logging.level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Save server address before moving config
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    // Create repository and services
    let repository = Repository::postgres(pool);
    let notifier = Arc::new(SmtpOverdueNotifier::new(
        EmailService::new(config.email.clone()),
        repository.patrons.clone(),
        repository.books.clone(),
    ));
    let services = Arc::new(Services::new(repository, notifier, &config));

    // Bring the background machinery up before accepting requests
    services.events.start();
    services.sweeper.start().await;

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: services.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(
        server_host.parse().expect("Invalid host address"),
        server_port,
    );

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Tear the background machinery down in reverse order
    services.sweeper.stop().await;
    services.events.stop().await;

    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Books (catalog)
        .route("/books", get(api::books::list_books))
        .route("/books", post(api::books::register_book))
        .route("/books/:id", get(api::books::get_book))
        // Circulation
        .route("/circulation/checkout", post(api::circulation::checkout_book))
        .route("/circulation/checkouts/:id", get(api::circulation::get_checkout))
        .route("/circulation/checkouts/:id/return", post(api::circulation::return_book))
        .route("/circulation/checkouts/:id/renew", post(api::circulation::renew_checkout))
        .route("/circulation/users/:id/checkouts", get(api::circulation::get_user_checkouts))
        .route("/circulation/overdue", get(api::circulation::list_overdue))
        .route("/circulation/books/:id/reconcile", post(api::circulation::reconcile_book))
        // Realtime change streams
        .route("/events/books/:id", get(api::events::book_availability_events))
        .route("/events/checkouts/:id", get(api::events::checkout_events))
        .route("/events/users/:id/checkouts", get(api::events::user_checkout_events))
        .with_state(state.clone());

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
