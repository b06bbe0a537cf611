use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers::{health, labels, webhook};

/// Plex attaches a poster thumbnail to multipart webhooks.
const WEBHOOK_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Builds the application router.
pub fn create_app(state: AppState) -> Router {
    let ingest = Router::new()
        .route("/plex-webhook", post(webhook::plex_webhook))
        .route("/api/plex-webhook", post(webhook::plex_webhook))
        .route("/set-labels/{rating_key}", post(labels::manual_update))
        .route("/api/update-labels/{rating_key}", post(labels::manual_update))
        .layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT));

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/health", get(health::health_handler))
        .merge(ingest)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
