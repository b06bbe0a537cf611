use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::warn;

use crate::AppState;

/// Healthy only when the queue broker answers and Plex accepts the token.
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<Value>) {
    let (queue_ping, catalog) = tokio::join!(
        state.queue().ping(),
        state.catalog().check_connectivity()
    );

    let queue = match queue_ping {
        Ok(()) => match state.queue().depth().await {
            Ok(depth) => json!({
                "status": "healthy",
                "ready": depth.ready,
                "delayed": depth.delayed,
                "leased": depth.leased,
                "dead": depth.dead,
            }),
            Err(_) => json!({ "status": "healthy" }),
        },
        Err(err) => json!({ "status": "unhealthy", "reason": err.to_string() }),
    };
    let queue_healthy = queue["status"] == "healthy";

    let healthy = queue_healthy && catalog.is_healthy();
    if !healthy {
        warn!(queue = %queue, catalog = ?catalog, "health check failed");
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "queue": queue,
            "catalog": catalog,
        }
    });
    (status, Json(body))
}
