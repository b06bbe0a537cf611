use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};

use marquee_core::ingest;

use super::{AcceptedResponse, accepted};
use crate::AppState;
use crate::infra::errors::AppResult;

/// Queues a label refresh for `rating_key` using the IMDb id in the body.
pub async fn manual_update(
    State(state): State<AppState>,
    Path(rating_key): Path<String>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<AcceptedResponse>)> {
    let event = ingest::manual_update(&rating_key, &body)?;
    let receipt = state.enqueuer().submit(event).await?;
    Ok(accepted(receipt))
}
