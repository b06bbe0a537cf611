pub mod health;
pub mod labels;
pub mod webhook;

use axum::{Json, http::StatusCode};
use marquee_core::ingest::TaskReceipt;
use serde::Serialize;

/// `202 Accepted` body returned once a task is queued.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub receipt: TaskReceipt,
}

pub(crate) fn accepted(receipt: TaskReceipt) -> (StatusCode, Json<AcceptedResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "processing",
            receipt,
        }),
    )
}
