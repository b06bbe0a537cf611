use std::collections::HashMap;

use axum::{
    Form, Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
};
use tracing::{debug, warn};

use marquee_core::error::ValidationError;
use marquee_core::ingest;

use super::{AcceptedResponse, accepted};
use crate::AppState;
use crate::infra::errors::{AppError, AppResult};

/// Form field Plex uses for the JSON event.
const PAYLOAD_FIELD: &str = "payload";

/// Receives a Plex webhook. The event may arrive as the `payload` field of a
/// multipart or urlencoded form, or as a raw JSON body.
pub async fn plex_webhook(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<(StatusCode, Json<AcceptedResponse>)> {
    let payload = extract_payload(request).await?;
    let event = ingest::parse_webhook(&payload).map_err(|err| {
        warn!(error = %err, "rejected webhook");
        AppError::from(err)
    })?;
    let receipt = state.enqueuer().submit(event).await?;
    Ok(accepted(receipt))
}

async fn extract_payload(request: Request) -> AppResult<Bytes> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?
        {
            if field.name() == Some(PAYLOAD_FIELD) {
                return field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(err.body_text()));
            }
            debug!(field = ?field.name(), "skipping webhook form field");
        }
        Err(ValidationError::MissingPayload.into())
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(mut fields) =
            Form::<HashMap<String, String>>::from_request(request, &())
                .await
                .map_err(|err| AppError::bad_request(err.body_text()))?;
        fields
            .remove(PAYLOAD_FIELD)
            .map(Bytes::from)
            .ok_or_else(|| ValidationError::MissingPayload.into())
    } else {
        Bytes::from_request(request, &())
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))
    }
}
