//! Validation of inbound label requests and hand-off to the queue.
//!
//! Nothing is enqueued unless the whole payload validates.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Result, ValidationError};
use crate::orchestration::{LabelTask, QueueService};
use crate::types::{EventType, ImdbId, MovieEvent, RatingKey, TaskId};

/// The only Plex event that triggers a label update.
pub const LIBRARY_NEW_EVENT: &str = "library.new";
const MAX_TEXT_LEN: usize = 1_000;

/// Parses a webhook body, either Plex's native payload or the direct
/// `{"rating_key", "event_type", "imdb_id"}` form.
pub fn parse_webhook(body: &[u8]) -> std::result::Result<MovieEvent, ValidationError> {
    let value = parse_object(body)?;
    if value.get("event").is_some() || value.get("Metadata").is_some() {
        parse_plex(&value)
    } else {
        parse_direct(&value)
    }
}

/// Manual path: the rating key comes from the URL, the IMDb id from the body.
pub fn manual_update(
    rating_key: &str,
    body: &[u8],
) -> std::result::Result<MovieEvent, ValidationError> {
    let rating_key = RatingKey::parse(rating_key)?;
    let imdb_id = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let value = parse_object(body)?;
        optional_imdb_id(value.get("imdb_id"))?
    };
    MovieEvent::manual_update(rating_key, imdb_id)
}

fn parse_object(body: &[u8]) -> std::result::Result<Value, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::EmptyPayload);
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ValidationError::InvalidJson(err.to_string()))?;
    match value {
        Value::Object(ref map) if map.is_empty() => Err(ValidationError::EmptyPayload),
        Value::Object(_) => Ok(value),
        _ => Err(ValidationError::InvalidJson(
            "expected a JSON object".to_string(),
        )),
    }
}

fn parse_plex(value: &Value) -> std::result::Result<MovieEvent, ValidationError> {
    let event = value.get("event").and_then(Value::as_str).unwrap_or_default();
    if event != LIBRARY_NEW_EVENT {
        return Err(ValidationError::UnsupportedEvent(sanitize_text(event)));
    }

    let metadata = value
        .get("Metadata")
        .filter(|m| m.is_object())
        .ok_or(ValidationError::MissingField("Metadata"))?;

    if let Some(kind) = metadata.get("type").and_then(Value::as_str)
        && kind != "movie"
    {
        return Err(ValidationError::UnsupportedMediaType(sanitize_text(kind)));
    }

    let rating_key = required_rating_key(metadata.get("ratingKey"), "ratingKey")?;
    let imdb_id = plex_imdb_id(metadata)?;
    let title = metadata
        .get("title")
        .and_then(Value::as_str)
        .map(sanitize_text)
        .filter(|title| !title.is_empty());
    let year = metadata
        .get("year")
        .and_then(Value::as_i64)
        .and_then(|year| i32::try_from(year).ok());

    Ok(MovieEvent::new_movie(rating_key, imdb_id).with_title(title, year))
}

/// First `imdb://` entry of `Guid`, falling back to a legacy agent `guid`.
fn plex_imdb_id(
    metadata: &Value,
) -> std::result::Result<Option<ImdbId>, ValidationError> {
    let guids = metadata
        .get("Guid")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|guid| guid.get("id").and_then(Value::as_str));

    for guid in guids {
        if let Some(raw) = guid.strip_prefix("imdb://") {
            return ImdbId::parse(raw).map(Some);
        }
    }

    Ok(metadata
        .get("guid")
        .and_then(Value::as_str)
        .and_then(|guid| guid.split_once("imdb://"))
        .and_then(|(_, rest)| rest.split(['?', '/']).next())
        .and_then(|raw| ImdbId::parse(raw).ok()))
}

#[derive(Deserialize)]
struct DirectEvent {
    event_type: Option<String>,
}

fn parse_direct(value: &Value) -> std::result::Result<MovieEvent, ValidationError> {
    let direct: DirectEvent = serde_json::from_value(value.clone())
        .map_err(|err| ValidationError::InvalidJson(err.to_string()))?;
    let rating_key = required_rating_key(value.get("rating_key"), "rating_key")?;
    let imdb_id = optional_imdb_id(value.get("imdb_id"))?;

    match direct.event_type.as_deref() {
        Some("new_movie") => Ok(MovieEvent::new_movie(rating_key, imdb_id)),
        Some("manual_update") => MovieEvent::manual_update(rating_key, imdb_id),
        Some(other) => Err(ValidationError::UnsupportedEvent(sanitize_text(other))),
        None => Err(ValidationError::MissingField("event_type")),
    }
}

fn required_rating_key(
    value: Option<&Value>,
    field: &'static str,
) -> std::result::Result<RatingKey, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::String(raw)) => RatingKey::parse(raw),
        Some(Value::Number(num)) => RatingKey::parse(num.to_string()),
        Some(other) => Err(ValidationError::InvalidRatingKey(other.to_string())),
    }
}

fn optional_imdb_id(
    value: Option<&Value>,
) -> std::result::Result<Option<ImdbId>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => ImdbId::parse(raw).map(Some),
        Some(other) => Err(ValidationError::InvalidImdbId(other.to_string())),
    }
}

/// Strips characters that have no business in a title or event name and
/// caps the length.
pub fn sanitize_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '<' | '>' | '\'' | '"' | ';') && !c.is_control())
        .take(MAX_TEXT_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Acknowledgement returned once a task is durably queued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskReceipt {
    pub task_id: TaskId,
    pub rating_key: RatingKey,
    pub imdb_id: Option<ImdbId>,
    pub event_type: EventType,
    pub title: Option<String>,
    pub year: Option<i32>,
}

/// Turns validated events into queued [`LabelTask`]s.
#[derive(Clone)]
pub struct LabelEnqueuer {
    queue: Arc<dyn QueueService>,
}

impl fmt::Debug for LabelEnqueuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelEnqueuer")
            .field("queue", &std::any::type_name_of_val(self.queue.as_ref()))
            .finish()
    }
}

impl LabelEnqueuer {
    pub fn new(queue: Arc<dyn QueueService>) -> Self {
        Self { queue }
    }

    /// Returns only after the broker accepted the task.
    pub async fn submit(&self, event: MovieEvent) -> Result<TaskReceipt> {
        let task = LabelTask::from_event(&event);
        let receipt = TaskReceipt {
            task_id: task.id,
            rating_key: task.rating_key.clone(),
            imdb_id: task.imdb_id.clone(),
            event_type: task.event_type,
            title: event.title().map(str::to_string),
            year: event.year(),
        };
        self.queue.enqueue(task).await?;
        info!(
            task_id = %receipt.task_id,
            rating_key = %receipt.rating_key,
            imdb_id = ?receipt.imdb_id.as_ref().map(ImdbId::as_str),
            event_type = %receipt.event_type,
            title = ?receipt.title,
            "queued label update"
        );
        Ok(receipt)
    }
}
