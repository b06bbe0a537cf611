use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{ImdbId, RatingKey};
use crate::error::ValidationError;

/// Origin of a label update request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewMovie,
    ManualUpdate,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::NewMovie => write!(f, "new_movie"),
            EventType::ManualUpdate => write!(f, "manual_update"),
        }
    }
}

/// A validated request to refresh labels for one movie.
///
/// Only constructible through [`MovieEvent::new_movie`] and
/// [`MovieEvent::manual_update`], which enforce the per-path field rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MovieEvent {
    rating_key: RatingKey,
    imdb_id: Option<ImdbId>,
    event_type: EventType,
    title: Option<String>,
    year: Option<i32>,
}

impl MovieEvent {
    /// Webhook path: the IMDb id may be resolved later from the catalog.
    pub fn new_movie(rating_key: RatingKey, imdb_id: Option<ImdbId>) -> Self {
        Self {
            rating_key,
            imdb_id,
            event_type: EventType::NewMovie,
            title: None,
            year: None,
        }
    }

    /// Manual path: the caller must name the IMDb id.
    pub fn manual_update(
        rating_key: RatingKey,
        imdb_id: Option<ImdbId>,
    ) -> Result<Self, ValidationError> {
        let imdb_id = imdb_id.ok_or(ValidationError::MissingField("imdb_id"))?;
        Ok(Self {
            rating_key,
            imdb_id: Some(imdb_id),
            event_type: EventType::ManualUpdate,
            title: None,
            year: None,
        })
    }

    pub fn with_title(mut self, title: Option<String>, year: Option<i32>) -> Self {
        self.title = title;
        self.year = year;
        self
    }

    pub fn rating_key(&self) -> &RatingKey {
        &self.rating_key
    }

    pub fn imdb_id(&self) -> Option<&ImdbId> {
        self.imdb_id.as_ref()
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_update_requires_imdb_id() {
        let key = RatingKey::parse("789").unwrap();
        assert_eq!(
            MovieEvent::manual_update(key.clone(), None),
            Err(ValidationError::MissingField("imdb_id"))
        );

        let event = MovieEvent::manual_update(
            key,
            Some(ImdbId::parse("tt1234567").unwrap()),
        )
        .unwrap();
        assert_eq!(event.event_type(), EventType::ManualUpdate);
    }

    #[test]
    fn event_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&EventType::NewMovie).unwrap(),
            "\"new_movie\""
        );
        let parsed: EventType =
            serde_json::from_str("\"manual_update\"").unwrap();
        assert_eq!(parsed, EventType::ManualUpdate);
    }
}
