use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

static IMDB_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^tt\d{7,10}$").expect("IMDb id pattern is valid")
});

/// Server-assigned identifier of a catalog entry.
///
/// Plex rating keys are opaque but always numeric, so anything else is
/// rejected at the boundary.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RatingKey(String);

impl RatingKey {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ValidationError::InvalidRatingKey(
                raw.as_ref().to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RatingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RatingKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RatingKey> for String {
    fn from(value: RatingKey) -> Self {
        value.0
    }
}

/// IMDb title identifier (`tt` followed by digits).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImdbId(String);

impl ImdbId {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if !IMDB_ID_PATTERN.is_match(trimmed) {
            return Err(ValidationError::InvalidImdbId(
                raw.as_ref().to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Extracts an id from a Plex guid such as `imdb://tt0111161`.
    pub fn from_guid(guid: &str) -> Option<Self> {
        guid.strip_prefix("imdb://")
            .and_then(|raw| Self::parse(raw).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ImdbId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ImdbId> for String {
    fn from(value: ImdbId) -> Self {
        value.0
    }
}

/// Unique identifier for queued label tasks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
