use thiserror::Error;

/// Failure taxonomy shared by the clients, the mapper, and the task runtime.
///
/// Only [`LabelError::is_retryable`] variants are ever retried; everything
/// else terminates the task.
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("Metadata provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Catalog server unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Invalid response: {message}")]
    InvalidResponse {
        message: String,
        /// Truncated raw body kept for diagnosis.
        raw: Option<String>,
    },

    #[error("Invalid keyword input: {0}")]
    InvalidKeyword(#[from] MappingError),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LabelError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LabelError::RateLimited(_)
                | LabelError::ProviderUnavailable(_)
                | LabelError::RemoteUnavailable(_)
        )
    }

    /// Stable, lowercase name used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            LabelError::Validation(_) => "validation",
            LabelError::NotFound(_) => "not_found",
            LabelError::Auth(_) => "auth",
            LabelError::RateLimited(_) => "rate_limited",
            LabelError::ProviderUnavailable(_) => "provider_unavailable",
            LabelError::RemoteUnavailable(_) => "remote_unavailable",
            LabelError::InvalidResponse { .. } => "invalid_response",
            LabelError::InvalidKeyword(_) => "invalid_keyword",
            LabelError::Queue(_) => "queue",
            LabelError::Serialization(_) => "serialization",
        }
    }

    pub fn invalid_response(
        message: impl Into<String>,
        raw: Option<&str>,
    ) -> Self {
        LabelError::InvalidResponse {
            message: message.into(),
            raw: raw.map(truncate_raw),
        }
    }

    /// Truncated upstream body behind a [`LabelError::InvalidResponse`].
    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            LabelError::InvalidResponse { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }
}

impl From<redis::RedisError> for LabelError {
    fn from(err: redis::RedisError) -> Self {
        LabelError::Queue(err.to_string())
    }
}

/// Rejections raised while validating inbound events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing payload")]
    MissingPayload,

    #[error("Empty or invalid payload")]
    EmptyPayload,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid or unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid rating key format: {0:?}")]
    InvalidRatingKey(String),

    #[error("Invalid IMDb ID: {0:?}")]
    InvalidImdbId(String),
}

/// Raised by the label mapper for input it refuses to normalize.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("keyword at position {index} contains control characters")]
    ControlCharacters { index: usize },
}

pub type Result<T> = std::result::Result<T, LabelError>;

const RAW_PAYLOAD_LIMIT: usize = 2_048;

fn truncate_raw(raw: &str) -> String {
    if raw.len() <= RAW_PAYLOAD_LIMIT {
        return raw.to_string();
    }
    let mut cut = RAW_PAYLOAD_LIMIT;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &raw[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(LabelError::RateLimited("429".into()).is_retryable());
        assert!(LabelError::ProviderUnavailable("timeout".into()).is_retryable());
        assert!(LabelError::RemoteUnavailable("503".into()).is_retryable());

        assert!(!LabelError::NotFound("tt9999999".into()).is_retryable());
        assert!(!LabelError::Auth("401".into()).is_retryable());
        assert!(!LabelError::invalid_response("bad", None).is_retryable());
        assert!(
            !LabelError::from(MappingError::ControlCharacters { index: 0 })
                .is_retryable()
        );
    }

    #[test]
    fn invalid_response_truncates_raw_payload() {
        let raw = "x".repeat(RAW_PAYLOAD_LIMIT * 2);
        match LabelError::invalid_response("too big", Some(&raw)) {
            LabelError::InvalidResponse { raw: Some(kept), .. } => {
                assert!(kept.len() < raw.len());
                assert!(kept.ends_with('…'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn raw_payload_is_only_exposed_for_invalid_responses() {
        let err = LabelError::invalid_response(
            "unexpected keyword payload",
            Some("<html>CAPTCHA-PAGE</html>"),
        );
        assert_eq!(err.raw_payload(), Some("<html>CAPTCHA-PAGE</html>"));
        assert!(LabelError::NotFound("tt9999999".into()).raw_payload().is_none());
    }
}
