pub mod imdb;

pub use imdb::{ImdbKeywordProvider, ImdbProviderConfig};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ImdbId;

/// Source of raw descriptive keywords for a movie.
///
/// Implementations must pass every outbound request through their rate
/// limiter and classify failures so that only transient ones are retryable.
#[async_trait]
pub trait KeywordProvider: Send + Sync {
    async fn fetch_keywords(&self, imdb_id: &ImdbId) -> Result<Vec<String>>;
}
