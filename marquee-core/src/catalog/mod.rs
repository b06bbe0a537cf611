pub mod plex;

pub use plex::{PlexCatalogClient, PlexConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::labels::LabelSet;
use crate::types::{ImdbId, RatingKey};

/// Read-only view of a movie record on the catalog server. Never cached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub rating_key: RatingKey,
    pub title: String,
    pub year: Option<i32>,
    pub labels: Vec<String>,
    pub imdb_id: Option<ImdbId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectivityStatus {
    Healthy,
    Unhealthy { reason: String },
}

impl ConnectivityStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectivityStatus::Healthy)
    }
}

/// Access to the media catalog that receives the labels.
///
/// `apply_labels` is the only mutating call. It replaces the entry's whole
/// label field with `labels` in one request, so repeating it is harmless.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_entry(&self, rating_key: &RatingKey) -> Result<CatalogEntry>;

    async fn apply_labels(
        &self,
        rating_key: &RatingKey,
        labels: &LabelSet,
    ) -> Result<()>;

    /// Never errors; problems are reported as [`ConnectivityStatus::Unhealthy`].
    async fn check_connectivity(&self) -> ConnectivityStatus;
}
