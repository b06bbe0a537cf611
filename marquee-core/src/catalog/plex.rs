use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{CatalogClient, CatalogEntry, ConnectivityStatus};
use crate::error::{LabelError, Result};
use crate::http::{DEFAULT_HTTP_TIMEOUT, Upstream, build_client, parse_base_url};
use crate::labels::LabelSet;
use crate::types::{ImdbId, RatingKey};

pub const PLEX_TOKEN_HEADER: &str = "X-Plex-Token";
/// Plex metadata type for movies.
const MOVIE_TYPE: &str = "1";

#[derive(Clone)]
pub struct PlexConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl fmt::Debug for PlexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlexConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PlexConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

pub struct PlexCatalogClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for PlexCatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlexCatalogClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PlexCatalogClient {
    pub fn new(config: PlexConfig) -> Result<Self> {
        Ok(Self {
            http: build_client(
                config.timeout,
                concat!("marquee/", env!("CARGO_PKG_VERSION")),
            )?,
            base_url: parse_base_url(&config.base_url)?,
            token: config.token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|err| {
            LabelError::invalid_response(
                format!("cannot build Plex url for {path}: {err}"),
                None,
            )
        })
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(PLEX_TOKEN_HEADER, &self.token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Sends the request and maps non-success statuses. Returns the body.
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        rating_key: &RatingKey,
    ) -> Result<String> {
        let response = builder
            .send()
            .await
            .map_err(|err| Upstream::Catalog.transport_error(err))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| Upstream::Catalog.transport_error(err))?;

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(LabelError::Auth(format!(
                "Plex rejected token ({}) for rating key {rating_key}",
                status.as_u16()
            )));
        }
        if let Some(err) = Upstream::Catalog.status_error(
            status,
            &format!("rating key {rating_key}"),
            &body,
        ) {
            return Err(err);
        }
        Ok(body)
    }
}

#[async_trait]
impl CatalogClient for PlexCatalogClient {
    #[instrument(skip_all, fields(rating_key = %rating_key))]
    async fn get_entry(&self, rating_key: &RatingKey) -> Result<CatalogEntry> {
        let url = self.endpoint(&format!("library/metadata/{rating_key}"))?;
        let builder = self
            .request(reqwest::Method::GET, url)
            .query(&[("includeGuids", "1")]);
        let body = self.send(builder, rating_key).await?;
        parse_metadata(rating_key, &body)
    }

    #[instrument(skip_all, fields(rating_key = %rating_key, labels = labels.len()))]
    async fn apply_labels(
        &self,
        rating_key: &RatingKey,
        labels: &LabelSet,
    ) -> Result<()> {
        let url = self.endpoint(&format!("library/metadata/{rating_key}"))?;
        let builder = self
            .request(reqwest::Method::PUT, url)
            .query(&label_params(rating_key, labels));
        self.send(builder, rating_key).await?;
        info!("applied labels");
        Ok(())
    }

    async fn check_connectivity(&self) -> ConnectivityStatus {
        let url = match self.endpoint("library/sections") {
            Ok(url) => url,
            Err(err) => {
                return ConnectivityStatus::Unhealthy {
                    reason: err.to_string(),
                };
            }
        };

        match self.request(reqwest::Method::GET, url).send().await {
            Ok(response) => match response.status() {
                status if status.is_success() => ConnectivityStatus::Healthy,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ConnectivityStatus::Unhealthy {
                        reason: "invalid Plex token".into(),
                    }
                }
                StatusCode::NOT_FOUND => ConnectivityStatus::Unhealthy {
                    reason: "Plex server not found at configured url".into(),
                },
                status => ConnectivityStatus::Unhealthy {
                    reason: format!("Plex returned status {}", status.as_u16()),
                },
            },
            Err(err) if err.is_timeout() => {
                warn!("Plex connectivity check timed out");
                ConnectivityStatus::Unhealthy {
                    reason: "connection to Plex timed out".into(),
                }
            }
            Err(err) => ConnectivityStatus::Unhealthy {
                reason: format!("cannot reach Plex: {err}"),
            },
        }
    }
}

/// Query parameters for a full replace of the label field.
pub fn label_params(
    rating_key: &RatingKey,
    labels: &LabelSet,
) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(labels.len() + 3);
    params.push(("type".to_string(), MOVIE_TYPE.to_string()));
    params.push(("id".to_string(), rating_key.to_string()));
    for (i, label) in labels.iter().enumerate() {
        params.push((format!("label[{i}].tag.tag"), label.to_string()));
    }
    params.push(("label.locked".to_string(), "1".to_string()));
    params
}

#[derive(Deserialize)]
struct MetadataResponse {
    #[serde(rename = "MediaContainer")]
    container: MediaContainer,
}

#[derive(Deserialize)]
struct MediaContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexMetadata>,
}

#[derive(Deserialize)]
struct PlexMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: Option<i32>,
    /// Legacy agent guid, e.g. `com.plexapp.agents.imdb://tt0111161?lang=en`.
    #[serde(default)]
    guid: Option<String>,
    #[serde(rename = "Guid", default)]
    guids: Vec<PlexGuid>,
    #[serde(rename = "Label", default)]
    labels: Vec<PlexLabel>,
}

#[derive(Deserialize)]
struct PlexGuid {
    id: String,
}

#[derive(Deserialize)]
struct PlexLabel {
    tag: String,
}

fn parse_metadata(rating_key: &RatingKey, body: &str) -> Result<CatalogEntry> {
    let response: MetadataResponse = serde_json::from_str(body).map_err(|err| {
        LabelError::invalid_response(
            format!("malformed Plex metadata for {rating_key}: {err}"),
            Some(body),
        )
    })?;

    let Some(metadata) = response.container.metadata.into_iter().next() else {
        return Err(LabelError::NotFound(format!("rating key {rating_key}")));
    };

    let imdb_id = metadata
        .guids
        .iter()
        .find_map(|guid| ImdbId::from_guid(&guid.id))
        .or_else(|| metadata.guid.as_deref().and_then(legacy_imdb_guid));

    debug!(title = %metadata.title, imdb_id = ?imdb_id, "loaded catalog entry");
    Ok(CatalogEntry {
        rating_key: rating_key.clone(),
        title: metadata.title,
        year: metadata.year,
        labels: metadata.labels.into_iter().map(|label| label.tag).collect(),
        imdb_id,
    })
}

fn legacy_imdb_guid(guid: &str) -> Option<ImdbId> {
    let (_, rest) = guid.split_once("imdb://")?;
    let id = rest.split(['?', '/']).next()?;
    ImdbId::parse(id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelMapper;

    fn key(raw: &str) -> RatingKey {
        RatingKey::parse(raw).unwrap()
    }

    #[test]
    fn label_params_replace_whole_field() {
        let labels = LabelMapper::default().map(&["prison", "escape"]).unwrap();
        let params = label_params(&key("123"), &labels);
        assert_eq!(
            params,
            vec![
                ("type".to_string(), "1".to_string()),
                ("id".to_string(), "123".to_string()),
                ("label[0].tag.tag".to_string(), "prison".to_string()),
                ("label[1].tag.tag".to_string(), "escape".to_string()),
                ("label.locked".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn parses_metadata_with_modern_guids() {
        let body = r#"{"MediaContainer":{"size":1,"Metadata":[{
            "ratingKey":"123","type":"movie","title":"The Shawshank Redemption","year":1994,
            "Guid":[{"id":"tmdb://278"},{"id":"imdb://tt0111161"}],
            "Label":[{"tag":"prison"}]
        }]}}"#;
        let entry = parse_metadata(&key("123"), body).unwrap();
        assert_eq!(entry.title, "The Shawshank Redemption");
        assert_eq!(entry.year, Some(1994));
        assert_eq!(entry.labels, vec!["prison"]);
        assert_eq!(entry.imdb_id.unwrap().as_str(), "tt0111161");
    }

    #[test]
    fn falls_back_to_legacy_agent_guid() {
        let body = r#"{"MediaContainer":{"Metadata":[{
            "title":"Old Agent","guid":"com.plexapp.agents.imdb://tt0068646?lang=en"
        }]}}"#;
        let entry = parse_metadata(&key("5"), body).unwrap();
        assert_eq!(entry.imdb_id.unwrap().as_str(), "tt0068646");
    }

    #[test]
    fn empty_container_is_not_found() {
        let body = r#"{"MediaContainer":{"size":0}}"#;
        assert!(matches!(
            parse_metadata(&key("9"), body),
            Err(LabelError::NotFound(_))
        ));
    }

    #[test]
    fn malformed_body_is_invalid_response() {
        assert!(matches!(
            parse_metadata(&key("9"), "<html>"),
            Err(LabelError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let config = PlexConfig::new("http://nas:32400", "secret-token");
        assert!(!format!("{config:?}").contains("secret-token"));
    }
}
