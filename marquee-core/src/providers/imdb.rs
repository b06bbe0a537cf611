use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::KeywordProvider;
use crate::error::{LabelError, Result};
use crate::http::{
    BROWSER_USER_AGENT, DEFAULT_HTTP_TIMEOUT, Upstream, build_client,
    parse_base_url,
};
use crate::rate_limit::SlidingWindowLimiter;
use crate::types::ImdbId;

pub const IMDB_BASE_URL: &str = "https://www.imdb.com";

#[derive(Clone, Debug)]
pub struct ImdbProviderConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ImdbProviderConfig {
    fn default() -> Self {
        Self {
            base_url: IMDB_BASE_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

/// Scrapes the keyword page of an IMDb title.
///
/// The page embeds its data as JSON inside `<script id="__NEXT_DATA__">`;
/// keywords live under
/// `props.pageProps.contentData.data.title.keywords.edges[].node.keyword.text.text`.
pub struct ImdbKeywordProvider {
    http: reqwest::Client,
    base_url: Url,
    limiter: Arc<SlidingWindowLimiter>,
}

impl fmt::Debug for ImdbKeywordProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImdbKeywordProvider")
            .field("base_url", &self.base_url.as_str())
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl ImdbKeywordProvider {
    pub fn new(
        config: ImdbProviderConfig,
        limiter: Arc<SlidingWindowLimiter>,
    ) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;
        Ok(Self {
            http: build_client(config.timeout, &config.user_agent)?,
            base_url,
            limiter,
        })
    }

    fn keywords_url(&self, imdb_id: &ImdbId) -> Result<Url> {
        self.base_url
            .join(&format!("title/{}/keywords/", imdb_id.as_str()))
            .map_err(|err| {
                LabelError::invalid_response(
                    format!("cannot build keyword url for {imdb_id}: {err}"),
                    None,
                )
            })
    }
}

#[async_trait]
impl KeywordProvider for ImdbKeywordProvider {
    #[instrument(skip_all, fields(imdb_id = %imdb_id))]
    async fn fetch_keywords(&self, imdb_id: &ImdbId) -> Result<Vec<String>> {
        let url = self.keywords_url(imdb_id)?;

        self.limiter.acquire().await;
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|err| Upstream::Provider.transport_error(err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| Upstream::Provider.transport_error(err))?;

        if let Some(err) =
            Upstream::Provider.status_error(status, imdb_id.as_str(), &body)
        {
            warn!(status = status.as_u16(), error = %err, "keyword fetch failed");
            return Err(err);
        }

        let keywords = extract_keywords(&body)?;
        debug!(count = keywords.len(), "fetched keywords");
        Ok(keywords)
    }
}

#[derive(Deserialize)]
struct NextData {
    props: Props,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Props {
    page_props: PageProps,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageProps {
    content_data: ContentData,
}

#[derive(Deserialize)]
struct ContentData {
    data: TitleData,
}

#[derive(Deserialize)]
struct TitleData {
    title: Title,
}

#[derive(Deserialize)]
struct Title {
    #[serde(default)]
    keywords: Option<KeywordConnection>,
}

#[derive(Deserialize)]
struct KeywordConnection {
    #[serde(default)]
    edges: Vec<KeywordEdge>,
}

#[derive(Deserialize)]
struct KeywordEdge {
    node: KeywordNode,
}

#[derive(Deserialize)]
struct KeywordNode {
    keyword: Keyword,
}

#[derive(Deserialize)]
struct Keyword {
    text: KeywordText,
}

#[derive(Deserialize)]
struct KeywordText {
    text: String,
}

/// Pulls keyword strings out of an IMDb keyword page.
///
/// A title without a `keywords` block yields an empty list; a missing script
/// or a payload of a different shape is an invalid response.
pub fn extract_keywords(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__").map_err(|err| {
        LabelError::invalid_response(err.to_string(), None)
    })?;

    let Some(script) = document.select(&selector).next() else {
        return Err(LabelError::invalid_response(
            "keyword page has no __NEXT_DATA__ script",
            Some(html),
        ));
    };

    let json: String = script.text().collect();
    let data: NextData = serde_json::from_str(&json).map_err(|err| {
        LabelError::invalid_response(
            format!("unexpected keyword payload: {err}"),
            Some(&json),
        )
    })?;

    Ok(data
        .props
        .page_props
        .content_data
        .data
        .title
        .keywords
        .map(|connection| {
            connection
                .edges
                .into_iter()
                .map(|edge| edge.node.keyword.text.text)
                .collect()
        })
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword_page(keywords: &[&str]) -> String {
        let edges: Vec<_> = keywords
            .iter()
            .map(|k| {
                serde_json::json!({ "node": { "keyword": { "text": { "text": k } } } })
            })
            .collect();
        let data = serde_json::json!({
            "props": { "pageProps": { "contentData": { "data": {
                "title": { "keywords": { "edges": edges } }
            } } } }
        });
        format!(
            "<html><head><script id=\"__NEXT_DATA__\" type=\"application/json\">{data}</script></head><body></body></html>"
        )
    }

    #[test]
    fn extracts_keywords_in_page_order() {
        let page = keyword_page(&["prison", "friendship", "Escape"]);
        assert_eq!(
            extract_keywords(&page).unwrap(),
            vec!["prison", "friendship", "Escape"]
        );
    }

    #[test]
    fn missing_script_is_invalid_response() {
        let err = extract_keywords("<html><body>nothing</body></html>")
            .unwrap_err();
        assert!(matches!(err, LabelError::InvalidResponse { raw: Some(_), .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn unexpected_shape_is_invalid_response() {
        let page = "<script id=\"__NEXT_DATA__\">{\"props\":{}}</script>";
        assert!(matches!(
            extract_keywords(page),
            Err(LabelError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn title_without_keywords_is_empty() {
        let page = "<script id=\"__NEXT_DATA__\">{\"props\":{\"pageProps\":{\"contentData\":{\"data\":{\"title\":{}}}}}}</script>";
        assert!(extract_keywords(page).unwrap().is_empty());
    }

    #[test]
    fn base_url_keeps_path_prefix() {
        let url = parse_base_url("http://127.0.0.1:8080/imdb").unwrap();
        assert_eq!(
            url.join("title/tt0111161/keywords/").unwrap().as_str(),
            "http://127.0.0.1:8080/imdb/title/tt0111161/keywords/"
        );
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn keyword_url_joins_base() {
        let provider = ImdbKeywordProvider::new(
            ImdbProviderConfig::default(),
            Arc::new(SlidingWindowLimiter::new(Default::default())),
        )
        .unwrap();
        let url = provider
            .keywords_url(&ImdbId::parse("tt0111161").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "https://www.imdb.com/title/tt0111161/keywords/");
    }
}
