//! Shared outbound HTTP plumbing for the provider and catalog clients.

use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

use crate::error::{LabelError, Result};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub(crate) fn build_client(
    timeout: Duration,
    user_agent: &str,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|err| {
            LabelError::invalid_response(
                format!("failed to build HTTP client: {err}"),
                None,
            )
        })
}

/// Parses a base url so that relative joins append to its path.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        LabelError::invalid_response(format!("invalid base url {raw:?}: {err}"), None)
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Which side of the pipeline a transport failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Upstream {
    Provider,
    Catalog,
}

impl Upstream {
    pub(crate) fn unavailable(self, message: String) -> LabelError {
        match self {
            Upstream::Provider => LabelError::ProviderUnavailable(message),
            Upstream::Catalog => LabelError::RemoteUnavailable(message),
        }
    }

    /// Timeouts and connection failures are transient; a body that cannot
    /// be decoded is not.
    pub(crate) fn transport_error(self, err: reqwest::Error) -> LabelError {
        if err.is_timeout() {
            self.unavailable(format!("request timed out: {err}"))
        } else if err.is_connect() || err.is_request() {
            self.unavailable(format!("connection failed: {err}"))
        } else if err.is_decode() || err.is_body() {
            LabelError::invalid_response(
                format!("failed to read response body: {err}"),
                None,
            )
        } else {
            self.unavailable(err.to_string())
        }
    }

    /// Maps status codes shared by both upstreams. `None` means the caller
    /// decides (success or a status it treats specially).
    pub(crate) fn status_error(
        self,
        status: StatusCode,
        what: &str,
        body: &str,
    ) -> Option<LabelError> {
        if status.is_success() {
            return None;
        }
        Some(match status {
            StatusCode::NOT_FOUND => LabelError::NotFound(what.to_string()),
            StatusCode::TOO_MANY_REQUESTS => LabelError::RateLimited(format!(
                "{what}: upstream returned 429"
            )),
            StatusCode::REQUEST_TIMEOUT => {
                self.unavailable(format!("{what}: upstream returned 408"))
            }
            status if status.is_server_error() => self.unavailable(format!(
                "{what}: upstream returned {}",
                status.as_u16()
            )),
            status => LabelError::invalid_response(
                format!("{what}: unexpected status {}", status.as_u16()),
                Some(body),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_splits_transient_from_terminal() {
        let p = Upstream::Provider;
        assert!(p.status_error(StatusCode::OK, "x", "").is_none());
        assert!(matches!(
            p.status_error(StatusCode::NOT_FOUND, "x", ""),
            Some(LabelError::NotFound(_))
        ));
        assert!(matches!(
            p.status_error(StatusCode::TOO_MANY_REQUESTS, "x", ""),
            Some(LabelError::RateLimited(_))
        ));
        assert!(matches!(
            p.status_error(StatusCode::BAD_GATEWAY, "x", ""),
            Some(LabelError::ProviderUnavailable(_))
        ));
        assert!(matches!(
            Upstream::Catalog.status_error(StatusCode::SERVICE_UNAVAILABLE, "x", ""),
            Some(LabelError::RemoteUnavailable(_))
        ));
        assert!(matches!(
            p.status_error(StatusCode::BAD_REQUEST, "x", "nope"),
            Some(LabelError::InvalidResponse { .. })
        ));
    }
}
