//! Crossref registry client: samples works by title via the Crossref REST API.
//!
//! [`CrossrefClient`] calls `GET {base}/works?sample=N&query.title=...` and
//! returns the sampled works. A `mailto` query parameter is sent when
//! configured so requests land in Crossref's polite pool. Every call waits
//! the configured [`Throttle`] delay first.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{BibliographicRegistry, RegistryError, RegistryWork, Throttle};
use crate::config::CrossrefSettings;
use crate::http_client::{HttpTimeouts, build_http_client};
use crate::user_agent;

/// Default Crossref API base URL.
const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

// ==================== Crossref API Response Types ====================

/// Top-level Crossref list response.
#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefListResponse {
    pub status: String,
    pub message: CrossrefWorkList,
}

/// The `message` field of a `/works` list response.
#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefWorkList {
    #[serde(default)]
    pub items: Vec<CrossrefWork>,
}

/// One work from the list.
#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefWork {
    /// The DOI field is uppercase in the Crossref response.
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(default)]
    pub title: Vec<String>,
}

impl From<CrossrefWork> for RegistryWork {
    fn from(work: CrossrefWork) -> Self {
        Self {
            doi: work.doi,
            titles: work.title,
        }
    }
}

// ==================== CrossrefClient ====================

/// Samples works from the Crossref REST API.
pub struct CrossrefClient {
    client: Client,
    base_url: String,
    mailto: Option<String>,
    throttle: Throttle,
}

impl CrossrefClient {
    /// Creates a client against the public Crossref API.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if `mailto` contains control characters or
    /// HTTP client construction fails.
    pub fn new(
        mailto: Option<String>,
        throttle: Throttle,
        timeouts: HttpTimeouts,
    ) -> Result<Self, RegistryError> {
        Self::with_base_url(DEFAULT_BASE_URL, mailto, throttle, timeouts)
    }

    /// Creates a client from runtime settings.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the settings are unusable.
    pub fn from_settings(
        settings: &CrossrefSettings,
        timeouts: HttpTimeouts,
    ) -> Result<Self, RegistryError> {
        Self::with_base_url(
            &settings.base_url,
            settings.mailto.clone(),
            Throttle::fixed(settings.delay),
            timeouts,
        )
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if `mailto` contains control characters or
    /// HTTP client construction fails.
    #[tracing::instrument(skip_all, fields(base_url = %base_url.as_ref()))]
    pub fn with_base_url(
        base_url: impl AsRef<str>,
        mailto: Option<String>,
        throttle: Throttle,
        timeouts: HttpTimeouts,
    ) -> Result<Self, RegistryError> {
        if let Some(mailto) = &mailto
            && mailto.chars().any(|c| c == '\n' || c == '\r' || c == '\0')
        {
            return Err(RegistryError::invalid_query(
                "mailto contains invalid control characters",
            ));
        }

        let client = build_http_client("crossref", user_agent::default_user_agent(), timeouts)?;

        Ok(Self {
            client,
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            mailto,
            throttle,
        })
    }

    /// Returns the throttle applied before each call.
    #[must_use]
    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    fn sample_url(&self, title: &str, size: u32) -> String {
        let mut url = format!(
            "{}/works?sample={size}&query.title={}",
            self.base_url,
            urlencoding::encode(title)
        );
        if let Some(mailto) = &self.mailto {
            url.push_str("&mailto=");
            url.push_str(&urlencoding::encode(mailto));
        }
        url
    }
}

impl std::fmt::Debug for CrossrefClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossrefClient")
            .field("base_url", &self.base_url)
            .field("mailto", &self.mailto)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BibliographicRegistry for CrossrefClient {
    #[instrument(skip(self), fields(registry = "crossref"))]
    async fn sample_by_title(
        &self,
        title: &str,
        size: u32,
    ) -> Result<Vec<RegistryWork>, RegistryError> {
        if title.trim().is_empty() {
            return Err(RegistryError::invalid_query("title is empty"));
        }

        let url = self.sample_url(title, size);
        self.throttle.acquire().await;
        debug!(api_url = %url, "Calling Crossref API");

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(error = %e, "Crossref API request failed");
            RegistryError::connection(format!("cannot reach Crossref API: {e}"))
        })?;

        if let Some(limit) = response.headers().get("x-rate-limit-limit") {
            debug!(rate_limit = ?limit, "Crossref rate limit");
        }

        let status = response.status();
        if !status.is_success() {
            let reason = match status.as_u16() {
                400 => "Crossref rejected the query".to_string(),
                429 => "Crossref rate limit exceeded".to_string(),
                s if s >= 500 => format!("Crossref API unavailable (HTTP {s})"),
                s => format!("Crossref API returned HTTP {s}"),
            };
            debug!(status = status.as_u16(), %reason, "Crossref API error");
            return Err(RegistryError::invalid_query(reason));
        }

        let body = response.json::<CrossrefListResponse>().await.map_err(|e| {
            warn!(error = %e, "Failed to parse Crossref response JSON");
            RegistryError::invalid_query(format!("unexpected Crossref response format: {e}"))
        })?;

        if !body.status.eq_ignore_ascii_case("ok") {
            warn!(status = %body.status, "Crossref response status was not ok");
            return Err(RegistryError::invalid_query(format!(
                "unexpected Crossref response status '{}'",
                body.status
            )));
        }

        let works: Vec<RegistryWork> = body.message.items.into_iter().map(Into::into).collect();
        debug!(candidates = works.len(), "Crossref sample received");
        Ok(works)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    const SEED_TITLE: &str =
        "Evaluation of 3D seed structure and cellular traits in-situ using X-ray microscopy";

    fn client(base_url: &str, mailto: Option<&str>) -> CrossrefClient {
        CrossrefClient::with_base_url(
            base_url,
            mailto.map(str::to_string),
            Throttle::disabled(),
            HttpTimeouts::default(),
        )
        .unwrap()
    }

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "message-type": "work-list",
            "message": {
                "items": [
                    { "DOI": "10.1038/s41598-025-88482-7", "title": [SEED_TITLE] },
                    { "DOI": "10.1000/other", "title": ["Something else"] }
                ],
                "items-per-page": 2
            }
        })
    }

    #[test]
    fn test_crossref_work_deserialize_minimal() {
        let work: CrossrefWork = serde_json::from_str("{}").unwrap();
        assert!(work.doi.is_none());
        assert!(work.title.is_empty());
    }

    #[test]
    fn test_sample_url_encodes_title_and_mailto() {
        let client = client("https://api.crossref.org/", Some("team@example.org"));
        assert_eq!(
            client.sample_url("A & B: seeds", 2),
            "https://api.crossref.org/works?sample=2&query.title=A%20%26%20B%3A%20seeds&mailto=team%40example.org"
        );
    }

    #[test]
    fn test_constructor_rejects_invalid_mailto() {
        let result = CrossrefClient::with_base_url(
            "https://api.crossref.org",
            Some("bad\r\nvalue".to_string()),
            Throttle::disabled(),
            HttpTimeouts::default(),
        );
        assert!(matches!(result, Err(RegistryError::InvalidQuery { .. })));
    }

    #[tokio::test]
    async fn test_sample_by_title_returns_works_in_order() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("sample", "2"))
            .and(query_param("query.title", SEED_TITLE))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_json()))
            .mount(&mock_server)
            .await;

        let works = client(&mock_server.uri(), None)
            .sample_by_title(SEED_TITLE, 2)
            .await
            .unwrap();
        assert_eq!(works.len(), 2);
        assert_eq!(works[0].doi.as_deref(), Some("10.1038/s41598-025-88482-7"));
        assert_eq!(works[0].first_title(), Some(SEED_TITLE));
    }

    #[tokio::test]
    async fn test_sample_by_title_sends_mailto_and_user_agent() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("mailto", "team@example.org"))
            .and(header("user-agent", user_agent::default_user_agent()))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_json()))
            .mount(&mock_server)
            .await;

        // Without the mailto param wiremock answers 404, which maps to an error.
        let result = client(&mock_server.uri(), Some("team@example.org"))
            .sample_by_title(SEED_TITLE, 2)
            .await;
        assert!(result.is_ok(), "expected match, got {result:?}");
    }

    #[tokio::test]
    async fn test_sample_by_title_error_status_is_invalid_query() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server.uri(), None)
            .sample_by_title(SEED_TITLE, 2)
            .await
            .unwrap_err();
        match err {
            RegistryError::InvalidQuery { message } => {
                assert!(message.contains("rejected"), "unexpected message: {message}");
            }
            other => panic!("expected InvalidQuery, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sample_by_title_malformed_json_is_invalid_query() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server.uri(), None)
            .sample_by_title(SEED_TITLE, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidQuery { .. }));
    }

    #[tokio::test]
    async fn test_sample_by_title_non_ok_status_is_invalid_query() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "message": {}
            })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server.uri(), None)
            .sample_by_title(SEED_TITLE, 2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed"));
    }

    #[tokio::test]
    async fn test_sample_by_title_unreachable_is_connection_error() {
        let err = client("http://127.0.0.1:1", None)
            .sample_by_title(SEED_TITLE, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_sample_by_title_rejects_blank_title_without_request() {
        let err = client("http://127.0.0.1:1", None)
            .sample_by_title("   ", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidQuery { .. }));
    }
}
