//! Runtime configuration loaded from environment variables.
//!
//! [`Config::from_env`] loads an optional `.env` file and reads every setting
//! once at startup. Parsing goes through [`Config::from_lookup`] so tests can
//! supply variables without touching the process environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::extract::DEFAULT_EXTRACTION_QUERY;
use crate::http_client::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpTimeouts};

/// Default database file.
pub const DEFAULT_DATABASE_PATH: &str = "alertminer.db";
/// Default OpenAI-compatible API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default extraction model.
pub const DEFAULT_EXTRACTION_MODEL: &str = "gpt-4o-mini";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default Crossref REST API base URL.
pub const DEFAULT_CROSSREF_BASE_URL: &str = "https://api.crossref.org";
/// Default delay before each Crossref call, in milliseconds.
pub const DEFAULT_CROSSREF_DELAY_MS: u64 = 5_000;

const MAX_CROSSREF_DELAY_MS: u64 = 60_000;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("{variable} must be set")]
    Missing {
        /// Environment variable name.
        variable: &'static str,
    },

    /// A variable is set to a value that cannot be used.
    #[error("Invalid value for `{variable}`: {value}. {expected}")]
    Invalid {
        /// Environment variable name.
        variable: &'static str,
        /// The rejected value.
        value: String,
        /// What would have been accepted.
        expected: String,
    },
}

/// An API key whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key for use in an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Settings for the extraction service.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub api_key: Option<ApiKey>,
    pub base_url: String,
    pub model: String,
    /// Natural-language list of the fields to extract.
    pub query: String,
}

/// Settings for the embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub api_key: Option<ApiKey>,
    pub base_url: String,
    pub model: String,
}

/// Settings for the Crossref registry.
#[derive(Debug, Clone)]
pub struct CrossrefSettings {
    pub base_url: String,
    /// Contact address for Crossref's polite pool.
    pub mailto: Option<String>,
    /// Fixed delay before each registry call.
    pub delay: Duration,
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub extraction: ExtractionSettings,
    pub embedding: EmbeddingSettings,
    pub crossref: CrossrefSettings,
    /// Source of the reference title corpus.
    pub publication_feed_url: Option<String>,
    pub http: HttpTimeouts,
}

impl Config {
    /// Loads an optional `.env` file, then reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparseable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal production case.
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from a variable lookup function.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparseable or out-of-range values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let extraction_api_key = get("EXTRACTION_API_KEY").map(ApiKey::new);
        let extraction_base_url =
            get("EXTRACTION_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());

        let extraction = ExtractionSettings {
            api_key: extraction_api_key.clone(),
            base_url: extraction_base_url.clone(),
            model: get("EXTRACTION_MODEL").unwrap_or_else(|| DEFAULT_EXTRACTION_MODEL.to_string()),
            query: get("EXTRACTION_QUERY").unwrap_or_else(|| DEFAULT_EXTRACTION_QUERY.to_string()),
        };

        let embedding = EmbeddingSettings {
            api_key: get("EMBEDDING_API_KEY")
                .map(ApiKey::new)
                .or(extraction_api_key),
            base_url: get("EMBEDDING_BASE_URL").unwrap_or(extraction_base_url),
            model: get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        };

        let delay_ms = parse_u64(
            "CROSSREF_DELAY_MS",
            get("CROSSREF_DELAY_MS"),
            DEFAULT_CROSSREF_DELAY_MS,
        )?;
        validate_crossref_delay_ms(delay_ms)?;

        let crossref = CrossrefSettings {
            base_url: get("CROSSREF_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CROSSREF_BASE_URL.to_string()),
            mailto: get("CROSSREF_MAILTO"),
            delay: Duration::from_millis(delay_ms),
        };

        let connect_secs = parse_u64(
            "HTTP_CONNECT_TIMEOUT_SECS",
            get("HTTP_CONNECT_TIMEOUT_SECS"),
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        validate_timeout_secs("HTTP_CONNECT_TIMEOUT_SECS", connect_secs)?;
        let read_secs = parse_u64(
            "HTTP_READ_TIMEOUT_SECS",
            get("HTTP_READ_TIMEOUT_SECS"),
            DEFAULT_READ_TIMEOUT_SECS,
        )?;
        validate_timeout_secs("HTTP_READ_TIMEOUT_SECS", read_secs)?;

        Ok(Self {
            database_path: get("ALERTMINER_DATABASE")
                .map_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH), PathBuf::from),
            extraction,
            embedding,
            crossref,
            publication_feed_url: get("PUBLICATION_FEED_URL"),
            http: HttpTimeouts::from_secs(connect_secs, read_secs),
        })
    }

    /// Overrides the Crossref delay, applying the same range check as the
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the delay is out of range.
    pub fn set_crossref_delay_ms(&mut self, delay_ms: u64) -> Result<(), ConfigError> {
        validate_crossref_delay_ms(delay_ms)?;
        self.crossref.delay = Duration::from_millis(delay_ms);
        Ok(())
    }

    /// Returns the extraction API key or the error naming its variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `EXTRACTION_API_KEY` is unset.
    pub fn require_extraction_api_key(&self) -> Result<&ApiKey, ConfigError> {
        self.extraction.api_key.as_ref().ok_or(ConfigError::Missing {
            variable: "EXTRACTION_API_KEY",
        })
    }

    /// Returns the embedding API key or the error naming its variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when neither `EMBEDDING_API_KEY` nor
    /// `EXTRACTION_API_KEY` is set.
    pub fn require_embedding_api_key(&self) -> Result<&ApiKey, ConfigError> {
        self.embedding.api_key.as_ref().ok_or(ConfigError::Missing {
            variable: "EMBEDDING_API_KEY",
        })
    }
}

fn parse_u64(variable: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    value.parse::<u64>().map_err(|_| ConfigError::Invalid {
        variable,
        value,
        expected: "Expected a non-negative integer".to_string(),
    })
}

fn validate_crossref_delay_ms(value: u64) -> Result<(), ConfigError> {
    if value > MAX_CROSSREF_DELAY_MS {
        return Err(ConfigError::Invalid {
            variable: "CROSSREF_DELAY_MS",
            value: value.to_string(),
            expected: format!("Expected range: 0..={MAX_CROSSREF_DELAY_MS}"),
        });
    }
    Ok(())
}

fn validate_timeout_secs(variable: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::Invalid {
            variable,
            value: value.to_string(),
            expected: "Expected range: 1..=3600".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_path, PathBuf::from("alertminer.db"));
        assert_eq!(config.extraction.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.extraction.model, "gpt-4o-mini");
        assert_eq!(config.extraction.query, DEFAULT_EXTRACTION_QUERY);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.crossref.base_url, "https://api.crossref.org");
        assert_eq!(config.crossref.delay, Duration::from_secs(5));
        assert!(config.crossref.mailto.is_none());
        assert!(config.publication_feed_url.is_none());
        assert_eq!(config.http, HttpTimeouts::default());
    }

    #[test]
    fn test_missing_api_key_is_reported_on_demand() {
        let config = config_from(&[]).unwrap();
        assert_eq!(
            config.require_extraction_api_key().unwrap_err(),
            ConfigError::Missing {
                variable: "EXTRACTION_API_KEY"
            }
        );
        assert!(config.require_embedding_api_key().is_err());
    }

    #[test]
    fn test_embedding_falls_back_to_extraction_settings() {
        let config = config_from(&[
            ("EXTRACTION_API_KEY", "sk-extract"),
            ("EXTRACTION_BASE_URL", "http://localhost:8000/v1"),
        ])
        .unwrap();
        assert_eq!(
            config.require_embedding_api_key().unwrap().expose(),
            "sk-extract"
        );
        assert_eq!(config.embedding.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn test_embedding_settings_override_fallback() {
        let config = config_from(&[
            ("EXTRACTION_API_KEY", "sk-extract"),
            ("EMBEDDING_API_KEY", "sk-embed"),
            ("EMBEDDING_BASE_URL", "http://embed:9000/v1"),
        ])
        .unwrap();
        assert_eq!(config.require_embedding_api_key().unwrap().expose(), "sk-embed");
        assert_eq!(config.embedding.base_url, "http://embed:9000/v1");
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = config_from(&[("EXTRACTION_API_KEY", "   "), ("CROSSREF_MAILTO", "")]).unwrap();
        assert!(config.extraction.api_key.is_none());
        assert!(config.crossref.mailto.is_none());
    }

    #[test]
    fn test_crossref_delay_is_parsed_and_range_checked() {
        let config = config_from(&[("CROSSREF_DELAY_MS", "250")]).unwrap();
        assert_eq!(config.crossref.delay, Duration::from_millis(250));

        let err = config_from(&[("CROSSREF_DELAY_MS", "60001")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                variable: "CROSSREF_DELAY_MS",
                ..
            }
        ));

        let err = config_from(&[("CROSSREF_DELAY_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("non-negative integer"));
    }

    #[test]
    fn test_timeouts_are_range_checked() {
        let config = config_from(&[
            ("HTTP_CONNECT_TIMEOUT_SECS", "3"),
            ("HTTP_READ_TIMEOUT_SECS", "45"),
        ])
        .unwrap();
        assert_eq!(config.http, HttpTimeouts::from_secs(3, 45));

        let err = config_from(&[("HTTP_READ_TIMEOUT_SECS", "0")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for `HTTP_READ_TIMEOUT_SECS`: 0. Expected range: 1..=3600"
        );
    }

    #[test]
    fn test_set_crossref_delay_override() {
        let mut config = config_from(&[]).unwrap();
        config.set_crossref_delay_ms(0).unwrap();
        assert_eq!(config.crossref.delay, Duration::ZERO);
        assert!(config.set_crossref_delay_ms(120_000).is_err());
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let config = config_from(&[("EXTRACTION_API_KEY", "sk-very-secret")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
