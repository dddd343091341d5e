//! Shared HTTP client construction policy for service clients.
//!
//! The Crossref, extraction, embedding and feed clients all build their
//! `reqwest::Client` here so timeouts, user-agent, compression and proxy
//! handling stay consistent.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use thiserror::Error;
use tracing::warn;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Read timeout for model calls, which routinely exceed the default.
pub const LLM_READ_TIMEOUT_SECS: u64 = 120;

/// Error raised when an HTTP client cannot be constructed.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The builder rejected the configuration.
    #[error("{client} HTTP client construction failed: {message}")]
    Build {
        /// Which service client was being built.
        client: String,
        /// Underlying builder error.
        message: String,
    },

    /// Proxy discovery panicked twice.
    #[error("{client} HTTP client construction panicked while initializing networking")]
    Panicked {
        /// Which service client was being built.
        client: String,
    },
}

/// Connect and read timeouts applied to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS)
    }
}

impl HttpTimeouts {
    /// Creates timeouts from whole seconds.
    #[must_use]
    pub fn from_secs(connect_secs: u64, read_secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect_secs),
            read: Duration::from_secs(read_secs),
        }
    }

    /// Returns a copy whose read timeout is at least `secs`.
    #[must_use]
    pub fn with_min_read_secs(self, secs: u64) -> Self {
        Self {
            read: self.read.max(Duration::from_secs(secs)),
            ..self
        }
    }
}

/// Builds a service HTTP client using shared project policy.
///
/// `client_name` is used only for error messages and logging.
///
/// # Errors
///
/// Returns [`HttpClientError`] when client construction fails.
pub fn build_http_client(
    client_name: &str,
    user_agent: impl Into<String>,
    timeouts: HttpTimeouts,
) -> Result<Client, HttpClientError> {
    let user_agent = user_agent.into();

    match try_build_client(&user_agent, timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; retry with env proxies only.
            warn!(
                client = client_name,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            try_build_client(&user_agent, timeouts, true)
                .map_err(|failure| failure.into_error(client_name))
        }
        Err(failure) => Err(failure.into_error(client_name)),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

impl BuildClientFailure {
    fn into_error(self, client_name: &str) -> HttpClientError {
        match self {
            Self::Panic => HttpClientError::Panicked {
                client: client_name.to_string(),
            },
            Self::Build(error) => HttpClientError::Build {
                client: client_name.to_string(),
                message: error.to_string(),
            },
        }
    }
}

fn try_build_client(
    user_agent: &str,
    timeouts: HttpTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(user_agent, timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(user_agent: String, timeouts: HttpTimeouts) -> ClientBuilder {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .user_agent(user_agent)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
