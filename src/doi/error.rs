//! Error types for bibliographic registry lookups.

use thiserror::Error;

use crate::http_client::HttpClientError;

/// Errors from a bibliographic registry.
///
/// Neither kind is retried: the resolver logs it, leaves the DOI unset and
/// moves on.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry rejected the query or answered with an unusable body.
    #[error("invalid registry query: {message}")]
    InvalidQuery {
        /// Error detail.
        message: String,
    },

    /// The registry could not be reached.
    #[error("registry connection failed: {message}")]
    Connection {
        /// Error detail.
        message: String,
    },

    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] HttpClientError),
}

impl RegistryError {
    /// Creates an invalid query error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}
