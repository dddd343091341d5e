//! Error types for the semantic scorer.

use thiserror::Error;

use crate::http_client::HttpClientError;

/// Errors raised while building or querying the semantic index.
#[derive(Debug, Error)]
pub enum SemanticError {
    /// The embedding service could not be reached.
    #[error("embedding service unreachable: {message}")]
    Network { message: String },

    /// The embedding service answered with a non-success status.
    #[error("embedding service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The embedding service answered with an unusable body.
    #[error("embedding response rejected: {message}")]
    InvalidResponse { message: String },

    /// A vector cannot be indexed or queried.
    #[error("invalid embedding: {message}")]
    InvalidVector { message: String },

    /// Query issued against an index with no entries.
    #[error("semantic index is empty")]
    EmptyIndex,

    /// The reference corpus could not be read or parsed.
    #[error("reference corpus unusable: {message}")]
    Corpus { message: String },

    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] HttpClientError),
}

impl SemanticError {
    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_vector(message: impl Into<String>) -> Self {
        Self::InvalidVector {
            message: message.into(),
        }
    }

    pub(crate) fn corpus(message: impl Into<String>) -> Self {
        Self::Corpus {
            message: message.into(),
        }
    }
}
