//! Error types for schema generation and structured extraction.

use std::time::Duration;

use thiserror::Error;

use crate::http_client::HttpClientError;
use crate::retry::{FailureType, classify_http_status};

/// Rejected field definitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// No field definitions were produced.
    #[error("extraction schema has no fields")]
    Empty,

    /// A field name is blank after trimming.
    #[error("field #{index} has an empty name")]
    EmptyName {
        /// Position of the field in the generated list.
        index: usize,
    },

    /// A field name is not a usable identifier.
    #[error("field name '{name}' is not a valid identifier")]
    InvalidName {
        /// The normalized name.
        name: String,
    },

    /// Two fields normalize to the same name.
    #[error("duplicate field name '{name}'")]
    Duplicate {
        /// The normalized name.
        name: String,
    },

    /// A field every search result needs is not in the schema.
    #[error("extraction schema has no '{name}' field")]
    MissingField {
        /// The required field name.
        name: &'static str,
    },
}

/// Errors from the structured extraction service.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Transport failure (connect, timeout, body read).
    #[error("extraction service unreachable: {message}")]
    Network {
        /// Error detail.
        message: String,
    },

    /// The service answered with a non-success status.
    #[error("extraction service returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
        /// Parsed `Retry-After`, when the service sent one.
        retry_after: Option<Duration>,
    },

    /// The model's answer does not match the requested shape.
    #[error("extraction output rejected: {message}")]
    InvalidOutput {
        /// What was wrong with the answer.
        message: String,
    },

    /// The generated field definitions are unusable.
    #[error("invalid extraction schema: {0}")]
    Schema(#[from] SchemaError),

    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] HttpClientError),
}

impl ExtractionError {
    /// Creates an invalid output error.
    #[must_use]
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            message: message.into(),
        }
    }

    /// Classifies the error for the retry policy.
    ///
    /// Network failures, 5xx, 429 and unparseable model output are worth
    /// another attempt. Rejected credentials and bad requests are not.
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Network { .. } | Self::InvalidOutput { .. } => FailureType::Transient,
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Schema(_) | Self::Client(_) => FailureType::Permanent,
        }
    }

    /// Server-requested wait before the next attempt.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
