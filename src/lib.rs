//! Alertminer Core Library
//!
//! This library mines scholarly alert emails into structured, DOI-resolved
//! and similarity-scored search results.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`store`] - Email and search result persistence
//! - [`html`] - Alert body normalization and text rendering
//! - [`extract`] - Schema generation and structured extraction via an LLM
//! - [`doi`] - DOI resolution state machine against Crossref
//! - [`semantic`] - Embedding index and title similarity scoring
//! - [`pipeline`] - The extraction, DOI and scoring passes
//! - [`config`] - Environment configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod doi;
pub mod extract;
pub mod html;
pub mod http_client;
pub mod pipeline;
pub mod retry;
pub mod semantic;
pub mod store;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ApiKey, Config, ConfigError};
pub use db::{Database, DbError};
pub use doi::{BibliographicRegistry, CrossrefClient, DoiResolver, DoiState, Throttle};
pub use extract::{
    DEFAULT_EXTRACTION_QUERY, ExtractionError, ExtractionSchema, LlmExtractor, StructuredExtractor,
};
pub use http_client::HttpTimeouts;
pub use pipeline::{EMAIL_PARSED_MESSAGE, PassStats, Pipeline, PipelineError};
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
pub use semantic::{OpenAiEmbedder, SemanticError, SemanticScorer, TitleScorer};
pub use store::{RecordStore, Store, StoreError};
