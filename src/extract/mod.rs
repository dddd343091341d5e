//! Structured extraction of search results from alert text.
//!
//! Extraction runs in two phases against a [`StructuredExtractor`]:
//!
//! 1. [`generate_schema`] asks the service for field definitions matching a
//!    natural-language field list and validates them into an
//!    [`ExtractionSchema`].
//! 2. [`extract_with_retry`] requests the records of one alert under that
//!    schema, retrying transient failures per [`RetryPolicy`].
//!
//! [`to_new_search_results`] then maps records onto storable search results.

mod convert;
mod error;
mod llm;
mod schema;

pub use convert::{to_new_search_result, to_new_search_results};
pub use error::{ExtractionError, SchemaError};
pub use llm::LlmExtractor;
pub use schema::{ExtractedRecord, ExtractionSchema, FieldDefinition, FieldType, FieldValue};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::retry::{RetryDecision, RetryPolicy};

/// Field list used when none is configured.
pub const DEFAULT_EXTRACTION_QUERY: &str =
    "title, original_url, authors, year_of_publication, journal_name, snippet";

/// External service that turns text into typed records.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Proposes (name, type) pairs for a natural-language field list.
    async fn generate_fields(&self, query: &str) -> Result<Vec<FieldDefinition>, ExtractionError>;

    /// Extracts zero or more records matching `schema` from `text`.
    async fn extract(
        &self,
        schema: &ExtractionSchema,
        text: &str,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError>;
}

/// Generates and validates the extraction schema for `query`.
///
/// # Errors
///
/// Returns the last [`ExtractionError`] once retries are exhausted, or
/// [`ExtractionError::Schema`] when the proposed fields are invalid.
#[instrument(skip(extractor, policy))]
pub async fn generate_schema(
    extractor: &dyn StructuredExtractor,
    query: &str,
    policy: &RetryPolicy,
) -> Result<ExtractionSchema, ExtractionError> {
    let fields = with_retry(policy, "generate_fields", || extractor.generate_fields(query)).await?;
    let schema = ExtractionSchema::new(fields)?;
    info!(fields = schema.fields().len(), "extraction schema ready");
    Ok(schema)
}

/// Extracts records from `text`, retrying transient failures.
///
/// # Errors
///
/// Returns the last [`ExtractionError`] once retries are exhausted or on the
/// first permanent failure.
#[instrument(skip(extractor, schema, text, policy), fields(text_len = text.len()))]
pub async fn extract_with_retry(
    extractor: &dyn StructuredExtractor,
    schema: &ExtractionSchema,
    text: &str,
    policy: &RetryPolicy,
) -> Result<Vec<ExtractedRecord>, ExtractionError> {
    with_retry(policy, "extract", || extractor.extract(schema, text)).await
}

async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, ExtractionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractionError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(operation, attempt, "calling extraction service");

        match call().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.should_retry(error.failure_type(), attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    let retry_after = error.retry_after();
                    let delay = retry_after.unwrap_or(backoff_delay);
                    info!(
                        operation,
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after.is_some(),
                        error = %error,
                        "retrying extraction call"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(operation, attempt, %reason, "not retrying extraction call");
                    return Err(error);
                }
            },
        }
    }
}
