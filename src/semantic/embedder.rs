//! Text embedding seam and its OpenAI-compatible implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::SemanticError;
use crate::config::ApiKey;
use crate::http_client::{HttpTimeouts, LLM_READ_TIMEOUT_SECS, build_http_client};
use crate::user_agent;

/// Inputs per embedding request.
const EMBEDDING_BATCH_SIZE: usize = 100;
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Maps texts to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds every text, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: ApiKey,
    model: String,
}

impl OpenAiEmbedder {
    /// Creates an embedder.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Client`] if HTTP client construction fails.
    #[instrument(skip_all, fields(base_url = %base_url.as_ref()))]
    pub fn new(
        api_key: ApiKey,
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, SemanticError> {
        let client = build_http_client(
            "embedding",
            user_agent::default_user_agent(),
            timeouts.with_min_read_secs(LLM_READ_TIMEOUT_SECS),
        )?;

        Ok(Self {
            client,
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            input: batch,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Embedding request failed");
                SemanticError::Network {
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(status = status.as_u16(), %message, "Embedding service error");
            return Err(SemanticError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SemanticError::invalid_response(e.to_string()))?;

        if parsed.data.len() != batch.len() {
            return Err(SemanticError::invalid_response(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    #[instrument(skip(self, texts), fields(texts = texts.len(), model = %self.model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
            debug!(embedded = vectors.len(), "embedding batch complete");
        }
        Ok(vectors)
    }
}
