//! OpenAI-compatible structured extractor.
//!
//! Both phases go through `POST {base}/chat/completions` with a strict
//! `json_schema` response format, temperature 0 and a 4000 token cap.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::{
    ExtractedRecord, ExtractionError, ExtractionSchema, FieldDefinition, FieldType,
    StructuredExtractor,
};
use crate::config::ApiKey;
use crate::http_client::{HttpTimeouts, LLM_READ_TIMEOUT_SECS, build_http_client};
use crate::retry::parse_retry_after;
use crate::user_agent;

const MAX_TOKENS: u32 = 4000;
const MAX_ERROR_BODY_CHARS: usize = 500;

const FIELDS_SYSTEM_PROMPT: &str = "You design extraction schemas. Return one field definition \
for every field named in the user's list, keeping the user's field names. Choose the type that \
fits each field: str, int, float, bool or list.";

const EXTRACT_SYSTEM_PROMPT: &str = "You extract bibliographic search results from the text of \
an alert email. Return one item per search result, in order of appearance. The text lists the \
link targets of the email after its visible content; match each result to its own link. Use \
null for any field the text does not state.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'static str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FieldsAnswer {
    fields: Vec<FieldDefinition>,
}

fn fields_answer_schema() -> Value {
    let labels: Vec<&str> = FieldType::ALL.iter().map(|t| t.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "fields": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "type": { "type": "string", "enum": labels }
                    },
                    "required": ["name", "type"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["fields"],
        "additionalProperties": false
    })
}

/// Structured extractor backed by an OpenAI-compatible chat completions API.
pub struct LlmExtractor {
    client: Client,
    base_url: String,
    api_key: ApiKey,
    model: String,
}

impl LlmExtractor {
    /// Creates an extractor.
    ///
    /// The read timeout is raised to at least 120 seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Client`] if HTTP client construction fails.
    #[instrument(skip_all, fields(base_url = %base_url.as_ref()))]
    pub fn new(
        api_key: ApiKey,
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ExtractionError> {
        let client = build_http_client(
            "extraction",
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

    /// Sends one structured completion and returns the parsed JSON answer.
    async fn complete(
        &self,
        schema_name: &'static str,
        system_prompt: &str,
        user_content: &str,
        schema: &Value,
    ) -> Result<Value, ExtractionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: schema_name,
                    strict: true,
                    schema,
                },
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, schema_name, "calling extraction service");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "extraction request failed");
                ExtractionError::Network {
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(status = status.as_u16(), %message, "extraction service error");
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                message,
                retry_after,
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            ExtractionError::invalid_output(format!("unexpected response envelope: {e}"))
        })?;

        let message = chat
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ExtractionError::invalid_output("response has no choices"))?;

        if let Some(refusal) = message.refusal {
            return Err(ExtractionError::invalid_output(format!(
                "model refused: {refusal}"
            )));
        }

        let content = message
            .content
            .ok_or_else(|| ExtractionError::invalid_output("response has no content"))?;

        serde_json::from_str(&content)
            .map_err(|e| ExtractionError::invalid_output(format!("answer is not JSON: {e}")))
    }
}

impl std::fmt::Debug for LlmExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmExtractor")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StructuredExtractor for LlmExtractor {
    #[instrument(skip(self))]
    async fn generate_fields(&self, query: &str) -> Result<Vec<FieldDefinition>, ExtractionError> {
        let answer = self
            .complete(
                "field_definitions",
                FIELDS_SYSTEM_PROMPT,
                &format!("Field list: {query}"),
                &fields_answer_schema(),
            )
            .await?;

        let parsed: FieldsAnswer = serde_json::from_value(answer).map_err(|e| {
            ExtractionError::invalid_output(format!("field definitions malformed: {e}"))
        })?;
        debug!(fields = parsed.fields.len(), "generated field definitions");
        Ok(parsed.fields)
    }

    #[instrument(skip(self, schema, text), fields(text_len = text.len()))]
    async fn extract(
        &self,
        schema: &ExtractionSchema,
        text: &str,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        let answer = self
            .complete(
                "search_results",
                EXTRACT_SYSTEM_PROMPT,
                text,
                &schema.to_json_schema(),
            )
            .await?;

        let records = schema.parse_records(&answer)?;
        debug!(records = records.len(), "extracted records");
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn extractor(base_url: &str) -> LlmExtractor {
        LlmExtractor::new(
            ApiKey::new("sk-test"),
            base_url,
            "gpt-4o-mini",
            HttpTimeouts::default(),
        )
        .unwrap()
    }

    fn completion(content: &Value) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content.to_string(), "refusal": null },
                "finish_reason": "stop"
            }]
        })
    }

    fn schema() -> ExtractionSchema {
        ExtractionSchema::new(vec![
            FieldDefinition::new("title", FieldType::Str),
            FieldDefinition::new("authors", FieldType::List),
        ])
        .unwrap()
    }

    #[test]
    fn test_debug_does_not_leak_api_key() {
        let rendered = format!("{:?}", extractor("https://api.example.com/v1/"));
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("https://api.example.com/v1\""));
    }

    #[test]
    fn test_fields_answer_schema_enumerates_types() {
        let schema = fields_answer_schema();
        assert_eq!(
            schema["properties"]["fields"]["items"]["properties"]["type"]["enum"],
            json!(["str", "int", "float", "bool", "list"])
        );
    }

    #[tokio::test]
    async fn test_generate_fields_parses_definitions() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0,
                "max_tokens": 4000,
                "response_format": {
                    "type": "json_schema",
                    "json_schema": { "name": "field_definitions", "strict": true }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&json!({
                "fields": [
                    { "name": "title", "type": "str" },
                    { "name": "authors", "type": "list" }
                ]
            }))))
            .mount(&mock_server)
            .await;

        let fields = extractor(&mock_server.uri())
            .generate_fields("title, authors")
            .await
            .unwrap();
        assert_eq!(
            fields,
            vec![
                FieldDefinition::new("title", FieldType::Str),
                FieldDefinition::new("authors", FieldType::List),
            ]
        );
    }

    #[tokio::test]
    async fn test_extract_sends_schema_and_parses_records() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "response_format": {
                    "json_schema": {
                        "name": "search_results",
                        "schema": { "required": ["items"] }
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&json!({
                "items": [
                    { "title": "Evaluation of 3D seed structure", "authors": ["M Griffiths"] },
                    { "title": "Second paper", "authors": null }
                ]
            }))))
            .mount(&mock_server)
            .await;

        let records = extractor(&mock_server.uri())
            .extract(&schema(), "alert text")
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].text("title").as_deref(),
            Some("Evaluation of 3D seed structure")
        );
        assert_eq!(records[1].text("authors"), None);
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let err = extractor(&mock_server.uri())
            .extract(&schema(), "text")
            .await
            .unwrap_err();
        match err {
            ExtractionError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .mount(&mock_server)
            .await;

        let err = extractor(&mock_server.uri())
            .generate_fields("title")
            .await
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_non_json_content_is_invalid_output() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "Sorry, I cannot help." } }]
            })))
            .mount(&mock_server)
            .await;

        let err = extractor(&mock_server.uri())
            .extract(&schema(), "text")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_refusal_is_invalid_output() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": null, "refusal": "no" } }]
            })))
            .mount(&mock_server)
            .await;

        let err = extractor(&mock_server.uri())
            .extract(&schema(), "text")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model refused"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let err = extractor("http://127.0.0.1:1")
            .extract(&schema(), "text")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Network { .. }));
    }
}
