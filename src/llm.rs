//! Extraction client for a locally hosted language model.
//!
//! Defines the [`Extractor`] trait and [`OllamaExtractor`], which posts to an
//! Ollama-compatible `POST /api/generate` endpoint in JSON mode and returns
//! the model's answer as an untyped JSON object. Schema enforcement happens
//! later, in [`crate::normalize`].
//!
//! # Retry Strategy
//!
//! - Connection errors, HTTP 429 and 5xx → retry with exponential backoff
//!   (1s, 2s, 4s, … capped at 32s), up to `model.max_retries` times
//! - Other 4xx and malformed payloads → fail immediately
//!
//! The default of zero retries means one attempt per document.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelConfig;
use crate::models::EXTRACTION_KEYS;

/// The model's answer: a JSON object with arbitrary, unvalidated values.
pub type RawExtraction = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("model request failed (is the model server running at {url}?): {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model envelope has no `response` string: {raw}")]
    MissingResponse { raw: String },
    #[error("model did not return valid JSON: {source}; response: {raw}")]
    InvalidJson {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("model returned JSON that is not an object: {raw}")]
    NotAnObject { raw: String },
}

impl ExtractionError {
    fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Request { .. } => true,
            ExtractionError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Turns document text into a raw key → value mapping.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<RawExtraction, ExtractionError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    format: &'static str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

pub struct OllamaExtractor {
    client: reqwest::Client,
    config: ModelConfig,
}

impl OllamaExtractor {
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.url.trim_end_matches('/'))
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, ExtractionError> {
        let url = self.endpoint();
        let request = GenerateRequest {
            model: &self.config.name,
            prompt,
            format: "json",
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|source| ExtractionError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ExtractionError::Request { url, source })?;

        if !status.is_success() {
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Extractor for OllamaExtractor {
    async fn extract(&self, text: &str) -> Result<RawExtraction, ExtractionError> {
        let prompt = build_prompt(text, self.config.max_input_chars);

        let mut attempt = 0;
        let body = loop {
            match self.generate_once(&prompt).await {
                Ok(body) => break body,
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_secs(1 << attempt.min(5));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        ?delay,
                        error = %e,
                        "model request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        parse_generate_body(&body)
    }
}

/// Build the extraction prompt, keeping at most `max_chars` characters of text.
pub fn build_prompt(document_text: &str, max_chars: usize) -> String {
    let text = truncate_chars(document_text, max_chars);
    let keys = EXTRACTION_KEYS
        .iter()
        .map(|k| format!("\"{}\"", k))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You extract structured data from documents. Read the document text below and fill in the requested fields.\n\
         Respond with exactly one valid JSON object and nothing else: no explanation, no markdown, no text before or after it.\n\
         \n\
         The object must have exactly these keys: {keys}.\n\
         \n\
         - \"deliverables\", \"therapeutic_areas\", \"ingredient_categories\", \"ingredients\" and \"demographics\" are JSON arrays of strings.\n\
         - Every other key is a single JSON string.\n\
         - If the document does not state a value, use JSON null for that key.\n\
         \n\
         Document text:\n\
         ---\n\
         {text}\n\
         ---\n\
         \n\
         JSON output:\n"
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Decode the `/api/generate` envelope and the JSON object inside it.
pub fn parse_generate_body(body: &str) -> Result<RawExtraction, ExtractionError> {
    let envelope: GenerateResponse =
        serde_json::from_str(body).map_err(|_| ExtractionError::MissingResponse {
            raw: body.to_string(),
        })?;
    let inner = envelope
        .response
        .ok_or_else(|| ExtractionError::MissingResponse {
            raw: body.to_string(),
        })?;
    parse_model_json(&inner)
}

/// Parse the model's text answer; anything but a JSON object is rejected.
pub fn parse_model_json(raw: &str) -> Result<RawExtraction, ExtractionError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|source| ExtractionError::InvalidJson {
            raw: raw.to_string(),
            source,
        })?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(ExtractionError::NotAnObject {
            raw: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_key_and_fences_text() {
        let prompt = build_prompt("Study P-100 sponsored by Acme.", 8000);
        for key in EXTRACTION_KEYS {
            assert!(prompt.contains(&format!("\"{}\"", key)), "missing {}", key);
        }
        assert!(prompt.contains("---\nStudy P-100 sponsored by Acme.\n---"));
        assert!(prompt.contains("exactly one valid JSON object"));
    }

    #[test]
    fn prompt_truncates_on_char_boundary() {
        let text = "é".repeat(10);
        let prompt = build_prompt(&text, 4);
        assert!(prompt.contains("---\néééé\n---"));
        assert!(!prompt.contains("ééééé"));
    }

    #[test]
    fn short_text_is_not_truncated() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn envelope_with_object_parses() {
        let body = r#"{"model":"phi3","response":"{\"project_id\":\"P-1\",\"ingredients\":[\"A\"]}","done":true}"#;
        let map = parse_generate_body(body).unwrap();
        assert_eq!(map["project_id"], "P-1");
        assert_eq!(map["ingredients"][0], "A");
    }

    #[test]
    fn envelope_without_response_is_error() {
        let err = parse_generate_body(r#"{"done":true}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingResponse { .. }));

        let err = parse_generate_body("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ExtractionError::MissingResponse { .. }));
    }

    #[test]
    fn invalid_json_keeps_raw_text() {
        let err = parse_model_json("Sure! Here is the JSON: {").unwrap_err();
        match err {
            ExtractionError::InvalidJson { raw, .. } => {
                assert_eq!(raw, "Sure! Here is the JSON: {")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn non_object_json_is_rejected() {
        for raw in ["[1,2]", "\"text\"", "null", "42"] {
            let err = parse_model_json(raw).unwrap_err();
            assert!(matches!(err, ExtractionError::NotAnObject { .. }), "{}", raw);
        }
    }

    #[test]
    fn empty_object_is_accepted() {
        assert!(parse_model_json("{}").unwrap().is_empty());
    }

    #[test]
    fn only_transport_and_server_errors_retry() {
        assert!(ExtractionError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(ExtractionError::Status {
            status: 429,
            body: String::new()
        }
        .is_retryable());
        assert!(!ExtractionError::Status {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(!ExtractionError::NotAnObject { raw: "[]".into() }.is_retryable());
    }
}
