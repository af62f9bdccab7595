//! Generative model provider abstraction.
//!
//! Defines the [`ModelProvider`] capability consumed by the
//! [`ModelRouter`](crate::router::ModelRouter) and the concrete
//! [`GeminiProvider`] that calls the Gemini `generateContent` REST endpoint.
//!
//! # Response Shape
//!
//! Providers return a typed [`ModelResponse`] carrying the extracted text
//! (if any) and the raw JSON payload. A response that produced no text is
//! represented as `text: None` rather than an error, so callers decide how
//! to treat it.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{env_credential, ModelsConfig};
use crate::error::VerifyError;

/// Text produced by a model call together with the raw provider payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    /// Concatenated text parts, or `None` when the model produced no text.
    pub text: Option<String>,
    /// The provider's raw JSON response.
    pub raw: serde_json::Value,
}

impl ModelResponse {
    /// Build a response from plain text with no raw payload.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            raw: serde_json::Value::Null,
        }
    }

    /// Text if present and non-blank.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// A backend capable of generating text from a prompt.
///
/// Implementations must surface every upstream failure as a
/// [`VerifyError`] so the router and pipeline stages can absorb it.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider identifier used in logs and errors (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Generate a completion for `prompt` using the model `model_id`.
    async fn generate(&self, model_id: &str, prompt: &str) -> Result<ModelResponse, VerifyError>;
}

// ============ Gemini Provider ============

/// Model provider backed by the Gemini REST API.
///
/// Calls `POST {base_url}/{model}:generateContent` with the API key read
/// from the environment variable named by `models.api_key_env`.
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Configuration`] if the API key environment
    /// variable is not set, or if the HTTP client cannot be built.
    pub fn new(config: &ModelsConfig) -> Result<Self, VerifyError> {
        let api_key = env_credential(&config.api_key_env).ok_or_else(|| {
            VerifyError::Configuration(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit API key.
    pub fn with_api_key(config: &ModelsConfig, api_key: String) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VerifyError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, model_id: &str, prompt: &str) -> Result<ModelResponse, VerifyError> {
        let url = format!("{}/{}:generateContent", self.base_url, model_id);
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| VerifyError::malformed(model_id, e))?;
                        return parse_gemini_response(model_id, json);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(VerifyError::transient(
                            model_id,
                            format!("Gemini API error {}: {}", status, body_text),
                        ));
                        continue;
                    }

                    // Client error (not 429): fail now
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(VerifyError::transient(
                        model_id,
                        format!("Gemini API error {}: {}", status, body_text),
                    ));
                }
                Err(e) => {
                    last_err = Some(VerifyError::transient(model_id, e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| VerifyError::transient(model_id, "generation failed after retries")))
    }
}

/// Parse a Gemini `generateContent` response.
///
/// Joins the `text` of every part of the first candidate. A payload with
/// an `error` object is malformed; a candidate with no text parts yields
/// `text: None`.
pub(crate) fn parse_gemini_response(
    model_id: &str,
    json: serde_json::Value,
) -> Result<ModelResponse, VerifyError> {
    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(VerifyError::malformed(model_id, message));
    }

    let parts = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array());

    let text = parts.and_then(|parts| {
        let joined: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    });

    Ok(ModelResponse { text, raw: json })
}
