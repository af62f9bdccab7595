//! Vector index abstraction.
//!
//! Defines the [`VectorSearch`] capability used by the retrieve stage and two
//! implementations:
//! - **[`DisabledIndex`]**: returns no documents; used when no index is configured.
//! - **[`QdrantIndex`]**: embeds the query through Ollama's `/api/embed`
//!   and runs a filtered `points/search` against a Qdrant collection named
//!   `<prefix>_<domain>`.
//!
//! Use [`create_index`] to build the index selected by `[vector].provider`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::VectorConfig;
use crate::models::{Domain, RetrievedDoc};

/// Similarity search over previously indexed documents.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `limit` documents for `text` within `domain`, best first.
    async fn query(&self, text: &str, domain: Domain, limit: usize) -> Result<Vec<RetrievedDoc>>;
}

// ============ Disabled Index ============

/// An index with no documents.
pub struct DisabledIndex;

#[async_trait]
impl VectorSearch for DisabledIndex {
    async fn query(&self, _text: &str, _domain: Domain, _limit: usize) -> Result<Vec<RetrievedDoc>> {
        Ok(Vec::new())
    }
}

// ============ Qdrant Index ============

/// Qdrant collections queried over REST, with Ollama query embeddings.
pub struct QdrantIndex {
    url: String,
    collection_prefix: String,
    embed_url: String,
    embed_model: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl QdrantIndex {
    /// Create a Qdrant index from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` or `embed_model` is not set.
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector.url required for Qdrant index"))?;
        let embed_model = config
            .embed_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector.embed_model required for Qdrant index"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            collection_prefix: config.collection_prefix.clone(),
            embed_url: config.embed_url.trim_end_matches('/').to_string(),
            embed_model,
            max_retries: config.max_retries,
            client,
        })
    }

    fn collection(&self, domain: Domain) -> String {
        format!("{}_{}", self.collection_prefix, domain)
    }

    /// Embed `text` via Ollama with retry/backoff.
    ///
    /// Retry strategy:
    /// - HTTP 429 or 5xx → retry with exponential backoff
    /// - HTTP 4xx (not 429) → fail immediately
    /// - Network error → retry
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/embed", self.embed_url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embed_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Ollama API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.embed_url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding failed after retries")))
    }
}

#[async_trait]
impl VectorSearch for QdrantIndex {
    async fn query(&self, text: &str, domain: Domain, limit: usize) -> Result<Vec<RetrievedDoc>> {
        let vector = self.embed(text).await?;

        let body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "filter": {
                "must": [{ "key": "domain", "match": { "value": domain.as_str() } }]
            }
        });

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.url,
                self.collection(domain)
            ))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Qdrant API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_qdrant_response(&json)
    }
}

fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    Ok(first
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Parse Qdrant `points/search` hits; order is preserved (best first).
fn parse_qdrant_response(json: &serde_json::Value) -> Result<Vec<RetrievedDoc>> {
    let hits = json
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant response: missing result array"))?;

    let payload_str = |hit: &serde_json::Value, key: &str| -> String {
        hit.get("payload")
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Ok(hits
        .iter()
        .map(|hit| RetrievedDoc {
            text: payload_str(hit, "text"),
            score: hit.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0),
            source: payload_str(hit, "source"),
            date: payload_str(hit, "date"),
        })
        .filter(|doc| !doc.text.is_empty())
        .collect())
}

/// Create the [`VectorSearch`] selected by configuration.
///
/// | Config Value | Index |
/// |-------------|-------|
/// | `"disabled"` | [`DisabledIndex`] |
/// | `"qdrant"` | [`QdrantIndex`] |
pub fn create_index(config: &VectorConfig) -> Result<Box<dyn VectorSearch>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledIndex)),
        "qdrant" => Ok(Box::new(QdrantIndex::new(config)?)),
        other => bail!("Unknown vector provider: {}", other),
    }
}
