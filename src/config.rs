use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_model_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default = "default_throughput_model")]
    pub throughput_model: String,
    #[serde(default = "default_quality_model")]
    pub quality_model: String,
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,
    #[serde(default = "default_throughput_rpm")]
    pub throughput_rpm: usize,
    #[serde(default = "default_quality_rpm")]
    pub quality_rpm: usize,
    #[serde(default = "default_reasoning_rpm")]
    pub reasoning_rpm: usize,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_model_max_retries")]
    pub max_retries: u32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_model_key_env(),
            base_url: default_model_base_url(),
            throughput_model: default_throughput_model(),
            quality_model: default_quality_model(),
            reasoning_model: default_reasoning_model(),
            throughput_rpm: default_throughput_rpm(),
            quality_rpm: default_quality_rpm(),
            reasoning_rpm: default_reasoning_rpm(),
            timeout_secs: default_model_timeout_secs(),
            max_retries: default_model_max_retries(),
        }
    }
}

fn default_model_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_model_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_throughput_model() -> String {
    "models/gemini-2.0-flash".to_string()
}
fn default_quality_model() -> String {
    "models/gemini-pro-latest".to_string()
}
fn default_reasoning_model() -> String {
    "models/gemini-2.0-flash-thinking-exp-01-21".to_string()
}
fn default_throughput_rpm() -> usize {
    15
}
fn default_quality_rpm() -> usize {
    2
}
fn default_reasoning_rpm() -> usize {
    10
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_model_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_tavily_key_env")]
    pub tavily_api_key_env: String,
    #[serde(default = "default_brave_key_env")]
    pub brave_api_key_env: String,
    #[serde(default = "default_tavily_limit")]
    pub tavily_limit: u64,
    #[serde(default = "default_brave_limit")]
    pub brave_limit: u64,
    #[serde(default = "default_query_suffix")]
    pub query_suffix: String,
    #[serde(default = "default_recommended_domains")]
    pub recommended_domains: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key_env: default_tavily_key_env(),
            brave_api_key_env: default_brave_key_env(),
            tavily_limit: default_tavily_limit(),
            brave_limit: default_brave_limit(),
            query_suffix: default_query_suffix(),
            recommended_domains: default_recommended_domains(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_tavily_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}
fn default_brave_key_env() -> String {
    "BRAVE_API_KEY".to_string()
}
fn default_tavily_limit() -> u64 {
    1000
}
fn default_brave_limit() -> u64 {
    2000
}
fn default_query_suffix() -> String {
    " Sri Lanka".to_string()
}
fn default_recommended_domains() -> Vec<String> {
    vec![
        "bbc.com".to_string(),
        "wikipedia.org".to_string(),
        "news.lk".to_string(),
        "lankabusinessonline.com".to_string(),
    ]
}
fn default_max_results() -> usize {
    10
}
fn default_search_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
    #[serde(default = "default_embed_url")]
    pub embed_url: String,
    #[serde(default)]
    pub embed_model: Option<String>,
    #[serde(default = "default_vector_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_vector_max_retries")]
    pub max_retries: u32,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            url: None,
            collection_prefix: default_collection_prefix(),
            embed_url: default_embed_url(),
            embed_model: None,
            timeout_secs: default_vector_timeout_secs(),
            max_retries: default_vector_max_retries(),
        }
    }
}

impl VectorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_vector_provider() -> String {
    "disabled".to_string()
}
fn default_collection_prefix() -> String {
    "sinhala".to_string()
}
fn default_embed_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_vector_timeout_secs() -> u64 {
    30
}
fn default_vector_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> u64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            rate_per_second: default_rate_per_second(),
        }
    }
}

fn default_max_concurrent() -> usize {
    10
}
fn default_rate_per_second() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Natural language the analysis and explanations are written in.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_evidence_limit")]
    pub evidence_limit: usize,
    #[serde(default = "default_evidence_max_chars")]
    pub evidence_max_chars: usize,
    #[serde(default = "default_vector_limit")]
    pub vector_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            evidence_limit: default_evidence_limit(),
            evidence_max_chars: default_evidence_max_chars(),
            vector_limit: default_vector_limit(),
        }
    }
}

fn default_language() -> String {
    "Sinhala".to_string()
}
fn default_evidence_limit() -> usize {
    5
}
fn default_evidence_max_chars() -> usize {
    4000
}
fn default_vector_limit() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// All-defaults configuration, used when no config file is available.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Read an optional credential from the environment. Empty values count as unset.
pub fn env_credential(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate model tiers
    let models = &config.models;
    if models.throughput_rpm == 0 || models.quality_rpm == 0 || models.reasoning_rpm == 0 {
        anyhow::bail!("models.*_rpm must be > 0");
    }
    if models.api_key_env.trim().is_empty() {
        anyhow::bail!("models.api_key_env must not be empty");
    }

    // Validate batch
    if config.batch.max_concurrent == 0 {
        anyhow::bail!("batch.max_concurrent must be > 0");
    }
    if !(config.batch.rate_per_second > 0.0 && config.batch.rate_per_second.is_finite()) {
        anyhow::bail!("batch.rate_per_second must be a positive number");
    }

    // Validate pipeline
    if config.pipeline.evidence_limit == 0 {
        anyhow::bail!("pipeline.evidence_limit must be >= 1");
    }

    // Validate vector index
    match config.vector.provider.as_str() {
        "disabled" => {}
        "qdrant" => {
            if config.vector.url.is_none() {
                anyhow::bail!("vector.url must be specified when provider is 'qdrant'");
            }
            if config.vector.embed_model.is_none() {
                anyhow::bail!("vector.embed_model must be specified when provider is 'qdrant'");
            }
        }
        other => anyhow::bail!(
            "Unknown vector provider: '{}'. Must be disabled or qdrant.",
            other
        ),
    }

    Ok(())
}
