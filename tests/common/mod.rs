//! In-memory providers shared by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use claimcheck::cache::ResultCache;
use claimcheck::config::{BatchConfig, ModelsConfig, PipelineConfig};
use claimcheck::error::VerifyError;
use claimcheck::llm::{ModelProvider, ModelResponse};
use claimcheck::models::{Domain, RetrievedDoc, SearchHit};
use claimcheck::pipeline::Pipeline;
use claimcheck::router::ModelRouter;
use claimcheck::search::{SearchProvider, SearchRouter};
use claimcheck::service::FactChecker;
use claimcheck::vector::VectorSearch;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers each stage's prompt with a fixed reply.
///
/// A `None` reply makes that stage's call fail.
pub struct StageModel {
    pub domain: Option<String>,
    pub analysis: Option<String>,
    pub verdict: Option<String>,
    pub calls: AtomicUsize,
}

impl StageModel {
    pub fn new(domain: &str, analysis: &str, verdict: &str) -> Arc<Self> {
        Arc::new(Self {
            domain: Some(domain.to_string()),
            analysis: Some(analysis.to_string()),
            verdict: Some(verdict.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for StageModel {
    fn name(&self) -> &str {
        "stage-model"
    }

    async fn generate(&self, model_id: &str, prompt: &str) -> Result<ModelResponse, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = if prompt.contains("classification agent") {
            &self.domain
        } else if prompt.contains("fact analysis agent") {
            &self.analysis
        } else {
            &self.verdict
        };
        match reply {
            Some(text) => Ok(ModelResponse::from_text(text.clone())),
            None => Err(VerifyError::TransientCallFailure {
                provider: model_id.to_string(),
                message: "scripted failure".to_string(),
            }),
        }
    }
}

/// Search provider with fixed hits, optionally unconfigured or failing.
pub struct StaticSearch {
    pub name: &'static str,
    pub hits: Vec<SearchHit>,
    pub configured: bool,
    pub fail: bool,
}

impl StaticSearch {
    pub fn ok(name: &'static str, hits: Vec<SearchHit>) -> Box<Self> {
        Box::new(Self {
            name,
            hits,
            configured: true,
            fail: false,
        })
    }

    pub fn unconfigured(name: &'static str) -> Box<Self> {
        Box::new(Self {
            name,
            hits: Vec::new(),
            configured: false,
            fail: false,
        })
    }

    pub fn failing(name: &'static str) -> Box<Self> {
        Box::new(Self {
            name,
            hits: Vec::new(),
            configured: true,
            fail: true,
        })
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        self.name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, VerifyError> {
        if self.fail {
            return Err(VerifyError::TransientCallFailure {
                provider: self.name.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self.hits.clone())
    }
}

pub struct StaticIndex(pub Vec<RetrievedDoc>);

#[async_trait]
impl VectorSearch for StaticIndex {
    async fn query(&self, _text: &str, _domain: Domain, limit: usize) -> Result<Vec<RetrievedDoc>> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }
}

pub struct FailingIndex;

#[async_trait]
impl VectorSearch for FailingIndex {
    async fn query(&self, _text: &str, _domain: Domain, _limit: usize) -> Result<Vec<RetrievedDoc>> {
        anyhow::bail!("qdrant unreachable")
    }
}

pub fn hit(title: &str, content: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        content: content.to_string(),
        url: format!("https://news.lk/{}", title),
    }
}

pub fn doc(text: &str) -> RetrievedDoc {
    RetrievedDoc {
        text: text.to_string(),
        score: 0.8,
        source: "cbsl".to_string(),
        date: "2024-01-01".to_string(),
    }
}

/// Generous tier caps so tests never hit the degradation path by accident.
pub fn models_config() -> ModelsConfig {
    ModelsConfig {
        throughput_model: "flash".to_string(),
        quality_model: "pro".to_string(),
        reasoning_model: "thinking".to_string(),
        throughput_rpm: 100,
        quality_rpm: 100,
        reasoning_rpm: 100,
        ..ModelsConfig::default()
    }
}

pub fn pipeline(
    model: Arc<dyn ModelProvider>,
    search: SearchRouter,
    index: Arc<dyn VectorSearch>,
) -> Pipeline {
    Pipeline::new(
        Arc::new(ModelRouter::from_config(&models_config(), model)),
        Arc::new(search),
        index,
        PipelineConfig::default(),
    )
}

pub fn checker(
    model: Arc<dyn ModelProvider>,
    search: SearchRouter,
    index: Arc<dyn VectorSearch>,
) -> FactChecker {
    FactChecker::new(
        pipeline(model, search, index),
        ResultCache::new(Duration::from_secs(3600)),
        BatchConfig::default(),
    )
}

/// A checker whose every stage succeeds with web and index evidence.
pub fn healthy_checker(model: Arc<StageModel>) -> FactChecker {
    let mut search = SearchRouter::new();
    search.register(
        StaticSearch::ok("tavily", vec![hit("growth", "GDP grew 5% in 2024")]),
        Some(1000),
    );
    checker(model, search, Arc::new(StaticIndex(vec![doc("Central bank reports growth")])))
}
