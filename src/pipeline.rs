//! The four-stage claim verification pipeline.
//!
//! A verification is a fixed, strictly sequential walk over [`Stage`]s, each
//! mutating its own fields of the [`ClaimRecord`]:
//!
//! ```text
//! Classify ──▶ Retrieve ──▶ Analyze ──▶ Verdict ──▶ Done
//!  domain      retrieved_docs  analysis    verdict
//!              search_results              (+ explanation appended
//!              search_source                to analysis)
//! ```
//!
//! Stages call the [`ModelRouter`], the [`SearchRouter`], and the external
//! [`VectorSearch`]. Every upstream failure is absorbed inside the stage
//! that issued the call and replaced by that stage's default, so
//! [`Pipeline::run`] always returns a well-typed record.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::batch::ClaimVerifier;
use crate::config::{Config, PipelineConfig};
use crate::error::VerifyError;
use crate::llm::GeminiProvider;
use crate::models::{ClaimRecord, Domain, Verdict};
use crate::router::{ModelRouter, RoutedResponse};
use crate::search::SearchRouter;
use crate::vector::{create_index, VectorSearch};

/// Evidence placeholder used when neither source returned anything.
pub const NO_EVIDENCE: &str = "No evidence found.";

// Negative markers are matched (and blanked out) first because the Sinhala
// negative "අසත්‍ය" contains the positive "සත්‍ය", and "untrue" contains "true".
const NEGATIVE_MARKERS: &[&str] = &["අසත්‍ය", "untrue", "false"];
const POSITIVE_MARKERS: &[&str] = &["සත්‍ය", "true"];

/// Pipeline position. Transitions are unconditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Retrieve,
    Analyze,
    Verdict,
    Done,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::Classify => Stage::Retrieve,
            Stage::Retrieve => Stage::Analyze,
            Stage::Analyze => Stage::Verdict,
            Stage::Verdict | Stage::Done => Stage::Done,
        }
    }
}

/// Orchestrates the four stages over shared routers and the vector index.
pub struct Pipeline {
    router: Arc<ModelRouter>,
    search: Arc<SearchRouter>,
    index: Arc<dyn VectorSearch>,
    settings: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        router: Arc<ModelRouter>,
        search: Arc<SearchRouter>,
        index: Arc<dyn VectorSearch>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            router,
            search,
            index,
            settings,
        }
    }

    /// Build the production pipeline: Gemini models, the configured search
    /// chain, and the configured vector index.
    ///
    /// # Errors
    ///
    /// Fails if the model API key is missing or an HTTP client cannot be
    /// built. This is the only place a verification setup error surfaces.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = Arc::new(GeminiProvider::new(&config.models)?);
        let router = ModelRouter::from_config(&config.models, provider);
        let search = SearchRouter::from_config(&config.search)?;
        let index: Arc<dyn VectorSearch> = Arc::from(create_index(&config.vector)?);

        Ok(Self::new(
            Arc::new(router),
            Arc::new(search),
            index,
            config.pipeline.clone(),
        ))
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn search(&self) -> &SearchRouter {
        &self.search
    }

    /// Verify `statement`, returning the fully populated record.
    pub async fn run(&self, statement: &str) -> ClaimRecord {
        let mut record = ClaimRecord::new(statement);
        let mut stage = Stage::Classify;

        while stage != Stage::Done {
            tracing::debug!(record = %record.id, ?stage, "running stage");
            match stage {
                Stage::Classify => self.classify(&mut record).await,
                Stage::Retrieve => self.retrieve(&mut record).await,
                Stage::Analyze => self.analyze(&mut record).await,
                Stage::Verdict => self.decide(&mut record).await,
                Stage::Done => {}
            }
            stage = stage.next();
        }

        record.checked_at = Utc::now();
        tracing::info!(
            record = %record.id,
            domain = %record.domain,
            verdict = %record.verdict,
            source = %record.search_source,
            "claim verified"
        );
        record
    }

    // ============ Classify ============

    async fn classify(&self, record: &mut ClaimRecord) {
        let prompt = classify_prompt(record.statement(), &self.settings.language);

        record.domain = match self.router.route("classify", &prompt).await {
            Ok(routed) => {
                note_fallback("classify", &routed);
                routed
                    .response
                    .text()
                    .and_then(parse_domain)
                    .unwrap_or_default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "classification failed; defaulting domain");
                Domain::default()
            }
        };
    }

    // ============ Retrieve ============

    async fn retrieve(&self, record: &mut ClaimRecord) {
        record.retrieved_docs = match self
            .index
            .query(record.statement(), record.domain, self.settings.vector_limit)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "vector search failed; continuing without documents");
                Vec::new()
            }
        };

        let outcome = self.search.search(record.statement()).await;
        record.search_results = outcome.results;
        record.search_source = outcome.source;
    }

    // ============ Analyze ============

    async fn analyze(&self, record: &mut ClaimRecord) {
        let evidence = evidence_block(
            record,
            self.settings.evidence_limit,
            self.settings.evidence_max_chars,
        );
        let prompt = analysis_prompt(record.statement(), &evidence, &self.settings.language);

        record.analysis = match self.router.route("analyze", &prompt).await {
            Ok(routed) => {
                note_fallback("analyze", &routed);
                match routed.response.text() {
                    Some(text) => text.to_string(),
                    None => "Analysis failed: the model returned no text.".to_string(),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "analysis failed");
                format!("Analysis failed: {}", e)
            }
        };
    }

    // ============ Verdict ============

    async fn decide(&self, record: &mut ClaimRecord) {
        let prompt = verdict_prompt(record.statement(), &record.analysis, &self.settings.language);

        let parsed = match self.router.route("decide", &prompt).await {
            Ok(routed) => {
                note_fallback("decide", &routed);
                match routed.response.text() {
                    Some(text) => parse_verdict(&routed.model, text),
                    None => Err(VerifyError::malformed(&routed.model, "no text in verdict response")),
                }
            }
            Err(e) => Err(e),
        };

        match parsed {
            Ok((verdict, explanation)) => {
                record.verdict = verdict;
                record.analysis = format!(
                    "{}\n\n**Verdict explanation:**\n{}",
                    record.analysis, explanation
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "verdict synthesis failed; using keyword heuristic");
                record.verdict = heuristic_verdict(&record.analysis);
            }
        }
    }
}

fn note_fallback(stage: &str, routed: &RoutedResponse) {
    if routed.degraded {
        tracing::info!(stage, model = %routed.model, tier = ?routed.tier, "served by fallback tier");
    }
}

#[async_trait]
impl ClaimVerifier for Pipeline {
    async fn verify(&self, statement: &str) -> Result<ClaimRecord> {
        Ok(self.run(statement).await)
    }
}

// ============ Prompts ============

fn classify_prompt(statement: &str, language: &str) -> String {
    format!(
        "You are an expert classification agent.\n\
         Classify this {language} statement into ONE domain: politics, economics, or health.\n\n\
         Statement: {statement}\n\n\
         Respond with ONLY the domain name in English (politics/economics/health).\n\
         If uncertain, default to politics."
    )
}

fn analysis_prompt(statement: &str, evidence: &str, language: &str) -> String {
    format!(
        "You are an expert fact analysis agent. Analyze the following {language} statement \
         against the provided evidence.\n\n\
         Statement: {statement}\n\n\
         Evidence:\n{evidence}\n\n\
         Task:\n\
         1. Compare the statement with the evidence.\n\
         2. Identify supporting facts and contradictions.\n\
         3. Assess the credibility of the evidence.\n\
         4. Provide a detailed analysis in {language}.\n\n\
         Output ONLY the analysis in {language}."
    )
}

fn verdict_prompt(statement: &str, analysis: &str, language: &str) -> String {
    format!(
        "You are the final verdict agent. Based on the analysis provided, determine if the \
         statement is true, false, or if there is insufficient information.\n\n\
         Statement: {statement}\n\
         Analysis: {analysis}\n\n\
         Respond with ONLY a JSON object in the following format:\n\
         {{\n  \"verdict\": \"true\" | \"false\" | \"insufficient\",\n  \
         \"explanation\": \"A clear, concise explanation in {language} justifying the verdict.\"\n}}"
    )
}

// ============ Parsing ============

/// Interpret a classification reply as a single domain token.
fn parse_domain(text: &str) -> Option<Domain> {
    let token = text.trim().trim_matches(|c: char| !c.is_alphanumeric());
    Domain::parse(token)
}

/// Numbered evidence lines, web results first, truncated to `max_chars`.
///
/// Returns [`NO_EVIDENCE`] when both sources are empty.
pub fn evidence_block(record: &ClaimRecord, limit: usize, max_chars: usize) -> String {
    let web = record
        .search_results
        .iter()
        .map(|hit| (hit.content.as_str(), hit.url.as_str()));
    let docs = record
        .retrieved_docs
        .iter()
        .map(|doc| (doc.text.as_str(), ""));

    let text = web
        .chain(docs)
        .take(limit)
        .enumerate()
        .map(|(i, (text, url))| {
            let url = if url.is_empty() { "N/A" } else { url };
            format!("Source {}: {} (URL: {})", i + 1, text, url)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.is_empty() {
        return NO_EVIDENCE.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Remove markdown code fences around a JSON reply.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Parse a `{verdict, explanation}` reply.
///
/// A missing or unknown verdict value becomes [`Verdict::Insufficient`];
/// anything that is not a JSON object is malformed.
fn parse_verdict(model: &str, text: &str) -> Result<(Verdict, String), VerifyError> {
    let json: serde_json::Value = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| VerifyError::malformed(model, e))?;

    if !json.is_object() {
        return Err(VerifyError::malformed(model, "verdict reply is not a JSON object"));
    }

    let verdict = json
        .get("verdict")
        .and_then(|v| v.as_str())
        .and_then(Verdict::parse_model)
        .unwrap_or(Verdict::Insufficient);
    let explanation = json
        .get("explanation")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok((verdict, explanation))
}

/// Keyword fallback when no structured verdict is available.
///
/// A positive marker wins over a negative one; neither gives insufficient.
pub fn heuristic_verdict(analysis: &str) -> Verdict {
    let mut remainder = analysis.to_lowercase();
    let mut negative = false;
    for marker in NEGATIVE_MARKERS {
        if remainder.contains(marker) {
            negative = true;
            remainder = remainder.replace(marker, " ");
        }
    }
    let positive = POSITIVE_MARKERS.iter().any(|m| remainder.contains(m));

    if positive {
        Verdict::True
    } else if negative {
        Verdict::False
    } else {
        Verdict::Insufficient
    }
}
