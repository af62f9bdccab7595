//! Core data models used throughout claimcheck.
//!
//! These types represent the claim verification record threaded through the
//! pipeline, the evidence it collects, and the per-item results of a batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Label recorded in [`ClaimRecord::method`] for pipeline-produced records.
pub const PIPELINE_METHOD: &str = "4-stage-pipeline";

/// Topic domain a claim is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Politics,
    Economics,
    Health,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Politics, Domain::Economics, Domain::Health];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Politics => "politics",
            Domain::Economics => "economics",
            Domain::Health => "health",
        }
    }

    /// Parse a single model token. Case and surrounding whitespace are ignored.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "politics" => Some(Domain::Politics),
            "economics" => Some(Domain::Economics),
            "health" => Some(Domain::Health),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    True,
    False,
    #[default]
    Insufficient,
    /// Only produced by the batch layer for items whose verification failed.
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::True => "true",
            Verdict::False => "false",
            Verdict::Insufficient => "insufficient",
            Verdict::Error => "error",
        }
    }

    /// Parse a verdict emitted by the model.
    ///
    /// `error` is not a value the model may choose, so it is rejected here.
    pub fn parse_model(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "true" => Some(Verdict::True),
            "false" => Some(Verdict::False),
            "insufficient" => Some(Verdict::Insufficient),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDoc {
    pub text: String,
    pub score: f64,
    pub source: String,
    #[serde(default)]
    pub date: String,
}

/// A single web search result, normalized across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub content: String,
    pub url: String,
}

/// The per-statement state threaded through the four pipeline stages.
///
/// Created by the pipeline at the start of a verification and owned by that
/// call alone. Each stage writes only its own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: Uuid,
    statement: String,
    pub domain: Domain,
    pub retrieved_docs: Vec<RetrievedDoc>,
    pub search_results: Vec<SearchHit>,
    /// Provider that supplied `search_results`, or `"none"`.
    pub search_source: String,
    pub analysis: String,
    pub verdict: Verdict,
    pub method: String,
    pub checked_at: DateTime<Utc>,
}

impl ClaimRecord {
    /// Create an empty record for `statement` with every derived field defaulted.
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            statement: statement.into(),
            domain: Domain::default(),
            retrieved_docs: Vec::new(),
            search_results: Vec::new(),
            search_source: "none".to_string(),
            analysis: String::new(),
            verdict: Verdict::default(),
            method: PIPELINE_METHOD.to_string(),
            checked_at: Utc::now(),
        }
    }

    /// The input statement. Immutable once the record exists.
    pub fn statement(&self) -> &str {
        &self.statement
    }
}

/// A batch item whose verification failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedClaim {
    pub statement: String,
    pub error: String,
    pub verdict: Verdict,
}

impl FailedClaim {
    pub fn new(statement: impl Into<String>, error: impl ToString) -> Self {
        Self {
            statement: statement.into(),
            error: error.to_string(),
            verdict: Verdict::Error,
        }
    }
}

/// One slot of a batch result, at the same index as its input statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Verified(ClaimRecord),
    Failed(FailedClaim),
}

impl BatchItem {
    pub fn statement(&self) -> &str {
        match self {
            BatchItem::Verified(record) => record.statement(),
            BatchItem::Failed(failed) => &failed.statement,
        }
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            BatchItem::Verified(record) => record.verdict,
            BatchItem::Failed(failed) => failed.verdict,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BatchItem::Failed(_))
    }
}
