//! Named tools exposed over HTTP for agent discovery and invocation.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌────────────┐ ┌────────────┐ ┌───────┐ │
//! │  │search_web  │ │verify_claim│ │quota_ │ │
//! │  │            │ │            │ │status │ │
//! │  └────────────┘ └────────────┘ └───────┘ │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!        GET /tools/list, POST /tools/{name}
//! ```
//!
//! Each tool runs against a [`ToolContext`] wrapping the shared
//! [`FactChecker`]. Parameters are checked against the schema's `required`
//! list by [`validate_params`] before [`Tool::execute`] is called.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::service::FactChecker;

/// A tool that agents can discover and call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name (`POST /tools/{name}`); lowercase with underscores.
    fn name(&self) -> &str;

    /// One-line description for discovery.
    fn description(&self) -> &str;

    /// Built-in tools are flagged `"builtin": true` in `GET /tools/list`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Execute with parameters that already passed [`validate_params`].
    ///
    /// The returned value is wrapped in `{ "result": ... }` by the server.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// What a tool can reach during execution.
#[derive(Clone)]
pub struct ToolContext {
    checker: Arc<FactChecker>,
}

impl ToolContext {
    pub fn new(checker: Arc<FactChecker>) -> Self {
        Self { checker }
    }

    pub fn checker(&self) -> &FactChecker {
        &self.checker
    }
}

/// Caller-supplied parameters are missing or malformed.
///
/// Tools return it through [`anyhow::Error`]; the server recovers it with
/// `downcast_ref` to answer 400 instead of 500.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ParamError(String);

impl ParamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Check that `params` is an object holding every `required` field.
pub fn validate_params(schema: &Value, params: &Value) -> Result<()> {
    let Some(object) = params.as_object() else {
        return Err(ParamError::new("parameters must be a JSON object").into());
    };

    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    for field in required {
        match object.get(field) {
            None | Some(Value::Null) => {
                return Err(ParamError::new(format!("missing required parameter: {}", field)).into());
            }
            _ => {}
        }
    }
    Ok(())
}

fn non_empty_str<'a>(params: &'a Value, field: &str) -> Result<&'a str> {
    match params[field].as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ParamError::new(format!("{} must be a non-empty string", field)).into()),
    }
}

// ============ Built-in Tools ============

/// Web search through the provider fallback chain.
pub struct SearchWebTool;

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web for evidence, falling back across providers by quota"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = non_empty_str(&params, "query")?;
        let outcome = ctx.checker().search_web(query).await;
        Ok(serde_json::to_value(outcome)?)
    }
}

/// Full four-stage verification of one statement.
pub struct VerifyClaimTool;

#[async_trait]
impl Tool for VerifyClaimTool {
    fn name(&self) -> &str {
        "verify_claim"
    }

    fn description(&self) -> &str {
        "Verify a claim through classification, retrieval, analysis, and verdict"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "statement": { "type": "string", "description": "Claim to verify" },
                "use_cache": { "type": "boolean", "default": true }
            },
            "required": ["statement"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let statement = non_empty_str(&params, "statement")?;
        let use_cache = params["use_cache"].as_bool().unwrap_or(true);
        let outcome = ctx.checker().check(statement, use_cache).await;
        Ok(serde_json::to_value(outcome)?)
    }
}

/// Per-provider search quota usage.
pub struct QuotaStatusTool;

#[async_trait]
impl Tool for QuotaStatusTool {
    fn name(&self) -> &str {
        "quota_status"
    }

    fn description(&self) -> &str {
        "Report search provider quota usage"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(json!({ "providers": ctx.checker().quota_status() }))
    }
}

// ============ Registry ============

/// Name→handler registry.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with `search_web`, `verify_claim`, and `quota_status`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchWebTool));
        registry.register(Box::new(VerifyClaimTool));
        registry.register(Box::new(QuotaStatusTool));
        registry
    }

    /// Register a tool. A later tool with a duplicate name is never found.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
