//! JSON HTTP API.
//!
//! Exposes the [`FactChecker`] and the [`ToolRegistry`] over HTTP.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/verify` | Verify one statement |
//! | `POST` | `/verify/batch` | Verify many statements (`parallel` or `rate_limited`) |
//! | `GET`  | `/stats` | Cache size, search quota, model window usage |
//! | `POST` | `/cache/sweep` | Drop expired cache entries |
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "statement must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `tool_error` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::service::{BatchEntry, BatchMode, CheckOutcome, FactChecker, ServiceStats};
use crate::tools::{validate_params, ParamError, ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    checker: Arc<FactChecker>,
    tools: Arc<ToolRegistry>,
}

/// Starts the HTTP server on `[server].bind` with the built-in tools.
///
/// Runs until the process is terminated.
///
/// # Errors
///
/// Fails if the pipeline cannot be built or the address cannot be bound.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let checker = Arc::new(FactChecker::from_config(config)?);
    run_server_with_checker(&config.server.bind, checker, ToolRegistry::with_builtins()).await
}

/// Starts the HTTP server over an already-built checker and tool registry.
pub async fn run_server_with_checker(
    bind_addr: &str,
    checker: Arc<FactChecker>,
    tools: ToolRegistry,
) -> anyhow::Result<()> {
    for t in tools.tools() {
        tracing::debug!(tool = t.name(), builtin = t.is_builtin(), "registered tool");
    }

    let app = build_app(checker, tools);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("claimcheck server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The routed application, without a listener.
pub fn build_app(checker: Arc<FactChecker>, tools: ToolRegistry) -> Router {
    let state = AppState {
        checker,
        tools: Arc::new(tools),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/verify", post(handle_verify))
        .route("/verify/batch", post(handle_verify_batch))
        .route("/stats", get(handle_stats))
        .route("/cache/sweep", post(handle_cache_sweep))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

/// [`ParamError`]s are the caller's fault; everything else is a 500.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let message = format!("{}: {}", tool_name, err);
    if err.downcast_ref::<ParamError>().is_some() {
        bad_request(message)
    } else {
        tool_error(message)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /verify ============

fn default_use_cache() -> bool {
    true
}

#[derive(Deserialize)]
struct VerifyRequest {
    statement: String,
    #[serde(default = "default_use_cache")]
    use_cache: bool,
}

async fn handle_verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<CheckOutcome>, AppError> {
    if req.statement.trim().is_empty() {
        return Err(bad_request("statement must not be empty"));
    }
    Ok(Json(state.checker.check(&req.statement, req.use_cache).await))
}

// ============ POST /verify/batch ============

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum ModeParam {
    #[default]
    Parallel,
    RateLimited,
}

#[derive(Deserialize)]
struct BatchRequest {
    statements: Vec<String>,
    #[serde(default)]
    mode: ModeParam,
    max_concurrent: Option<usize>,
    rate_per_second: Option<f64>,
}

#[derive(Serialize)]
struct BatchResponse {
    results: Vec<BatchEntry>,
}

/// Verify a list of statements. Output order matches input order.
///
/// `max_concurrent` and `rate_per_second` default to `[batch]` config.
async fn handle_verify_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    if let Some(i) = req.statements.iter().position(|s| s.trim().is_empty()) {
        return Err(bad_request(format!("statement {} must not be empty", i)));
    }

    let settings = state.checker.batch_settings();
    let mode = match req.mode {
        ModeParam::Parallel => {
            let max_concurrent = req.max_concurrent.unwrap_or(settings.max_concurrent);
            if max_concurrent == 0 {
                return Err(bad_request("max_concurrent must be greater than zero"));
            }
            BatchMode::Parallel { max_concurrent }
        }
        ModeParam::RateLimited => BatchMode::RateLimited {
            rate_per_second: req.rate_per_second.unwrap_or(settings.rate_per_second),
        },
    };

    let results = state
        .checker
        .check_batch(&req.statements, mode)
        .await
        .map_err(|e| bad_request(e.to_string()))?;

    Ok(Json(BatchResponse { results }))
}

// ============ GET /stats, POST /cache/sweep ============

async fn handle_stats(State(state): State<AppState>) -> Json<ServiceStats> {
    Json(state.checker.stats())
}

#[derive(Serialize)]
struct SweepResponse {
    removed: usize,
}

async fn handle_cache_sweep(State(state): State<AppState>) -> Json<SweepResponse> {
    Json(SweepResponse {
        removed: state.checker.sweep_cache(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    builtin: bool,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            builtin: t.is_builtin(),
            parameters: t.parameters_schema(),
        })
        .collect();

    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Look up the tool, validate parameters, and execute it.
///
/// Returns `404` for an unknown tool, `400` for parameter errors, and
/// `500` for execution errors.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    validate_params(&tool.parameters_schema(), &params).map_err(|e| bad_request(e.to_string()))?;

    let ctx = ToolContext::new(state.checker.clone());
    let result = tool
        .execute(params, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
