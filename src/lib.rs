//! # claimcheck
//!
//! Staged verification of natural-language claims.
//!
//! A statement is classified into a domain, evidence is gathered from a
//! vector index and from live web search, a model analyzes the statement
//! against that evidence, and a reasoning model returns a structured
//! verdict. Every upstream call can fail or be rate limited; the pipeline
//! degrades to defined defaults instead of failing.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────────────────────────────────────┐
//!  statement ───▶ │ Pipeline                                   │ ───▶ ClaimRecord
//!                 │ Classify ─▶ Retrieve ─▶ Analyze ─▶ Verdict │
//!                 └─────┬───────────┬────────────────┬─────────┘
//!                       ▼           ▼                ▼
//!                 ┌───────────┐ ┌──────────────┐ ┌────────────┐
//!                 │ModelRouter│ │ SearchRouter │ │VectorSearch│
//!                 │ 3 tiers   │ │Tavily/Brave/ │ │ Qdrant or  │
//!                 │ rpm caps  │ │ DuckDuckGo   │ │ disabled   │
//!                 └───────────┘ └──────────────┘ └────────────┘
//!
//!   FactChecker = Pipeline + ResultCache + BatchRunner ──▶ CLI / HTTP / tools
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Provider and configuration failure taxonomy |
//! | [`models`] | Core data types |
//! | [`llm`] | Model provider abstraction and Gemini client |
//! | [`router`] | Tiered model routing with sliding-window rate limits |
//! | [`search`] | Web search providers and quota-aware fallback |
//! | [`vector`] | Vector index abstraction |
//! | [`pipeline`] | Four-stage verification pipeline |
//! | [`cache`] | TTL result cache |
//! | [`batch`] | Bounded-parallel and rate-limited batch runs |
//! | [`service`] | Cache-aware checking façade |
//! | [`tools`] | Tool registry for agent integration |
//! | [`server`] | HTTP API |

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod router;
pub mod search;
pub mod server;
pub mod service;
pub mod tools;
pub mod vector;
