//! Web search with ordered, quota-aware provider fallback.
//!
//! The [`SearchRouter`] holds providers in priority order. For each query it
//! tries them strictly in that order and returns the first success:
//!
//! ```text
//! tavily (1000/period) ──▶ brave (2000/period) ──▶ duckduckgo (unlimited)
//!        │ no key / quota spent / call failed         │ all failed
//!        └──────────────── skip ─────────────────────▶└──▶ { results: [], source: "none" }
//! ```
//!
//! Availability (credentials, remaining quota) is checked before dispatch;
//! call failures are logged and skipped. [`SearchRouter::search`] never
//! returns an error.
//!
//! Quota counters are atomics shared by all concurrent verifications. A slot
//! is reserved before the call and released if the call fails, so `used`
//! never exceeds `limit` however many batches run at once.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{env_credential, SearchConfig};
use crate::error::VerifyError;
use crate::models::SearchHit;

/// Tag used as `source` when no provider produced results.
pub const NO_SOURCE: &str = "none";

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider identifier, used as the `source` tag (e.g. `"tavily"`).
    fn name(&self) -> &str;

    /// Whether the provider's credentials are present.
    fn is_configured(&self) -> bool {
        true
    }

    /// Run `query` and return normalized hits.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, VerifyError>;
}

/// Remaining quota reported alongside search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Limited(u64),
    Unlimited,
    Unknown,
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Limited(n) => serializer.serialize_u64(*n),
            Remaining::Unlimited => serializer.serialize_str("unlimited"),
            Remaining::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

/// Result of [`SearchRouter::search`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<SearchHit>,
    pub source: String,
    pub remaining: Remaining,
}

impl SearchOutcome {
    /// The outcome when every provider was skipped or failed.
    pub fn none() -> Self {
        Self {
            results: Vec::new(),
            source: NO_SOURCE.to_string(),
            remaining: Remaining::Unknown,
        }
    }
}

/// Per-provider quota counter.
struct Quota {
    limit: Option<u64>,
    used: AtomicU64,
}

impl Quota {
    fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Take one unit of quota, failing if `provider` is at its limit.
    fn try_reserve(&self, provider: &str) -> Result<(), VerifyError> {
        let limit = self.limit;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| match limit {
                Some(limit) if used >= limit => None,
                _ => Some(used + 1),
            })
            .map(|_| ())
            .map_err(|used| VerifyError::QuotaExhausted {
                provider: provider.to_string(),
                used,
                limit: limit.unwrap_or(used),
            })
    }

    fn release(&self) {
        self.used.fetch_sub(1, Ordering::AcqRel);
    }

    fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    fn remaining(&self) -> Remaining {
        match self.limit {
            Some(limit) => Remaining::Limited(limit.saturating_sub(self.used())),
            None => Remaining::Unlimited,
        }
    }
}

/// Quota snapshot for one provider, as reported by [`SearchRouter::quota_status`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderQuota {
    pub provider: String,
    pub configured: bool,
    pub used: u64,
    pub limit: Option<u64>,
    pub remaining: Remaining,
}

struct ProviderSlot {
    provider: Box<dyn SearchProvider>,
    quota: Quota,
}

/// Ordered fallback chain over [`SearchProvider`]s.
pub struct SearchRouter {
    slots: Vec<ProviderSlot>,
    query_suffix: String,
}

impl SearchRouter {
    /// Create an empty router. Queries are sent unchanged.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            query_suffix: String::new(),
        }
    }

    /// Build the standard Tavily → Brave → DuckDuckGo chain.
    ///
    /// Missing API keys do not fail construction; the affected provider is
    /// simply skipped at query time.
    pub fn from_config(config: &SearchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut router = Self::new().with_query_suffix(&config.query_suffix);
        router.register(
            Box::new(TavilyProvider {
                api_key: env_credential(&config.tavily_api_key_env),
                include_domains: config.recommended_domains.clone(),
                max_results: config.max_results,
                client: client.clone(),
            }),
            Some(config.tavily_limit),
        );
        router.register(
            Box::new(BraveProvider {
                api_key: env_credential(&config.brave_api_key_env),
                max_results: config.max_results,
                client: client.clone(),
            }),
            Some(config.brave_limit),
        );
        router.register(
            Box::new(DuckDuckGoProvider {
                max_results: config.max_results,
                client,
            }),
            None,
        );
        Ok(router)
    }

    /// Text appended to every query before dispatch.
    pub fn with_query_suffix(mut self, suffix: &str) -> Self {
        self.query_suffix = suffix.to_string();
        self
    }

    /// Append a provider to the chain. `limit = None` means unlimited.
    pub fn register(&mut self, provider: Box<dyn SearchProvider>, limit: Option<u64>) {
        self.slots.push(ProviderSlot {
            provider,
            quota: Quota::new(limit),
        });
    }

    /// Try each provider in order and return the first successful result.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        let full_query = format!("{}{}", query, self.query_suffix);

        for slot in &self.slots {
            let name = slot.provider.name();

            if !slot.provider.is_configured() {
                tracing::debug!(provider = name, "skipping search provider: no credentials");
                continue;
            }

            if let Err(e) = slot.quota.try_reserve(name) {
                tracing::debug!(error = %e, "skipping search provider");
                continue;
            }

            match slot.provider.search(&full_query).await {
                Ok(results) => {
                    tracing::debug!(provider = name, hits = results.len(), "web search served");
                    return SearchOutcome {
                        results,
                        source: name.to_string(),
                        remaining: slot.quota.remaining(),
                    };
                }
                Err(e) => {
                    slot.quota.release();
                    tracing::warn!(provider = name, error = %e, "search provider failed; trying next");
                }
            }
        }

        SearchOutcome::none()
    }

    /// Current usage for every provider in chain order.
    pub fn quota_status(&self) -> Vec<ProviderQuota> {
        self.slots
            .iter()
            .map(|slot| ProviderQuota {
                provider: slot.provider.name().to_string(),
                configured: slot.provider.is_configured(),
                used: slot.quota.used(),
                limit: slot.quota.limit,
                remaining: slot.quota.remaining(),
            })
            .collect()
    }
}

impl Default for SearchRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ============ HTTP helpers ============

async fn fetch_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, VerifyError> {
    let response = request
        .send()
        .await
        .map_err(|e| VerifyError::transient(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(VerifyError::transient(
            provider,
            format!("HTTP {}: {}", status, body_text),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| VerifyError::malformed(provider, e))
}

async fn fetch_text(provider: &str, request: reqwest::RequestBuilder) -> Result<String, VerifyError> {
    let response = request
        .send()
        .await
        .map_err(|e| VerifyError::transient(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(VerifyError::transient(provider, format!("HTTP {}", status)));
    }

    response
        .text()
        .await
        .map_err(|e| VerifyError::transient(provider, e))
}

fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

// ============ Tavily ============

/// Tavily search API. Highest quality, smallest quota.
pub struct TavilyProvider {
    api_key: Option<String>,
    include_domains: Vec<String>,
    max_results: usize,
    client: reqwest::Client,
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &str {
        "tavily"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, VerifyError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| VerifyError::ProviderUnavailable {
                provider: self.name().to_string(),
            })?;

        let body = serde_json::json!({
            "query": query,
            "include_domains": self.include_domains,
            "max_results": self.max_results,
        });

        let request = self
            .client
            .post("https://api.tavily.com/search")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body);

        let json = fetch_json(self.name(), request).await?;
        parse_tavily_response(&json)
    }
}

fn parse_tavily_response(json: &serde_json::Value) -> Result<Vec<SearchHit>, VerifyError> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| VerifyError::malformed("tavily", "missing results array"))?;

    Ok(results
        .iter()
        .map(|r| SearchHit {
            title: str_field(r, "title"),
            content: str_field(r, "content"),
            url: str_field(r, "url"),
        })
        .collect())
}

// ============ Brave ============

/// Brave Search web API.
pub struct BraveProvider {
    api_key: Option<String>,
    max_results: usize,
    client: reqwest::Client,
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn name(&self) -> &str {
        "brave"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, VerifyError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| VerifyError::ProviderUnavailable {
                provider: self.name().to_string(),
            })?;

        let count = self.max_results.to_string();
        let request = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())]);

        let json = fetch_json(self.name(), request).await?;
        Ok(parse_brave_response(&json))
    }
}

fn parse_brave_response(json: &serde_json::Value) -> Vec<SearchHit> {
    json.get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .map(|r| SearchHit {
                    title: str_field(r, "title"),
                    content: str_field(r, "description"),
                    url: str_field(r, "url"),
                })
                .collect()
        })
        .unwrap_or_default()
}

// ============ DuckDuckGo ============

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// DuckDuckGo web results, scraped from the HTML endpoint. Needs no key and
/// has no quota.
pub struct DuckDuckGoProvider {
    max_results: usize,
    client: reqwest::Client,
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, VerifyError> {
        let request = self
            .client
            .post(DUCKDUCKGO_HTML_URL)
            .header("User-Agent", concat!("claimcheck/", env!("CARGO_PKG_VERSION")))
            .form(&[("q", query)]);

        let html = fetch_text(self.name(), request).await?;
        let mut hits = parse_duckduckgo_html(&html)?;
        hits.truncate(self.max_results);
        Ok(hits)
    }
}

fn selector(css: &str) -> Result<Selector, VerifyError> {
    Selector::parse(css)
        .map_err(|e| VerifyError::malformed("duckduckgo", format!("selector {}: {:?}", css, e)))
}

/// Extract organic results: `.result__a` gives title and link,
/// `.result__snippet` the body. Sponsored `.result--ad` blocks are skipped.
fn parse_duckduckgo_html(html: &str) -> Result<Vec<SearchHit>, VerifyError> {
    let result_sel = selector("div.result")?;
    let title_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let document = Html::parse_document(html);
    let mut hits = Vec::new();

    for result in document.select(&result_sel) {
        if result.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let Some(link) = result.select(&title_sel).next() else {
            continue;
        };
        let title = element_text(link);
        let url = link
            .value()
            .attr("href")
            .map(resolve_duckduckgo_href)
            .unwrap_or_default();
        if title.is_empty() || url.is_empty() {
            continue;
        }
        let content = result
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();
        hits.push(SearchHit {
            title,
            content,
            url,
        });
    }

    Ok(hits)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result links go through a `/l/?uddg=<target>` redirect; return the target.
fn resolve_duckduckgo_href(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    match reqwest::Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned())
            .unwrap_or(absolute),
        Err(_) => absolute,
    }
}
