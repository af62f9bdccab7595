//! Tiered model selection with per-tier sliding-window rate limits.
//!
//! Task types map onto three model tiers:
//!
//! | Task type | Tier | Default cap |
//! |-----------|------|-------------|
//! | `classify`, `extract`, `quick`, anything unknown | throughput | 15/min |
//! | `analyze`, `reason`, `complex` | quality | 2/min |
//! | `decide` | reasoning | 10/min |
//!
//! Routing never blocks. When the target tier's trailing 60-second window is
//! full, or the reasoning model call fails, the prompt is sent to the
//! throughput tier instead. The saturated tier's window is not charged for
//! a call it did not serve.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ModelsConfig;
use crate::error::VerifyError;
use crate::llm::{ModelProvider, ModelResponse};

const WINDOW: Duration = Duration::from_secs(60);

/// A class of model with its own per-minute call cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Throughput,
    Quality,
    Reasoning,
}

impl Tier {
    /// Map a semantic task type onto the tier that should serve it.
    pub fn for_task(task_type: &str) -> Tier {
        match task_type {
            "classify" | "extract" | "quick" => Tier::Throughput,
            "analyze" | "reason" | "complex" => Tier::Quality,
            "decide" => Tier::Reasoning,
            _ => Tier::Throughput,
        }
    }

    fn index(self) -> usize {
        match self {
            Tier::Throughput => 0,
            Tier::Quality => 1,
            Tier::Reasoning => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Throughput => "throughput",
            Tier::Quality => "quality",
            Tier::Reasoning => "reasoning",
        };
        f.write_str(s)
    }
}

/// Trailing 60-second call log with a fixed cap.
///
/// Pruning, the admission check, and recording happen under one lock so two
/// concurrent callers cannot both take the last slot.
pub struct RateWindow {
    cap: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            calls: Mutex::new(VecDeque::with_capacity(cap)),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Record a call if the window has room. Returns whether it was admitted.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut calls = self.lock();
        prune(&mut calls, now);
        if calls.len() < self.cap {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of calls within the trailing window.
    pub fn recent(&self) -> usize {
        let mut calls = self.lock();
        prune(&mut calls, Instant::now());
        calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        // The deque is always left consistent, so a poisoned lock is still usable.
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn prune(calls: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = calls.front() {
        if now.duration_since(oldest) >= WINDOW {
            calls.pop_front();
        } else {
            break;
        }
    }
}

struct TierSlot {
    model: String,
    window: RateWindow,
}

/// A model response annotated with the tier that actually served it.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub tier: Tier,
    pub model: String,
    /// True when the call was served by a fallback tier.
    pub degraded: bool,
    pub response: ModelResponse,
}

/// Per-tier window usage, as reported by [`ModelRouter::stats`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TierStats {
    pub tier: Tier,
    pub model: String,
    pub used: usize,
    pub limit: usize,
}

/// Routes prompts to model tiers under their rate limits.
///
/// Shared by every concurrent verification; all state lives in the
/// per-tier [`RateWindow`]s.
pub struct ModelRouter {
    provider: Arc<dyn ModelProvider>,
    slots: [TierSlot; 3],
}

impl ModelRouter {
    pub fn from_config(config: &ModelsConfig, provider: Arc<dyn ModelProvider>) -> Self {
        let slot = |model: &str, cap: usize| TierSlot {
            model: model.to_string(),
            window: RateWindow::new(cap),
        };
        Self {
            provider,
            slots: [
                slot(&config.throughput_model, config.throughput_rpm),
                slot(&config.quality_model, config.quality_rpm),
                slot(&config.reasoning_model, config.reasoning_rpm),
            ],
        }
    }

    fn slot(&self, tier: Tier) -> &TierSlot {
        &self.slots[tier.index()]
    }

    /// Route `prompt` according to `task_type`.
    ///
    /// # Errors
    ///
    /// Returns the provider error of the tier that finally served the call.
    /// Quality-tier failures are returned as-is; reasoning-tier failures are
    /// retried once on the throughput tier first.
    pub async fn route(&self, task_type: &str, prompt: &str) -> Result<RoutedResponse, VerifyError> {
        let target = Tier::for_task(task_type);

        match target {
            Tier::Throughput => {
                if !self.slot(Tier::Throughput).window.try_acquire() {
                    tracing::debug!(task_type, "throughput window full; dispatching uncharged");
                }
                self.dispatch(Tier::Throughput, prompt, false).await
            }
            Tier::Quality => {
                if self.slot(Tier::Quality).window.try_acquire() {
                    self.dispatch(Tier::Quality, prompt, false).await
                } else {
                    tracing::debug!(task_type, "quality window full; degrading to throughput");
                    self.fallback(prompt).await
                }
            }
            Tier::Reasoning => {
                if !self.slot(Tier::Reasoning).window.try_acquire() {
                    tracing::debug!(task_type, "reasoning window full; degrading to throughput");
                    return self.fallback(prompt).await;
                }
                match self.dispatch(Tier::Reasoning, prompt, false).await {
                    Ok(resp) => Ok(resp),
                    Err(e) => {
                        tracing::warn!(error = %e, "reasoning model failed; retrying on throughput");
                        self.fallback(prompt).await
                    }
                }
            }
        }
    }

    async fn fallback(&self, prompt: &str) -> Result<RoutedResponse, VerifyError> {
        // Charged only if the throughput window still has room.
        self.slot(Tier::Throughput).window.try_acquire();
        self.dispatch(Tier::Throughput, prompt, true).await
    }

    async fn dispatch(
        &self,
        tier: Tier,
        prompt: &str,
        degraded: bool,
    ) -> Result<RoutedResponse, VerifyError> {
        let model = &self.slot(tier).model;
        let response = self.provider.generate(model, prompt).await?;
        Ok(RoutedResponse {
            tier,
            model: model.clone(),
            degraded,
            response,
        })
    }

    /// Calls recorded in each tier's trailing 60-second window.
    pub fn stats(&self) -> Vec<TierStats> {
        [Tier::Throughput, Tier::Quality, Tier::Reasoning]
            .into_iter()
            .map(|tier| {
                let slot = self.slot(tier);
                TierStats {
                    tier,
                    model: slot.model.clone(),
                    used: slot.window.recent(),
                    limit: slot.window.cap(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Echoes the model id; fails for models listed in `failing`.
    struct EchoProvider {
        failing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl EchoProvider {
        fn new(failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, model_id: &str, _prompt: &str) -> Result<ModelResponse, VerifyError> {
            self.calls.lock().unwrap().push(model_id.to_string());
            if self.failing.iter().any(|m| m == model_id) {
                return Err(VerifyError::transient(model_id, "boom"));
            }
            Ok(ModelResponse::from_text(model_id))
        }
    }

    fn router(provider: Arc<EchoProvider>) -> ModelRouter {
        let config = ModelsConfig {
            throughput_model: "flash".into(),
            quality_model: "pro".into(),
            reasoning_model: "thinking".into(),
            ..ModelsConfig::default()
        };
        ModelRouter::from_config(&config, provider)
    }

    #[test]
    fn test_task_mapping() {
        assert_eq!(Tier::for_task("classify"), Tier::Throughput);
        assert_eq!(Tier::for_task("quick"), Tier::Throughput);
        assert_eq!(Tier::for_task("complex"), Tier::Quality);
        assert_eq!(Tier::for_task("analyze"), Tier::Quality);
        assert_eq!(Tier::for_task("decide"), Tier::Reasoning);
        assert_eq!(Tier::for_task("summarize"), Tier::Throughput);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quality_saturation_degrades_without_charging() {
        let provider = EchoProvider::new(&[]);
        let router = router(provider.clone());

        for _ in 0..2 {
            let r = router.route("analyze", "p").await.unwrap();
            assert_eq!(r.tier, Tier::Quality);
            assert!(!r.degraded);
        }
        let third = router.route("analyze", "p").await.unwrap();
        assert_eq!(third.tier, Tier::Throughput);
        assert!(third.degraded);
        assert_eq!(provider.calls(), vec!["pro", "pro", "flash"]);

        let stats = router.stats();
        assert_eq!(stats[1].used, 2, "quality window never exceeds its cap");
        assert_eq!(stats[0].used, 1, "fallback charged to throughput");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_after_sixty_seconds() {
        let router = router(EchoProvider::new(&[]));
        router.route("analyze", "p").await.unwrap();
        router.route("analyze", "p").await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(router.route("analyze", "p").await.unwrap().tier, Tier::Throughput);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(router.stats()[1].used, 0);
        assert_eq!(router.route("analyze", "p").await.unwrap().tier, Tier::Quality);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reasoning_failure_falls_back_to_throughput() {
        let provider = EchoProvider::new(&["thinking"]);
        let router = router(provider.clone());

        let r = router.route("decide", "p").await.unwrap();
        assert_eq!(r.tier, Tier::Throughput);
        assert!(r.degraded);
        assert_eq!(r.response.text(), Some("flash"));
        assert_eq!(provider.calls(), vec!["thinking", "flash"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quality_failure_is_returned() {
        let router = router(EchoProvider::new(&["pro"]));
        let err = router.route("analyze", "p").await.unwrap_err();
        assert!(matches!(err, VerifyError::TransientCallFailure { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_never_blocks_when_saturated() {
        let provider = EchoProvider::new(&[]);
        let router = router(provider.clone());
        for _ in 0..20 {
            let r = router.route("classify", "p").await.unwrap();
            assert_eq!(r.tier, Tier::Throughput);
        }
        assert_eq!(provider.calls().len(), 20);
        assert_eq!(router.stats()[0].used, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_respects_cap() {
        let window = Arc::new(RateWindow::new(10));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let w = window.clone();
            handles.push(tokio::spawn(async move { w.try_acquire() }));
        }
        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
        assert_eq!(window.recent(), 10);
    }
}
