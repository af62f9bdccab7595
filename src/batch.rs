//! Batch execution of claim verifications.
//!
//! Two modes over an ordered list of statements:
//!
//! - **Bounded parallel** ([`BatchRunner::run_parallel`]): up to
//!   `max_concurrent` verifications in flight, gated by a semaphore.
//! - **Rate limited** ([`BatchRunner::run_rate_limited`]): one verification
//!   at a time, with `1 / rate` seconds between dispatches.
//!
//! In both modes the output has the same length and order as the input. A
//! verification that fails (or panics) becomes a [`FailedClaim`] in its own
//! slot and never cancels its siblings.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::models::{BatchItem, ClaimRecord, FailedClaim};

/// Anything that can turn a statement into a [`ClaimRecord`].
#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    async fn verify(&self, statement: &str) -> Result<ClaimRecord>;
}

/// Runs a [`ClaimVerifier`] over many statements.
#[derive(Clone)]
pub struct BatchRunner {
    verifier: Arc<dyn ClaimVerifier>,
}

impl BatchRunner {
    pub fn new(verifier: Arc<dyn ClaimVerifier>) -> Self {
        Self { verifier }
    }

    /// Verify `statements` with at most `max_concurrent` in flight.
    ///
    /// A `max_concurrent` of zero is treated as one; values above
    /// [`Semaphore::MAX_PERMITS`] are capped there.
    pub async fn run_parallel(&self, statements: &[String], max_concurrent: usize) -> Vec<BatchItem> {
        let permits = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));

        let handles: Vec<_> = statements
            .iter()
            .cloned()
            .map(|statement| {
                let verifier = Arc::clone(&self.verifier);
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    // The semaphore is never closed, so acquisition cannot fail.
                    let _permit = semaphore.acquire_owned().await;
                    verifier.verify(&statement).await
                })
            })
            .collect();

        let mut items = Vec::with_capacity(statements.len());
        for (statement, handle) in statements.iter().zip(handles) {
            items.push(into_item(statement, handle.await));
        }
        items
    }

    /// Verify `statements` one at a time, `1 / rate_per_second` seconds apart.
    ///
    /// # Errors
    ///
    /// Fails before dispatching anything if the rate is not a positive,
    /// finite number, or is so small that the interval overflows a
    /// [`Duration`].
    pub async fn run_rate_limited(
        &self,
        statements: &[String],
        rate_per_second: f64,
    ) -> Result<Vec<BatchItem>> {
        if !(rate_per_second.is_finite() && rate_per_second > 0.0) {
            bail!("rate must be a positive number, got {}", rate_per_second);
        }
        let Ok(delay) = Duration::try_from_secs_f64(1.0 / rate_per_second) else {
            bail!("rate {} is too small: dispatch interval out of range", rate_per_second);
        };

        let mut items = Vec::with_capacity(statements.len());
        for (i, statement) in statements.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            let verifier = Arc::clone(&self.verifier);
            let owned = statement.clone();
            let handle = tokio::spawn(async move { verifier.verify(&owned).await });
            items.push(into_item(statement, handle.await));
        }
        Ok(items)
    }
}

fn into_item(statement: &str, joined: Result<Result<ClaimRecord>, JoinError>) -> BatchItem {
    match joined {
        Ok(Ok(record)) => BatchItem::Verified(record),
        Ok(Err(e)) => failed(statement, e.to_string()),
        Err(join_err) => failed(statement, format!("verification task aborted: {}", join_err)),
    }
}

fn failed(statement: &str, error: String) -> BatchItem {
    tracing::warn!(statement, error = %error, "batch item failed");
    BatchItem::Failed(FailedClaim::new(statement, error))
}
