//! Failure taxonomy for provider calls and pipeline construction.
//!
//! Every variant except [`VerifyError::Configuration`] is absorbed by the
//! component that detects it: routers skip to the next fallback and pipeline
//! stages apply their documented defaults. Only configuration errors reach
//! the caller, and only when a pipeline is being built.

use thiserror::Error;

/// Errors raised by model providers, search providers, and routers.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// No credential is configured for the provider.
    #[error("provider unavailable: {provider} has no credentials configured")]
    ProviderUnavailable {
        /// Provider identifier (e.g. `"brave"`).
        provider: String,
    },

    /// The provider or tier counter is at its limit.
    #[error("quota exhausted for {provider}: {used}/{limit}")]
    QuotaExhausted {
        /// Provider or tier identifier.
        provider: String,
        /// Calls already charged in the current period.
        used: u64,
        /// Period limit.
        limit: u64,
    },

    /// Network, HTTP, or model invocation failure.
    #[error("{provider} call failed: {message}")]
    TransientCallFailure {
        /// Provider or model identifier.
        provider: String,
        /// Human-readable failure detail.
        message: String,
    },

    /// The upstream answered but the payload could not be interpreted.
    #[error("malformed response from {provider}: {message}")]
    MalformedResponse {
        /// Provider or model identifier.
        provider: String,
        /// What was wrong with the payload.
        message: String,
    },

    /// A required credential or setting is missing. Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl VerifyError {
    pub(crate) fn transient(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::TransientCallFailure {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn malformed(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::MalformedResponse {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}
