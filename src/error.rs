//! Typed error taxonomy for the engine's internal control flow.
//!
//! Every stage (chain client, registry, evaluator, planner, submission)
//! returns `Result<_, EngineError>` so the orchestrator can match on the
//! failure kind and decide whether to retry, cool the route down, or
//! abort the cycle. `anyhow::Error` is still used at the process
//! boundary (`main.rs`, config loading) where a failure is always fatal
//! and no caller needs to branch on its shape.

use alloy::primitives::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport error talking to {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("no healthy provider available, last error: {last_error}")]
    NoHealthyProvider { last_error: String },

    #[error("quote for pool {pool} is stale: captured at block {captured_block}, head is {head_block}")]
    StaleQuote {
        pool: Address,
        captured_block: u64,
        head_block: u64,
    },

    #[error("head block {expected} moved to {actual} mid-cycle")]
    StaleHead { expected: u64, actual: u64 },

    #[error("pool {pool} not found in registry")]
    PoolNotFound { pool: Address },

    #[error("route {0:?} is cooling down after repeated failures")]
    RouteCooldown(String),

    #[error("simulation reverted: {reason}")]
    SimulationReverted { reason: String },

    #[error("no flash loan provider available for token {token}")]
    NoFlashLoanProvider { token: Address },

    #[error("inclusion window expired at block {expired_at}, current block {current_block}")]
    InclusionExpired {
        expired_at: u64,
        current_block: u64,
    },

    #[error("nonce collision: local nonce {local} does not match chain nonce {chain}")]
    NonceCollision { local: u64, chain: u64 },

    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    #[error("missing required secret: {0}")]
    MissingSecret(String),

    #[error("relay submission failed irrecoverably: {0}")]
    SubmissionFailed(String),

    #[error("arithmetic overflow computing {0}")]
    Overflow(String),

    #[error("cycle cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether the orchestrator should retry the current cycle rather
    /// than discarding the opportunity outright.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Transport { .. } | EngineError::NoHealthyProvider { .. }
        )
    }

    /// Whether the failure should trigger a cooldown on the route/pool
    /// involved, distinct from a merely transient transport blip.
    pub fn should_cooldown(&self) -> bool {
        matches!(
            self,
            EngineError::SimulationReverted { .. }
                | EngineError::InclusionExpired { .. }
                | EngineError::StaleQuote { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        let err = EngineError::NoHealthyProvider {
            last_error: "timeout".into(),
        };
        assert!(err.is_transient());
        assert!(!err.should_cooldown());
    }

    #[test]
    fn reverts_trigger_cooldown() {
        let err = EngineError::SimulationReverted {
            reason: "STF".into(),
        };
        assert!(err.should_cooldown());
        assert!(!err.is_transient());
    }

    #[test]
    fn cancelled_is_neither() {
        let err = EngineError::Cancelled;
        assert!(!err.is_transient());
        assert!(!err.should_cooldown());
    }
}
