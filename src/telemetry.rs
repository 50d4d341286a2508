//! Structured telemetry events.
//!
//! The teacher logs ad hoc with `tracing::{info,warn,debug}!` scattered
//! through each module. This crate keeps that style but funnels the
//! events an external dashboard would actually want to chart — cycle
//! boundaries, opportunities, plan outcomes, submission outcomes —
//! through one place so every call site uses the same field names.

use alloy::primitives::{Address, U256};
use tracing::{info, warn};

pub fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

pub fn cycle_started(base_token: Address, head_block: u64) {
    info!(
        event = "cycle_started",
        base_token = %base_token,
        head_block,
    );
}

pub fn cycle_finished(base_token: Address, head_block: u64, opportunities_found: usize, duration_ms: u128) {
    info!(
        event = "cycle_finished",
        base_token = %base_token,
        head_block,
        opportunities_found,
        duration_ms,
    );
}

pub fn opportunity_detected(base_token: Address, hop_count: usize, gross_profit: &str, net_profit: &str) {
    info!(
        event = "opportunity_detected",
        base_token = %base_token,
        hop_count,
        gross_profit,
        net_profit,
    );
}

pub fn opportunity_rejected(base_token: Address, reason: &str) {
    info!(
        event = "opportunity_rejected",
        base_token = %base_token,
        reason,
    );
}

pub fn plan_simulated(plan_id: &str, ok: bool, revert_reason: Option<&str>) {
    if ok {
        info!(event = "plan_simulated", plan_id, ok);
    } else {
        warn!(
            event = "plan_simulated",
            plan_id,
            ok,
            revert_reason = revert_reason.unwrap_or("unknown"),
        );
    }
}

pub fn bundle_submitted(bundle_id: &str, target_block: u64, bid: U256) {
    info!(
        event = "bundle_submitted",
        bundle_id,
        target_block,
        bid = %bid,
    );
}

pub fn bundle_included(bundle_id: &str, block: u64, realized_profit: &str) {
    info!(
        event = "bundle_included",
        bundle_id,
        block,
        realized_profit,
    );
}

pub fn bundle_expired(bundle_id: &str, target_block: u64) {
    warn!(event = "bundle_expired", bundle_id, target_block);
}

pub fn sandwich_risk_detected(pool: Address, attacker_tx: &str) {
    warn!(
        event = "sandwich_risk_detected",
        pool = %pool,
        attacker_tx,
    );
}

pub fn engine_error(stage: &str, error: &dyn std::error::Error) {
    warn!(event = "engine_error", stage, error = %error);
}
