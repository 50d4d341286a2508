//! Bundle construction and priority-fee escalation.
//!
//! Grounded on `types::Bundle`/`BundleState` (already shaped for this:
//! `Submitted{target_block} -> Included/Cancelled/Expired`) and the
//! teacher's `arbitrage::cooldown::RouteCooldown` escalating-step pattern,
//! reused here for priority-fee steps instead of cooldown blocks.

use crate::config::BotConfig;
use crate::types::{Bundle, BundleState};
use alloy::primitives::U256;

/// `clamp(bid_floor, net_profit * bid_fraction, bid_ceiling)` — spec.md
/// §4.H's dynamic bid formula.
pub fn dynamic_bid(config: &BotConfig, net_profit: U256) -> U256 {
    let scaled = (net_profit.to::<u128>() as f64 * config.bid_fraction) as u128;
    let bid = U256::from(scaled);
    bid.max(config.bid_floor_wei).min(config.bid_ceiling_wei)
}

/// Builds the initial bundle targeting `[head+1, head+max_blocks_ahead]`
/// with the signed raw transaction bytes already produced by the caller.
pub fn build(config: &BotConfig, raw_transaction: Vec<u8>, head: u64, net_profit: U256) -> Bundle {
    let target_block_range = (head + 1, head + config.max_blocks_ahead);
    Bundle::new(raw_transaction, target_block_range, dynamic_bid(config, net_profit))
}

/// One priority-fee escalation step: bumps the tip by `step_bps` (capped at
/// `bid_ceiling_wei`) and advances the bundle to the next target block,
/// per spec.md §4.H's "resubmit for block B+1 with the next priority-fee
/// step" escalation rule.
pub fn escalate(config: &BotConfig, bundle: &mut Bundle, next_block: u64, step_bps: u32) {
    let bumped = bundle.min_effective_tip
        + (bundle.min_effective_tip * U256::from(step_bps)) / U256::from(10_000u32);
    bundle.min_effective_tip = bumped.min(config.bid_ceiling_wei);
    bundle.state = BundleState::Submitted { target_block: next_block };
}

/// A cycle is cancellable once the head has advanced past the bundle's
/// target range without inclusion — condition (i) from spec.md §4.H.
pub fn is_expired(bundle: &Bundle, current_block: u64) -> bool {
    !bundle.is_terminal() && current_block > bundle.target_block_range.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn test_config() -> BotConfig {
        BotConfig {
            provider_urls: vec![],
            chain_id: 1,
            private_key: String::new(),
            max_reconnects: 1,
            tokens: vec![],
            base_tokens: vec![],
            intermediate_tokens: vec![],
            uniswap_v2_router: addr(0),
            uniswap_v2_factory: addr(0),
            sushiswap_v2_router: addr(0),
            sushiswap_v2_factory: addr(0),
            uniswap_v3_factory: addr(0),
            uniswap_v3_quoter_v2: addr(0),
            arb_executor: addr(0),
            aave_pool: None,
            balancer_vault: None,
            min_profit_usd: 0.0,
            max_trade_size_usd: 0.0,
            max_slippage_bps: 50,
            max_gas_price_gwei: 150,
            max_hops: 4,
            v3_max_ticks_simulated: 5,
            price_impact_ceiling: 0.05,
            sandwich_confidence_threshold: 0.75,
            min_profit_bps: 10,
            min_gross_to_gas_ratio: 0.0,
            amount_sizing_iterations: 6,
            amount_sizing_dust_bps: 1,
            min_amount_in: U256::from(1_000u64),
            max_amount_in: U256::from(1_000_000u64),
            gas_units_base: 100,
            gas_units_per_hop: 50,
            gas_price_gwei_estimate: 1,
            flash_loan_fee_bps_estimate: 0,
            pool_failure_cooldown_threshold: 3,
            max_parallel_requests: 4,
            poll_interval_ms: 500,
            relay_url: None,
            relay_signing_key: None,
            inclusion_window_blocks: 3,
            bid_floor_wei: U256::from(1_000_000_000u64),
            bid_ceiling_wei: U256::from(50_000_000_000u64),
            bid_fraction: 0.1,
            max_blocks_ahead: 3,
            sandwich_detection: crate::config::SandwichDetectionPolicy::Escalate,
            cache_path: None,
            dry_run: true,
        }
    }

    #[test]
    fn dynamic_bid_clamps_to_floor() {
        let config = test_config();
        let bid = dynamic_bid(&config, U256::from(1u64));
        assert_eq!(bid, config.bid_floor_wei);
    }

    #[test]
    fn dynamic_bid_clamps_to_ceiling() {
        let config = test_config();
        let bid = dynamic_bid(&config, U256::from(u128::MAX));
        assert_eq!(bid, config.bid_ceiling_wei);
    }

    #[test]
    fn escalate_bumps_tip_and_advances_target_block() {
        let config = test_config();
        let mut bundle = build(&config, vec![], 100, U256::from(10_000_000_000u64));
        let before = bundle.min_effective_tip;
        escalate(&config, &mut bundle, 102, 1_000);
        assert!(bundle.min_effective_tip >= before);
        assert_eq!(bundle.state, BundleState::Submitted { target_block: 102 });
    }

    #[test]
    fn expires_once_head_passes_target_range() {
        let config = test_config();
        let bundle = build(&config, vec![], 100, U256::from(1u64));
        assert!(!is_expired(&bundle, 101));
        assert!(is_expired(&bundle, bundle.target_block_range.1 + 1));
    }
}
