//! Constant-product (Uniswap V2 / SushiSwap / QuickSwap V2 fork) pricing.
//!
//! Ported from the teacher's `pool::calculator::PriceCalculator::get_amount_out`,
//! generalized so the fee isn't hardcoded to 997/1000 — V2 forks vary
//! their fee in practice even though the canonical 0.3% is by far the
//! most common, so `fee_bps` comes from the `Pool` record instead of a
//! constant.

use alloy::primitives::U256;

const BPS_DENOMINATOR: u64 = 10_000;

/// Returns `(amount_out, price_impact)` for a constant-product pool with
/// reserves `(reserve0, reserve1)`. `zero_for_one` is true when the trade
/// sells token0 for token1.
pub fn quote(
    reserve0: U256,
    reserve1: U256,
    zero_for_one: bool,
    amount_in: U256,
    fee_bps: u32,
) -> (U256, f64) {
    let (reserve_in, reserve_out) = if zero_for_one {
        (reserve0, reserve1)
    } else {
        (reserve1, reserve0)
    };

    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return (U256::ZERO, 1.0);
    }

    let fee_factor = U256::from(BPS_DENOMINATOR - fee_bps as u64);
    let amount_in_with_fee = amount_in.saturating_mul(fee_factor);
    let numerator = amount_in_with_fee.saturating_mul(reserve_out);
    let denominator = reserve_in
        .saturating_mul(U256::from(BPS_DENOMINATOR))
        .saturating_add(amount_in_with_fee);
    let amount_out = numerator / denominator;

    let price_impact = price_impact(reserve_in, reserve_out, amount_in, amount_out);
    (amount_out, price_impact)
}

fn price_impact(reserve_in: U256, reserve_out: U256, amount_in: U256, amount_out: U256) -> f64 {
    if amount_out.is_zero() || amount_in.is_zero() {
        return 1.0;
    }
    let spot = to_f64_ratio(reserve_out, reserve_in);
    let execution = to_f64_ratio(amount_out, amount_in);
    if spot <= 0.0 {
        return 1.0;
    }
    ((spot - execution) / spot).clamp(0.0, 1.0)
}

fn to_f64_ratio(numerator: U256, denominator: U256) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    let num: u128 = numerator.try_into().unwrap_or(u128::MAX);
    let den: u128 = denominator.try_into().unwrap_or(1);
    num as f64 / den as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_matches_canonical_fee() {
        let (out, _) = quote(
            U256::from(100_000_000_000_000_000_000u128), // 100 ETH
            U256::from(200_000_000_000u64),               // 200,000 USDC
            true,
            U256::from(1_000_000_000_000_000_000u64), // 1 ETH
            30,
        );
        assert!(out > U256::from(1_970_000_000u64));
        assert!(out < U256::from(2_000_000_000u64));
    }

    #[test]
    fn zero_reserves_yield_zero_output() {
        let (out, impact) = quote(U256::ZERO, U256::from(100u64), true, U256::from(10u64), 30);
        assert_eq!(out, U256::ZERO);
        assert_eq!(impact, 1.0);
    }

    #[test]
    fn direction_is_respected() {
        let (out_a, _) = quote(U256::from(1000u64), U256::from(2000u64), true, U256::from(10u64), 30);
        let (out_b, _) = quote(U256::from(1000u64), U256::from(2000u64), false, U256::from(10u64), 30);
        assert_ne!(out_a, out_b);
    }
}
