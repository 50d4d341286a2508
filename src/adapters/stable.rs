//! StableSwap (Curve-style) pricing for low-slippage correlated pairs.
//!
//! Supplemented: the teacher has no StableSwap code. This ports the
//! standard StableSwap invariant — the same Newton's-method `D`/`y`
//! solve Curve's own contracts use — so reserve math stays exact integer
//! arithmetic, consistent with the rest of this crate's no-float Design
//! Note. Limited to 2-token pools, the shape the Path Finder needs for a
//! swap leg.

use alloy::primitives::U256;

const BPS_DENOMINATOR: u64 = 10_000;
const NEWTON_ITERATIONS: u32 = 255;

/// Solves for the StableSwap invariant `D` given balances and
/// amplification coefficient `amp`, via Newton's method — identical in
/// shape to Curve's `get_D`.
fn compute_d(balances: &[U256], amp: u64) -> U256 {
    let n = balances.len() as u64;
    let sum: U256 = balances.iter().fold(U256::ZERO, |acc, b| acc.saturating_add(*b));
    if sum.is_zero() {
        return U256::ZERO;
    }

    let ann = U256::from(amp).saturating_mul(U256::from(n));
    let mut d = sum;

    for _ in 0..NEWTON_ITERATIONS {
        let mut d_p = d;
        for b in balances {
            if b.is_zero() {
                continue;
            }
            d_p = d_p.saturating_mul(d) / (b.saturating_mul(U256::from(n)));
        }
        let prev_d = d;
        let numerator = ann
            .saturating_mul(sum)
            .saturating_add(d_p.saturating_mul(U256::from(n)))
            .saturating_mul(d);
        let denominator = ann
            .saturating_sub(U256::from(1u64))
            .saturating_mul(d)
            .saturating_add(U256::from(n + 1).saturating_mul(d_p));
        if denominator.is_zero() {
            break;
        }
        d = numerator / denominator.max(U256::from(1u64));
        if d > prev_d && d - prev_d <= U256::from(1u64) {
            break;
        }
        if prev_d > d && prev_d - d <= U256::from(1u64) {
            break;
        }
    }
    d
}

/// Solves for the new balance of `token_out` given the new balance of
/// `token_in` after a deposit, holding `D` fixed — Curve's `get_y`.
fn compute_y(balance_in_new: U256, d: U256, amp: u64, n: u64) -> U256 {
    let ann = U256::from(amp).saturating_mul(U256::from(n));
    if ann.is_zero() {
        return U256::ZERO;
    }
    let c = d.saturating_mul(d) / balance_in_new.max(U256::from(1u64)) * d / (ann.saturating_mul(U256::from(n)));
    let b = balance_in_new.saturating_add(d / ann);

    let mut y = d;
    for _ in 0..NEWTON_ITERATIONS {
        let prev_y = y;
        let numerator = y.saturating_mul(y).saturating_add(c);
        let denominator = U256::from(2u64).saturating_mul(y).saturating_add(b).saturating_sub(d);
        if denominator.is_zero() {
            break;
        }
        y = numerator / denominator;
        if y > prev_y && y - prev_y <= U256::from(1u64) {
            break;
        }
        if prev_y > y && prev_y - y <= U256::from(1u64) {
            break;
        }
    }
    y
}

/// Returns `(amount_out, price_impact)` for a 2-token StableSwap pool.
/// `zero_for_one` true means `balances[0]` is the input side.
pub fn quote(
    balances: &[U256],
    amplification: u64,
    zero_for_one: bool,
    amount_in: U256,
    fee_bps: u32,
) -> (U256, f64) {
    if balances.len() != 2 || amount_in.is_zero() || balances.iter().any(|b| b.is_zero()) {
        return (U256::ZERO, 1.0);
    }

    let (idx_in, idx_out) = if zero_for_one { (0, 1) } else { (1, 0) };
    let d = compute_d(balances, amplification);

    let fee_factor = U256::from(BPS_DENOMINATOR - fee_bps as u64);
    let amount_in_after_fee = amount_in.saturating_mul(fee_factor) / U256::from(BPS_DENOMINATOR);

    let new_balance_in = balances[idx_in].saturating_add(amount_in_after_fee);
    let new_balance_out = compute_y(new_balance_in, d, amplification, balances.len() as u64);

    if new_balance_out >= balances[idx_out] {
        return (U256::ZERO, 1.0);
    }
    let amount_out = balances[idx_out] - new_balance_out;

    let spot_ratio = ratio(balances[idx_out], balances[idx_in]);
    let exec_ratio = ratio(amount_out, amount_in);
    let impact = if spot_ratio > 0.0 {
        ((spot_ratio - exec_ratio) / spot_ratio).clamp(0.0, 1.0)
    } else {
        1.0
    };

    (amount_out, impact)
}

fn ratio(a: U256, b: U256) -> f64 {
    if b.is_zero() {
        return 0.0;
    }
    let a_f: u128 = a.try_into().unwrap_or(u128::MAX);
    let b_f: u128 = b.try_into().unwrap_or(1);
    a_f as f64 / b_f as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_pool_trades_near_one_to_one() {
        let balances = vec![
            U256::from(1_000_000_000_000u64),
            U256::from(1_000_000_000_000u64),
        ];
        let (out, _) = quote(&balances, 100, true, U256::from(1_000_000u64), 4);
        // StableSwap with balanced reserves trades very close to 1:1
        let diff = if out > U256::from(1_000_000u64) {
            out - U256::from(1_000_000u64)
        } else {
            U256::from(1_000_000u64) - out
        };
        assert!(diff < U256::from(10_000u64));
    }

    #[test]
    fn zero_amount_yields_zero_output() {
        let balances = vec![U256::from(1000u64), U256::from(1000u64)];
        let (out, impact) = quote(&balances, 100, true, U256::ZERO, 4);
        assert_eq!(out, U256::ZERO);
        assert_eq!(impact, 1.0);
    }
}
