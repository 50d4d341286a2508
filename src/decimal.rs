//! Fixed-point arithmetic helpers.
//!
//! Design Note: "Decimal arithmetic with mixed float/int" → no floating
//! point participates in any profit calculation. Every amount is a
//! `U256` paired with the token's decimal exponent; this module is the
//! single place that defines the rounding rules the spec requires:
//! round-toward-zero on profit, round-away-from-zero on cost.
//!
//! `rust_decimal::Decimal` appears only in `to_display`, where a `Fixed`
//! is rendered for a log line or telemetry event — never on a branch that
//! decides whether a trade is profitable.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

/// A fixed-point amount: `mantissa * 10^-decimals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed {
    pub mantissa: U256,
    pub decimals: u8,
}

impl Fixed {
    pub fn new(mantissa: U256, decimals: u8) -> Self {
        Self { mantissa, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self {
            mantissa: U256::ZERO,
            decimals,
        }
    }

    /// Rescale to `target_decimals`, rounding toward zero (truncating) on
    /// a decimals decrease. Used for anything on the profit side of a
    /// calculation — never overstate a gain.
    pub fn rescale_round_toward_zero(&self, target_decimals: u8) -> Fixed {
        rescale(self.mantissa, self.decimals, target_decimals, Rounding::TowardZero)
    }

    /// Rescale rounding away from zero (ceiling on a decimals decrease).
    /// Used for anything on the cost side — gas cost, fees, repayment —
    /// so a scaling truncation never understates what must be paid.
    pub fn rescale_round_away_from_zero(&self, target_decimals: u8) -> Fixed {
        rescale(self.mantissa, self.decimals, target_decimals, Rounding::AwayFromZero)
    }

    /// Render as a human-readable decimal string for logs/telemetry only.
    pub fn to_display(&self) -> String {
        let raw = self.mantissa.to_string();
        let scale = self.decimals as u32;
        let decimal = Decimal::from_str(&raw)
            .map(|d| d / Decimal::from(10u64.pow(scale.min(18))))
            .unwrap_or(Decimal::ZERO);
        decimal.to_string()
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    pub fn checked_sub(&self, other: &Fixed) -> Option<Fixed> {
        if self.decimals != other.decimals {
            return None;
        }
        self.mantissa
            .checked_sub(other.mantissa)
            .map(|m| Fixed::new(m, self.decimals))
    }

    pub fn checked_add(&self, other: &Fixed) -> Option<Fixed> {
        if self.decimals != other.decimals {
            return None;
        }
        self.mantissa
            .checked_add(other.mantissa)
            .map(|m| Fixed::new(m, self.decimals))
    }
}

enum Rounding {
    TowardZero,
    AwayFromZero,
}

fn rescale(mantissa: U256, from_decimals: u8, to_decimals: u8, rounding: Rounding) -> Fixed {
    if from_decimals == to_decimals {
        return Fixed::new(mantissa, to_decimals);
    }
    if to_decimals > from_decimals {
        let factor = U256::from(10u64).pow(U256::from((to_decimals - from_decimals) as u64));
        return Fixed::new(mantissa.saturating_mul(factor), to_decimals);
    }
    let factor = U256::from(10u64).pow(U256::from((from_decimals - to_decimals) as u64));
    let truncated = mantissa / factor;
    let remainder = mantissa % factor;
    let result = match rounding {
        Rounding::TowardZero => truncated,
        Rounding::AwayFromZero => {
            if remainder.is_zero() {
                truncated
            } else {
                truncated.saturating_add(U256::from(1u64))
            }
        }
    };
    Fixed::new(result, to_decimals)
}

/// Minimum acceptable output given a quoted gross output and a slippage
/// tolerance in basis points: `min_out = gross_out * (1 - slippage)`.
/// Rounds away from zero on the subtracted slippage fraction so the
/// computed floor never permits more loss than configured.
pub fn apply_slippage(gross_out: U256, slippage_bps: u32) -> U256 {
    if slippage_bps >= 10_000 {
        return U256::ZERO;
    }
    let kept_bps = U256::from(10_000u32 - slippage_bps);
    gross_out.saturating_mul(kept_bps) / U256::from(10_000u32)
}

/// Gas cost in the native token's smallest unit: `gas_units * gas_price`.
pub fn gas_cost(gas_units: u64, gas_price: U256) -> U256 {
    U256::from(gas_units).saturating_mul(gas_price)
}

/// Flash loan fee in the loaned token's smallest unit, given a fee in
/// basis points (0 for most primary providers).
pub fn flash_loan_fee(amount: U256, fee_bps: u32) -> U256 {
    amount.saturating_mul(U256::from(fee_bps)) / U256::from(10_000u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_up_is_exact() {
        let f = Fixed::new(U256::from(5u64), 0);
        let scaled = f.rescale_round_toward_zero(2);
        assert_eq!(scaled.mantissa, U256::from(500u64));
    }

    #[test]
    fn rescale_down_toward_zero_truncates() {
        let f = Fixed::new(U256::from(1234u64), 3); // 1.234
        let scaled = f.rescale_round_toward_zero(1); // -> 1.2
        assert_eq!(scaled.mantissa, U256::from(12u64));
    }

    #[test]
    fn rescale_down_away_from_zero_rounds_up() {
        let f = Fixed::new(U256::from(1231u64), 3); // 1.231
        let scaled = f.rescale_round_away_from_zero(1); // -> 1.3 (ceil)
        assert_eq!(scaled.mantissa, U256::from(13u64));
    }

    #[test]
    fn rescale_down_away_from_zero_exact_no_bump() {
        let f = Fixed::new(U256::from(1200u64), 3); // 1.200
        let scaled = f.rescale_round_away_from_zero(1);
        assert_eq!(scaled.mantissa, U256::from(12u64));
    }

    #[test]
    fn slippage_zero_means_full_output() {
        let out = apply_slippage(U256::from(1_000_000u64), 0);
        assert_eq!(out, U256::from(1_000_000u64));
    }

    #[test]
    fn slippage_max_means_zero_floor() {
        let out = apply_slippage(U256::from(1_000_000u64), 10_000);
        assert_eq!(out, U256::ZERO);
    }

    #[test]
    fn slippage_50_bps() {
        let out = apply_slippage(U256::from(1_000_000u64), 50); // 0.5%
        assert_eq!(out, U256::from(995_000u64));
    }

    #[test]
    fn gas_cost_multiplies() {
        assert_eq!(gas_cost(200_000, U256::from(5u64)), U256::from(1_000_000u64));
    }

    #[test]
    fn flash_loan_fee_zero_bps_is_zero() {
        assert_eq!(flash_loan_fee(U256::from(1_000_000u64), 0), U256::ZERO);
    }

    #[test]
    fn flash_loan_fee_9_bps() {
        // 0.09% of 1_000_000 = 900
        assert_eq!(flash_loan_fee(U256::from(1_000_000u64), 9), U256::from(900u64));
    }
}
