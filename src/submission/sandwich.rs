//! Sandwich/front-run detection — scans the public mempool for pending
//! transactions trading the same token pair in the same direction as our
//! own plan.
//!
//! Ported from the teacher's `mempool::decoder`/`mempool::monitor`
//! (selector-dispatch decode of router calldata, subscribed over
//! `alchemy_pendingTransactions`), rewritten against the `alloy_sol_types`
//! bindings already declared in `contracts.rs` instead of hand-rolled
//! `ethers::abi::ParamType` decoding — the same generalization this crate
//! applies everywhere else it touches calldata (see `planner`'s
//! `executeArbCycle` encoding).

use crate::contracts::{ISwapRouter, IUniswapV2Router02};
use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// What the decoder could recover from one pending transaction's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    pub function_name: &'static str,
    pub token_in: Address,
    pub token_out: Address,
}

/// Decodes a V2 `swapExactTokensForTokens` or V3 `exactInputSingle` call.
/// Returns `None` for any other selector — the confidence scan only needs
/// to recognize the handful of functions our own adapters use, not every
/// possible router call.
pub fn decode_calldata(input: &[u8]) -> Option<DecodedSwap> {
    if input.len() < 4 {
        return None;
    }

    if let Ok(call) = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(input, true) {
        return Some(DecodedSwap {
            function_name: "swapExactTokensForTokens",
            token_in: *call.path.first()?,
            token_out: *call.path.last()?,
        });
    }
    if let Ok(call) = ISwapRouter::exactInputSingleCall::abi_decode(input, true) {
        return Some(DecodedSwap {
            function_name: "exactInputSingle",
            token_in: call.params.tokenIn,
            token_out: call.params.tokenOut,
        });
    }
    None
}

/// One observation the scanner feeds through `confidence_for`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingObservation {
    pub decoded: DecodedSwap,
}

/// Bounded ring buffer of recently decoded pending swaps, fed by
/// `ChainClient::subscribe_pending_transactions` and drained into a
/// snapshot once per submission attempt. Bounding by count rather than
/// age keeps `confidence_for`'s denominator from growing unbounded
/// during a quiet mempool.
pub struct PendingTracker {
    capacity: usize,
    buffer: Mutex<VecDeque<PendingObservation>>,
}

impl PendingTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub async fn record(&self, decoded: DecodedSwap) {
        let mut buffer = self.buffer.lock().await;
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(PendingObservation { decoded });
    }

    pub async fn snapshot(&self) -> Vec<PendingObservation> {
        self.buffer.lock().await.iter().cloned().collect()
    }
}

/// Fractional confidence (0.0-1.0) that `pending` is sandwiching/front-running
/// our own `(token_in, token_out)` trade: 1.0 when every tracked pending
/// transaction trades the identical pair in the identical direction, 0.0
/// when none do. Matches spec.md §4.H's "scans ... for transactions
/// targeting the same pools with the same direction" — pair direction is
/// the proxy for pool identity since router calldata names tokens, not
/// pool addresses.
pub fn confidence_for(token_in: Address, token_out: Address, pending: &[PendingObservation]) -> f64 {
    if pending.is_empty() {
        return 0.0;
    }
    let matches = pending
        .iter()
        .filter(|p| p.decoded.token_in == token_in && p.decoded.token_out == token_out)
        .count();
    matches as f64 / pending.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn obs(token_in: Address, token_out: Address) -> PendingObservation {
        PendingObservation {
            decoded: DecodedSwap {
                function_name: "swapExactTokensForTokens",
                token_in,
                token_out,
            },
        }
    }

    #[test]
    fn decodes_v2_swap_exact_tokens_for_tokens() {
        let call = IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: alloy::primitives::U256::from(1_000u64),
            amountOutMin: alloy::primitives::U256::from(1u64),
            path: vec![addr(1), addr(2), addr(3)],
            to: addr(9),
            deadline: alloy::primitives::U256::from(0u64),
        };
        let encoded = call.abi_encode();
        let decoded = decode_calldata(&encoded).unwrap();
        assert_eq!(decoded.token_in, addr(1));
        assert_eq!(decoded.token_out, addr(3));
    }

    #[test]
    fn unrecognized_selector_decodes_to_none() {
        assert!(decode_calldata(&[0xde, 0xad, 0xbe, 0xef]).is_none());
    }

    #[test]
    fn confidence_is_fraction_of_matching_direction() {
        let token_in = addr(1);
        let token_out = addr(2);
        let pending = vec![
            obs(token_in, token_out),
            obs(token_in, token_out),
            obs(addr(5), addr(6)),
        ];
        assert!((confidence_for(token_in, token_out, &pending) - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_zero_with_no_observations() {
        assert_eq!(confidence_for(addr(1), addr(2), &[]), 0.0);
    }

    #[tokio::test]
    async fn tracker_evicts_oldest_past_capacity() {
        let tracker = PendingTracker::new(2);
        for byte in 1..=3u8 {
            tracker
                .record(DecodedSwap {
                    function_name: "swapExactTokensForTokens",
                    token_in: addr(byte),
                    token_out: addr(byte + 10),
                })
                .await;
        }
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].decoded.token_in, addr(2));
        assert_eq!(snapshot[1].decoded.token_in, addr(3));
    }
}
