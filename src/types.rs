//! Core data model shared by every component.
//!
//! Token, Pool, Quote, Path, Opportunity, ExecutionPlan and Bundle map
//! directly onto the system's data model: each type is produced by one
//! component and consumed by the next, and (aside from the Pool Registry's
//! own cache) none of them outlive a single scan cycle.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A traded ERC-20 token. Immutable once loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl Token {
    pub fn new(address: Address, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            address,
            decimals,
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Protocol family a pool belongs to. A closed tagged union rather than a
/// trait object — dispatch on `ProtocolKind` is static, never dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// Constant-product AMM (Uniswap V2 / SushiSwap / QuickSwap V2 forks).
    V2,
    /// Concentrated-liquidity AMM (Uniswap V3 / SushiSwap V3, and the
    /// Algebra-style dynamic-fee variant used by QuickSwap V3).
    V3,
    /// StableSwap invariant (Curve-style, low-slippage correlated pairs).
    Stable,
    /// Weighted constant-product (Balancer-style, N tokens with weights).
    Weighted,
}

impl ProtocolKind {
    pub fn is_concentrated_liquidity(&self) -> bool {
        matches!(self, ProtocolKind::V3)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::V2 => write!(f, "v2"),
            ProtocolKind::V3 => write!(f, "v3"),
            ProtocolKind::Stable => write!(f, "stable"),
            ProtocolKind::Weighted => write!(f, "weighted"),
        }
    }
}

/// Identity of a pool: protocol + on-chain address. Two pools with the
/// same address but different protocol tags are never the same pool —
/// the tag disambiguates forked deployments that reuse bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId {
    pub protocol: ProtocolKind,
    pub address: Address,
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.protocol, self.address)
    }
}

/// Opaque handle into the Pool Registry's arena. Adapters and callers
/// carry this instead of a pointer or clone of `Pool` so the registry
/// remains the sole owner of pool state (Design Note: "Pointer graphs in
/// the Pool Registry" → arena of records with integer-handle references).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolHandle(pub u32);

/// Cached attributes of a discovered pool. Discovered once, mutated only
/// by the Pool Registry, evicted only on explicit invalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    /// Token pair, always stored with `token0.address < token1.address`.
    pub token0: Token,
    pub token1: Token,
    /// V3: one of {100, 500, 2500, 3000, 10000}. V2/Stable/Weighted: the
    /// pool's flat fee in basis points (V2 forks are almost always 30).
    pub fee_bps: u32,
    pub last_seen_block: u64,
    /// Consecutive quote failures since the last success; the registry
    /// evicts the entry once this reaches the configured threshold.
    pub consecutive_failures: u32,
}

impl Pool {
    pub fn contains_token(&self, token: &Address) -> bool {
        &self.token0.address == token || &self.token1.address == token
    }

    /// The token on the other side of this pool from `token_in`.
    pub fn other_side(&self, token_in: &Address) -> Option<&Token> {
        if &self.token0.address == token_in {
            Some(&self.token1)
        } else if &self.token1.address == token_in {
            Some(&self.token0)
        } else {
            None
        }
    }
}

/// A snapshot of on-chain pool state just fetched over RPC, shaped
/// per-protocol. Adapters consume this to price a trade without issuing
/// another round trip; the Pool Registry never stores it — reserves move
/// every block, so nothing here survives past the scan cycle that fetched it.
#[derive(Debug, Clone)]
pub enum PoolSample {
    V2 {
        reserve0: U256,
        reserve1: U256,
    },
    V3 {
        sqrt_price_x96: U256,
        tick: i32,
        liquidity: u128,
    },
    Stable {
        balances: Vec<U256>,
        amplification: u64,
    },
    Weighted {
        balances: Vec<U256>,
        weights: Vec<u64>, // basis points, sums to 10_000
    },
}

/// A freshly produced quote for swapping `amount_in` of `token_in` through
/// a single pool. Never persisted beyond the scan cycle that produced it.
#[derive(Debug, Clone)]
pub struct Quote {
    pub pool: PoolId,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Fractional price impact of this trade, e.g. 0.004 = 0.4%.
    pub price_impact: f64,
    pub timestamp: u64,
    pub block_height: u64,
}

impl Quote {
    /// A quote is usable only within the block it was produced in — the
    /// scanner discards anything older than one block before it is ever
    /// handed to the Path Finder.
    pub fn is_fresh(&self, current_block: u64) -> bool {
        current_block.saturating_sub(self.block_height) <= 1
    }
}

/// A single leg of a Path: swap `input_token` for `output_token` through
/// `pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub pool: PoolId,
    pub input_token: Address,
    pub output_token: Address,
}

/// An ordered sequence of 2-4 hops that starts and ends at the same
/// (base) token — the defining invariant of a circular arbitrage cycle.
#[derive(Debug, Clone)]
pub struct Path {
    pub hops: Vec<Hop>,
}

impl Path {
    pub fn new(hops: Vec<Hop>) -> Self {
        Self { hops }
    }

    pub fn base_token(&self) -> Option<Address> {
        self.hops.first().map(|h| h.input_token)
    }

    /// Enforces `path[0].token_in == path[-1].token_out == base_token`.
    pub fn is_circular(&self) -> bool {
        match (self.hops.first(), self.hops.last()) {
            (Some(first), Some(last)) => first.input_token == last.output_token,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn pools(&self) -> impl Iterator<Item = &PoolId> {
        self.hops.iter().map(|h| &h.pool)
    }
}

/// A ranked, not-yet-executed arbitrage candidate. Created by the
/// Evaluator, consumed exactly once by the Planner, then discarded.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub path: Path,
    pub amount_in: U256,
    pub gross_out: U256,
    pub gas_estimate_units: u64,
    pub gas_price: U256,
    pub flash_loan_fee: U256,
    pub net_profit: U256,
    /// 0.0-1.0 — derived from quote freshness and price-impact headroom;
    /// purely informational, never gates profitability on its own.
    pub confidence: f64,
}

impl Opportunity {
    pub fn base_token(&self) -> Option<Address> {
        self.path.base_token()
    }
}

/// One step of the on-chain call sequence a plan will execute atomically.
#[derive(Debug, Clone)]
pub enum PlanStep {
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    Swap {
        pool: PoolId,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        min_out: U256,
        calldata: Vec<u8>,
    },
    Repay {
        provider: Address,
        token: Address,
        amount: U256,
    },
}

/// Provider offering the uncollateralized loan that funds a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlashLoanProviderKind {
    /// Aave-style `flashLoanSimple`, typically zero-fee for the primary
    /// configured provider.
    AaveStyle,
    /// Balancer-style `flashLoan`, typically a fixed small bps fee.
    BalancerStyle,
}

/// Immutable once built: the concrete on-chain operation list a simulated
/// or submitted transaction will execute.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub opportunity: Opportunity,
    pub provider: FlashLoanProviderKind,
    pub loan_token: Address,
    pub loan_amount: U256,
    pub steps: Vec<PlanStep>,
    pub simulated_output: Option<U256>,
    pub expected_gas: u64,
    pub state: PlanState,
}

/// `Built -> Simulated-OK -> Handed-to-Submission` or
/// `Built -> Simulated-Reverted -> Discarded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanState {
    Built,
    SimulatedOk,
    SimulatedReverted { reason: String },
    HandedToSubmission,
    Discarded,
}

/// Submission state of a bundle.
/// `Submitted(block=N) -> Submitted(block=N+1) -> ... -> Included(tx,block)`
/// or `Cancelled(reason)` or `Expired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleState {
    Submitted { target_block: u64 },
    Included { tx_hash: String, block: u64 },
    Cancelled { reason: String },
    Expired,
}

/// One Bundle per Opportunity; the Orchestrator is the sole mutator.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub raw_transaction: Vec<u8>,
    pub target_block_range: (u64, u64),
    pub min_effective_tip: U256,
    pub relay_bundle_id: Option<String>,
    pub submission_timestamps: Vec<(u64, u64)>,
    pub state: BundleState,
}

impl Bundle {
    pub fn new(raw_transaction: Vec<u8>, target_block_range: (u64, u64), min_effective_tip: U256) -> Self {
        Self {
            raw_transaction,
            target_block_range,
            min_effective_tip,
            relay_bundle_id: None,
            submission_timestamps: Vec::new(),
            state: BundleState::Submitted {
                target_block: target_block_range.0,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            BundleState::Included { .. } | BundleState::Cancelled { .. } | BundleState::Expired
        )
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    #[test]
    fn path_is_circular_when_endpoints_match() {
        let base = addr(1);
        let mid = addr(2);
        let pool_a = PoolId {
            protocol: ProtocolKind::V2,
            address: addr(10),
        };
        let pool_b = PoolId {
            protocol: ProtocolKind::V3,
            address: addr(11),
        };
        let path = Path::new(vec![
            Hop {
                pool: pool_a,
                input_token: base,
                output_token: mid,
            },
            Hop {
                pool: pool_b,
                input_token: mid,
                output_token: base,
            },
        ]);
        assert!(path.is_circular());
        assert_eq!(path.base_token(), Some(base));
    }

    #[test]
    fn path_is_not_circular_when_endpoints_differ() {
        let path = Path::new(vec![Hop {
            pool: PoolId {
                protocol: ProtocolKind::V2,
                address: addr(10),
            },
            input_token: addr(1),
            output_token: addr(2),
        }]);
        assert!(!path.is_circular());
    }

    #[test]
    fn quote_freshness_respects_one_block_window() {
        let quote = Quote {
            pool: PoolId {
                protocol: ProtocolKind::V2,
                address: addr(1),
            },
            token_in: addr(1),
            token_out: addr(2),
            amount_in: U256::from(1u64),
            amount_out: U256::from(1u64),
            price_impact: 0.0,
            timestamp: 0,
            block_height: 100,
        };
        assert!(quote.is_fresh(100));
        assert!(quote.is_fresh(101));
        assert!(!quote.is_fresh(102));
    }

    #[test]
    fn bundle_terminal_states() {
        let mut bundle = Bundle::new(vec![], (10, 13), U256::from(1u64));
        assert!(!bundle.is_terminal());
        bundle.state = BundleState::Expired;
        assert!(bundle.is_terminal());
    }
}
