//! DEX Adapters — per-protocol quote math behind a closed tagged union.
//!
//! Design Note: "Dynamic dispatch over 'DEX objects'" → replaced with a
//! single `quote` function that matches on `ProtocolKind` and calls the
//! matching module directly. No `dyn Trait`, no vtable — the compiler
//! sees every call site statically.

pub mod stable;
pub mod v2;
pub mod v3;
pub mod weighted;

use crate::error::{EngineError, EngineResult};
use crate::types::{Pool, PoolSample, Quote};
use alloy::primitives::{Address, U256};

/// Quotes swapping `amount_in` of `token_in` through `pool`, given a
/// freshly fetched `sample` of that pool's on-chain state, dispatching on
/// the pool's protocol tag. `current_block`/`timestamp` are stamped onto
/// the resulting `Quote` so freshness can be checked later without a
/// second RPC round trip.
pub fn quote(
    pool: &Pool,
    sample: &PoolSample,
    token_in: Address,
    amount_in: U256,
    current_block: u64,
    timestamp: u64,
) -> EngineResult<Quote> {
    let token_out = pool
        .other_side(&token_in)
        .map(|t| t.address)
        .ok_or(EngineError::PoolNotFound { pool: pool.id.address })?;
    let zero_for_one = pool.token0.address == token_in;

    let (amount_out, price_impact) = match (pool.id.protocol, sample) {
        (crate::types::ProtocolKind::V2, PoolSample::V2 { reserve0, reserve1 }) => {
            v2::quote(*reserve0, *reserve1, zero_for_one, amount_in, pool.fee_bps)
        }
        (crate::types::ProtocolKind::V3, PoolSample::V3 { sqrt_price_x96, tick, liquidity }) => {
            v3::quote(*sqrt_price_x96, *tick, *liquidity, zero_for_one, amount_in, pool.fee_bps)
        }
        (crate::types::ProtocolKind::Stable, PoolSample::Stable { balances, amplification }) => {
            stable::quote(balances, *amplification, zero_for_one, amount_in, pool.fee_bps)
        }
        (crate::types::ProtocolKind::Weighted, PoolSample::Weighted { balances, weights }) => {
            weighted::quote(balances, weights, zero_for_one, amount_in, pool.fee_bps)
        }
        _ => {
            return Err(EngineError::PoolNotFound { pool: pool.id.address });
        }
    };

    Ok(Quote {
        pool: pool.id,
        token_in,
        token_out,
        amount_in,
        amount_out,
        price_impact,
        timestamp,
        block_height: current_block,
    })
}
