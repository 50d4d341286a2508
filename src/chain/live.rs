//! Live pool discovery and quote sampling, backed by `ChainClient` and the
//! generated bindings in `contracts.rs`.
//!
//! Grounded on `bin/backfill_events.rs`'s contract-instance call idiom
//! (`UniswapV3Pool::new(addr, &provider).token0().call().await`) — the
//! Market Scanner's `PoolSampler` trait and the Pool Registry's
//! `discover` closure are both satisfied here with that same idiom,
//! rather than hand-assembling `eth_call` requests.

use crate::adapters;
use crate::config::BotConfig;
use crate::contracts::{IUniswapV2Factory, IUniswapV2Pair, UniswapV3Factory, UniswapV3Pool};
use crate::scanner::PoolSampler;
use crate::types::{now_unix, Pool, PoolId, PoolSample, ProtocolKind, Quote, Token};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::ChainClient;

/// Fee tiers Uniswap V3's factory actually deploys
/// (`UniswapV3Factory.feeAmountTickSpacing`); SushiSwap V3 and other V3
/// forks reuse the same set.
const V3_FEE_TIERS: [u32; 4] = [100, 500, 3_000, 10_000];

/// `PoolSampler` backed by real RPC reads. V2 reads `getReserves`, V3
/// reads `slot0` + `liquidity`. Stable and Weighted pools have no
/// generated binding in `contracts.rs` (the teacher never traded against
/// a Curve/Balancer pool either) — sampling one always misses, same as
/// any other pool the adapter can't price.
pub struct ChainPoolSampler {
    chain: Arc<ChainClient>,
}

impl ChainPoolSampler {
    pub fn new(chain: Arc<ChainClient>) -> Self {
        Self { chain }
    }

    async fn sample(&self, pool: &Pool) -> Option<PoolSample> {
        match pool.id.protocol {
            ProtocolKind::V2 => {
                let reserves = IUniswapV2Pair::new(pool.id.address, self.chain.rpc())
                    .getReserves()
                    .call()
                    .await
                    .ok()?;
                Some(PoolSample::V2 {
                    reserve0: U256::from(reserves.reserve0),
                    reserve1: U256::from(reserves.reserve1),
                })
            }
            ProtocolKind::V3 => {
                let pool_contract = UniswapV3Pool::new(pool.id.address, self.chain.rpc());
                let slot0 = pool_contract.slot0().call().await.ok()?;
                let liquidity = pool_contract.liquidity().call().await.ok()?;
                Some(PoolSample::V3 {
                    sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
                    tick: slot0.tick.as_i32(),
                    liquidity,
                })
            }
            ProtocolKind::Stable | ProtocolKind::Weighted => None,
        }
    }
}

#[async_trait]
impl PoolSampler for ChainPoolSampler {
    async fn quote(
        &self,
        pool: &Pool,
        token_in: Address,
        amount_in: U256,
        current_block: u64,
    ) -> Option<Quote> {
        self.chain.throttle().await;
        let sample = self.sample(pool).await?;
        adapters::quote(pool, &sample, token_in, amount_in, current_block, now_unix()).ok()
    }
}

/// Discovers every pool for `(token_a, token_b)` under `protocol`: a
/// single V2 pair from the configured factory, or one V3 pool per fee
/// tier that the factory actually deployed. Fed to
/// `PoolRegistry::get_or_discover` as the `discover` closure.
pub async fn discover_pools(
    chain: &ChainClient,
    config: &BotConfig,
    protocol: ProtocolKind,
    token_a: Address,
    token_b: Address,
) -> Vec<Pool> {
    match protocol {
        ProtocolKind::V2 => {
            let mut found = Vec::new();
            for factory in [config.uniswap_v2_factory, config.sushiswap_v2_factory] {
                if let Some(pool) = discover_v2_pair(chain, factory, token_a, token_b).await {
                    found.push(pool);
                }
            }
            found
        }
        ProtocolKind::V3 => discover_v3_pools(chain, config.uniswap_v3_factory, token_a, token_b).await,
        ProtocolKind::Stable | ProtocolKind::Weighted => Vec::new(),
    }
}

async fn discover_v2_pair(
    chain: &ChainClient,
    factory: Address,
    token_a: Address,
    token_b: Address,
) -> Option<Pool> {
    chain.throttle().await;
    let pair_address = IUniswapV2Factory::new(factory, chain.rpc())
        .getPair(token_a, token_b)
        .call()
        .await
        .ok()?;
    if pair_address.is_zero() {
        return None;
    }
    build_v2_pool(chain, pair_address).await
}

async fn build_v2_pool(chain: &ChainClient, pair_address: Address) -> Option<Pool> {
    chain.throttle().await;
    let pair = IUniswapV2Pair::new(pair_address, chain.rpc());
    let token0 = pair.token0().call().await.ok()?;
    let token1 = pair.token1().call().await.ok()?;

    Some(Pool {
        id: PoolId { protocol: ProtocolKind::V2, address: pair_address },
        // Decimals/symbols are filled in from the configured token
        // universe by the caller that owns it; the registry only needs
        // the addresses to key on, so a placeholder Token is fine here.
        token0: Token::new(token0, 18, ""),
        token1: Token::new(token1, 18, ""),
        fee_bps: 30,
        last_seen_block: 0,
        consecutive_failures: 0,
    })
}

async fn discover_v3_pools(
    chain: &ChainClient,
    factory: Address,
    token_a: Address,
    token_b: Address,
) -> Vec<Pool> {
    let mut pools = Vec::new();
    for fee in V3_FEE_TIERS {
        chain.throttle().await;
        let pool_address = match UniswapV3Factory::new(factory, chain.rpc())
            .getPool(token_a, token_b, fee)
            .call()
            .await
        {
            Ok(addr) => addr,
            Err(e) => {
                debug!(fee, "v3 pool discovery call failed: {e}");
                continue;
            }
        };
        if pool_address.is_zero() {
            continue;
        }

        chain.throttle().await;
        let pool_contract = UniswapV3Pool::new(pool_address, chain.rpc());
        let (Ok(token0), Ok(token1)) = tokio::join!(pool_contract.token0().call(), pool_contract.token1().call())
        else {
            continue;
        };

        pools.push(Pool {
            id: PoolId { protocol: ProtocolKind::V3, address: pool_address },
            token0: Token::new(token0, 18, ""),
            token1: Token::new(token1, 18, ""),
            fee_bps: fee / 100,
            last_seen_block: 0,
            consecutive_failures: 0,
        });
    }
    pools
}
