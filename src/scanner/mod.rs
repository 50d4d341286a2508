//! Market Scanner — concurrent quote fan-out over every discovered pool
//! for the configured token universe, cancelled and restarted whenever a
//! new chain head arrives mid-scan.
//!
//! The tick loop (see `run`) is the same shape as the teacher's
//! `mempool::monitor::run_observation_inner`'s `tokio::select!` between a
//! subscription stream and a periodic timer; here the two arms are "new
//! head arrived" and "minimum inter-scan interval elapsed". The
//! `max_parallel_requests` ceiling is a `tokio::sync::Semaphore`, the
//! same primitive the Chain Client's rate limiter is built on.

use crate::registry::PoolRegistry;
use crate::types::{Pool, PoolSample, ProtocolKind, Quote};
use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Fetches a `PoolSample` for a single pool and prices a probe trade
/// through it. Supplied by the caller (normally backed by `ChainClient` +
/// `contracts.rs` + `adapters::quote`) so the scanner stays
/// transport-agnostic and testable against fakes.
#[async_trait::async_trait]
pub trait PoolSampler: Send + Sync {
    async fn quote(
        &self,
        pool: &Pool,
        token_in: Address,
        amount_in: U256,
        current_block: u64,
    ) -> Option<Quote>;
}

pub struct ScanResult {
    pub quotes_by_pair: HashMap<(Address, Address), Vec<Quote>>,
    pub block_height: u64,
}

/// Runs one scan: for every unordered pair among `tokens` and every
/// configured protocol, discovers pools via the registry (fanning the
/// discovery itself out so multiple pairs don't serialize behind each
/// other) and fans out one probe quote per non-cooled-down pool, bounded
/// by `max_parallel_requests` in flight. Quotes older than one block
/// relative to `current_block` are discarded before being returned.
pub async fn scan_once<S, D, DFut>(
    registry: &PoolRegistry,
    sampler: &S,
    tokens: &[Address],
    probe_amount: U256,
    protocols: &[ProtocolKind],
    current_block: u64,
    max_parallel_requests: usize,
    discover: D,
) -> ScanResult
where
    S: PoolSampler,
    D: Fn(ProtocolKind, Address, Address) -> DFut,
    DFut: std::future::Future<Output = Vec<Pool>>,
{
    let mut candidate_pools: Vec<Pool> = Vec::new();
    for i in 0..tokens.len() {
        for j in (i + 1)..tokens.len() {
            let (a, b) = (tokens[i], tokens[j]);
            for &protocol in protocols {
                let handles = registry
                    .get_or_discover(protocol, a, b, || discover(protocol, a, b))
                    .await;
                for handle in handles {
                    if let Some(pool) = registry.get(handle) {
                        if !registry.is_cooled_down(pool.id, current_block) {
                            candidate_pools.push(pool);
                        }
                    }
                }
            }
        }
    }

    // Every pool is quoted in both directions — `QuoteGraph` keys its
    // edges on `quote.token_in`, and pools are always stored with
    // `token0.address < token1.address`, so a single token0->token1 quote
    // per pool would only ever produce edges that increase in address
    // order and `find_cycles` could never close a cycle back to the base
    // token.
    let mut directed_pools: Vec<(Pool, Address)> = Vec::with_capacity(candidate_pools.len() * 2);
    for pool in candidate_pools {
        directed_pools.push((pool.clone(), pool.token0.address));
        directed_pools.push((pool.clone(), pool.token1.address));
    }

    let semaphore = Arc::new(Semaphore::new(max_parallel_requests.max(1)));
    let tasks = directed_pools.into_iter().map(|(pool, token_in)| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            let quote = sampler.quote(&pool, token_in, probe_amount, current_block).await;
            (pool, quote)
        }
    });

    let results = futures::future::join_all(tasks).await;

    let mut quotes_by_pair: HashMap<(Address, Address), Vec<Quote>> = HashMap::new();
    for (pool, maybe_quote) in results {
        match maybe_quote {
            Some(quote) if quote.is_fresh(current_block) => {
                let key = sorted_pair(pool.token0.address, pool.token1.address);
                quotes_by_pair.entry(key).or_default().push(quote);
                registry.record_quote_success(pool.id);
            }
            Some(_) => {
                debug!(pool = %pool.id, "discarded stale quote from scan");
            }
            None => {
                debug!(pool = %pool.id, "quote sampling failed");
                registry.record_quote_failure(pool.id, current_block);
            }
        }
    }

    ScanResult {
        quotes_by_pair,
        block_height: current_block,
    }
}

fn sorted_pair(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Tick loop: scans on every new head, or after `min_interval` elapses
/// with no new head, whichever comes first. If a new head arrives while
/// a scan is still running, the in-flight scan is cancelled (its future
/// simply dropped — partial results are never published) and a fresh
/// scan starts against the new head, preserving same-block consistency
/// the component design requires.
pub async fn run<S, D, DFut>(
    registry: Arc<PoolRegistry>,
    sampler: Arc<S>,
    tokens: Vec<Address>,
    probe_amount: U256,
    protocols: Vec<ProtocolKind>,
    max_parallel_requests: usize,
    min_interval: std::time::Duration,
    mut new_heads: tokio::sync::mpsc::Receiver<u64>,
    discover: D,
    on_result: tokio::sync::mpsc::Sender<ScanResult>,
) where
    S: PoolSampler + 'static,
    D: Fn(ProtocolKind, Address, Address) -> DFut + Copy + Send + 'static,
    DFut: std::future::Future<Output = Vec<Pool>> + Send,
{
    let mut current_block = 0u64;

    loop {
        // Wait for whichever fires first: a new head, or the minimum
        // inter-scan interval with no new head at all.
        tokio::select! {
            Some(head) = new_heads.recv() => { current_block = head; }
            _ = tokio::time::sleep(min_interval) => {}
        }

        let scan_fut = scan_once(
            &registry,
            &*sampler,
            &tokens,
            probe_amount,
            &protocols,
            current_block,
            max_parallel_requests,
            discover,
        );
        tokio::pin!(scan_fut);

        // Race the scan itself against a new head arriving mid-scan;
        // cancellation here means dropping `scan_fut` without publishing
        // its (now stale) partial results, per the component design.
        tokio::select! {
            biased;
            Some(head) = new_heads.recv() => {
                current_block = head;
            }
            result = &mut scan_fut => {
                if on_result.send(result).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PoolId, Token};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedSampler {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl PoolSampler for FixedSampler {
        async fn quote(
            &self,
            pool: &Pool,
            token_in: Address,
            amount_in: U256,
            current_block: u64,
        ) -> Option<Quote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let token_out = pool.other_side(&token_in)?.address;
            Some(Quote {
                pool: pool.id,
                token_in,
                token_out,
                amount_in,
                amount_out: amount_in,
                price_impact: 0.0,
                timestamp: 0,
                block_height: current_block,
            })
        }
    }

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    #[tokio::test]
    async fn scan_discovers_and_quotes_every_pair() {
        let registry = PoolRegistry::new(3, 10);
        let a = addr(1);
        let b = addr(2);
        let sampler = FixedSampler { calls: AtomicU32::new(0) };

        let result = scan_once(
            &registry,
            &sampler,
            &[a, b],
            U256::from(1_000u64),
            &[ProtocolKind::V2],
            100,
            4,
            |protocol, x, y| async move {
                vec![Pool {
                    id: PoolId { protocol, address: addr(10) },
                    token0: Token::new(x, 18, "A"),
                    token1: Token::new(y, 18, "B"),
                    fee_bps: 30,
                    last_seen_block: 100,
                    consecutive_failures: 0,
                }]
            },
        )
        .await;

        // One pool, quoted in both directions.
        assert_eq!(sampler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.quotes_by_pair.len(), 1);
        assert_eq!(result.quotes_by_pair.values().next().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn scan_emits_quotes_in_both_directions() {
        let registry = PoolRegistry::new(3, 10);
        let a = addr(1);
        let b = addr(2);
        let sampler = FixedSampler { calls: AtomicU32::new(0) };

        let result = scan_once(
            &registry,
            &sampler,
            &[a, b],
            U256::from(1_000u64),
            &[ProtocolKind::V2],
            100,
            4,
            |protocol, x, y| async move {
                vec![Pool {
                    id: PoolId { protocol, address: addr(10) },
                    token0: Token::new(x, 18, "A"),
                    token1: Token::new(y, 18, "B"),
                    fee_bps: 30,
                    last_seen_block: 100,
                    consecutive_failures: 0,
                }]
            },
        )
        .await;

        let quotes = result.quotes_by_pair.values().next().unwrap();
        assert!(quotes.iter().any(|q| q.token_in == a && q.token_out == b));
        assert!(quotes.iter().any(|q| q.token_in == b && q.token_out == a));
    }
}
