//! Execution Orchestrator — drives tick → scan → evaluate → plan →
//! simulate → submit → record, independently for every configured base
//! token, enforcing at most one in-flight cycle per base token.
//!
//! Grounded on the teacher's `mempool::monitor::run_observation` outer
//! supervise-and-reconnect loop, generalized from its single hardcoded
//! pair into one supervised task per configured base token. Cancellation
//! is the hand-rolled `CancellationToken` in `cancellation.rs`.

pub mod cancellation;

use crate::chain::{discover_pools, ChainClient, ChainPoolSampler};
use crate::config::BotConfig;
use crate::pathfinder::{find_cycles, QuoteGraph};
use crate::planner::{self, ProviderCandidate};
use crate::registry::PoolRegistry;
use crate::scanner::{self, ScanResult};
use crate::submission::sandwich::PendingTracker;
use crate::submission::{self, SubmissionOutcome};
use crate::telemetry;
use crate::types::{FlashLoanProviderKind, ProtocolKind};
use alloy::primitives::{Address, U256};
use cancellation::CancellationToken;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How many recent decoded mempool swaps `sandwich::confidence_for` scores
/// against. Bounds the scan to a recent window without needing a
/// time-based eviction policy.
const PENDING_TRACKER_CAPACITY: usize = 512;

/// State every per-base-token cycle and the scan-dispatch loop share.
struct SharedState {
    config: Arc<BotConfig>,
    chain: Arc<ChainClient>,
    registry: Arc<PoolRegistry>,
    sampler: Arc<ChainPoolSampler>,
    /// One "cycle in flight" flag per configured base token — the
    /// Orchestrator's own instance of the component design's "at most
    /// one in-flight cycle per base token" invariant.
    busy: DashMap<Address, Arc<AtomicBool>>,
    /// Consecutive simulation failures per flash-loan provider kind, fed
    /// back into `planner::select_provider`'s reliability tiebreaker.
    provider_failures: DashMap<FlashLoanProviderKind, Arc<AtomicU32>>,
    /// Recently observed pending-mempool swaps, fed by the Chain Client's
    /// pending-transaction subscription and drained into a snapshot before
    /// every submission attempt's sandwich-risk check.
    pending: Arc<PendingTracker>,
    cancellation: CancellationToken,
}

pub struct Orchestrator {
    shared: Arc<SharedState>,
}

impl Orchestrator {
    pub fn new(config: Arc<BotConfig>, chain: Arc<ChainClient>, registry: Arc<PoolRegistry>) -> Self {
        let sampler = Arc::new(ChainPoolSampler::new(Arc::clone(&chain)));
        let busy = DashMap::new();
        for &token in &config.base_tokens {
            busy.insert(token, Arc::new(AtomicBool::new(false)));
        }
        Self {
            shared: Arc::new(SharedState {
                config,
                chain,
                registry,
                sampler,
                busy,
                provider_failures: DashMap::new(),
                pending: Arc::new(PendingTracker::new(PENDING_TRACKER_CAPACITY)),
                cancellation: CancellationToken::new(),
            }),
        }
    }

    /// A handle callers (`main`'s signal handler) can cancel to trigger
    /// graceful shutdown.
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancellation.clone()
    }

    /// Runs until cancelled: bridges the Chain Client's new-head
    /// subscription into the Market Scanner's tick loop, then dispatches
    /// each `ScanResult` to every configured base token's cycle.
    pub async fn run(self) {
        let shared = self.shared;

        let mut heads = shared.chain.subscribe_new_heads();
        let (head_tx, head_rx) = tokio::sync::mpsc::channel::<u64>(16);
        tokio::spawn(async move {
            while let Some(header) = heads.recv().await {
                if head_tx.send(header.number).await.is_err() {
                    return;
                }
            }
        });

        let (result_tx, mut result_rx) = tokio::sync::mpsc::channel::<ScanResult>(4);
        spawn_scanner(&shared, head_rx, result_tx);
        spawn_pending_tx_tracker(&shared);

        loop {
            tokio::select! {
                _ = shared.cancellation.cancelled() => {
                    info!("orchestrator: cancellation received, shutting down");
                    return;
                }
                maybe_result = result_rx.recv() => {
                    let Some(result) = maybe_result else {
                        warn!("orchestrator: scanner channel closed, shutting down");
                        return;
                    };
                    dispatch(&shared, Arc::new(result));
                }
            }
        }
    }
}

/// Spawns the Market Scanner's tick loop wired to live RPC discovery and
/// sampling. The `discover` closure must be `Copy` (scanner::run's
/// bound), so the Chain Client handle and config it needs are leaked to
/// `'static` references once here rather than captured by `Arc` — sound
/// because both outlive the process (the Orchestrator runs for the
/// program's whole lifetime, never torn down and rebuilt).
fn spawn_scanner(
    shared: &Arc<SharedState>,
    head_rx: tokio::sync::mpsc::Receiver<u64>,
    result_tx: tokio::sync::mpsc::Sender<ScanResult>,
) {
    let config = Arc::clone(&shared.config);
    let chain_for_discovery: &'static Arc<ChainClient> = Box::leak(Box::new(Arc::clone(&shared.chain)));
    let config_for_discovery: &'static BotConfig = Box::leak(Box::new((*config).clone()));

    let registry = Arc::clone(&shared.registry);
    let sampler = Arc::clone(&shared.sampler);
    let tokens = config.tokens.iter().map(|t| t.address).collect::<Vec<_>>();
    let probe_amount = config.min_amount_in;
    let max_parallel_requests = config.max_parallel_requests;
    let min_interval = Duration::from_millis(config.poll_interval_ms);

    tokio::spawn(async move {
        scanner::run(
            registry,
            sampler,
            tokens,
            probe_amount,
            vec![ProtocolKind::V2, ProtocolKind::V3],
            max_parallel_requests,
            min_interval,
            head_rx,
            move |protocol, a, b| async move {
                discover_pools(chain_for_discovery, config_for_discovery, protocol, a, b).await
            },
            result_tx,
        )
        .await;
    });
}

/// Bridges the Chain Client's public-mempool subscription into `shared`'s
/// `PendingTracker`, decoding each pending transaction's calldata with
/// `sandwich::decode_calldata` and dropping anything unrecognized — the
/// Sandwich Detector only needs to recognize the handful of router
/// functions our own adapters use.
fn spawn_pending_tx_tracker(shared: &Arc<SharedState>) {
    let chain = Arc::clone(&shared.chain);
    let pending = Arc::clone(&shared.pending);
    tokio::spawn(async move {
        let mut mempool = chain.subscribe_pending_transactions();
        while let Some(input) = mempool.recv().await {
            if let Some(decoded) = submission::sandwich::decode_calldata(&input) {
                pending.record(decoded).await;
            }
        }
        warn!("orchestrator: pending transaction channel closed");
    });
}

/// Fans `result` out to every configured base token whose previous cycle
/// has already detached, skipping the rest — the per-base-token
/// "rate-limit rapid re-entry" behavior the component design calls for.
fn dispatch(shared: &Arc<SharedState>, result: Arc<ScanResult>) {
    for entry in shared.busy.iter() {
        let base_token = *entry.key();
        let flag = Arc::clone(entry.value());
        if flag.swap(true, Ordering::SeqCst) {
            continue; // previous cycle for this base token hasn't detached yet
        }

        let shared = Arc::clone(shared);
        let result = Arc::clone(&result);
        tokio::spawn(async move {
            run_cycle(&shared, base_token, &result).await;
            flag.store(false, Ordering::SeqCst);
        });
    }
}

async fn run_cycle(shared: &SharedState, base_token: Address, scan: &ScanResult) {
    let config = &shared.config;
    let started = Instant::now();
    telemetry::cycle_started(base_token, scan.block_height);

    if shared.cancellation.is_cancelled() {
        return;
    }

    let graph = QuoteGraph::build(&scan.quotes_by_pair);
    let paths = find_cycles(
        &graph,
        base_token,
        &config.intermediate_tokens,
        config.max_hops,
        config.price_impact_ceiling,
    );
    if paths.is_empty() || shared.cancellation.is_cancelled() {
        telemetry::cycle_finished(base_token, scan.block_height, 0, started.elapsed().as_millis());
        return;
    }

    let gas_price = gas_price_wei(config);
    let opportunities = crate::evaluator::evaluate(
        &paths,
        &shared.registry,
        &*shared.sampler,
        config,
        gas_price,
        config.max_amount_in,
        scan.block_height,
    )
    .await;

    if let Some(best) = opportunities.first() {
        telemetry::opportunity_detected(
            base_token,
            best.path.len(),
            &best.gross_out.to_string(),
            &best.net_profit.to_string(),
        );
    }

    let Some(best) = opportunities.into_iter().next() else {
        telemetry::cycle_finished(base_token, scan.block_height, 0, started.elapsed().as_millis());
        return;
    };

    if shared.cancellation.is_cancelled() {
        return;
    }

    let candidates = provider_candidates(config, &shared.provider_failures);
    let mut plan = match planner::build_plan(
        best,
        &shared.registry,
        &*shared.sampler,
        &candidates,
        config.max_slippage_bps,
        scan.block_height,
    )
    .await
    {
        Ok(plan) => plan,
        Err(err) => {
            telemetry::opportunity_rejected(base_token, &err.to_string());
            telemetry::cycle_finished(base_token, scan.block_height, 0, started.elapsed().as_millis());
            return;
        }
    };

    if shared.cancellation.is_cancelled() {
        return;
    }

    let Some(provider_address) = candidates.iter().find(|c| c.kind == plan.provider).map(|c| c.address) else {
        telemetry::opportunity_rejected(base_token, "no configured address for selected flash-loan provider");
        return;
    };

    let plan_id = format!("{base_token}-{}", scan.block_height);
    let simulate_result = planner::simulate(&mut plan, &shared.chain, provider_address, config.arb_executor).await;
    match simulate_result {
        Ok(()) => {
            telemetry::plan_simulated(&plan_id, true, None);
            record_provider_outcome(&shared.provider_failures, plan.provider, true);
        }
        Err(err) => {
            telemetry::plan_simulated(&plan_id, false, Some(&err.to_string()));
            record_provider_outcome(&shared.provider_failures, plan.provider, false);
            telemetry::cycle_finished(base_token, scan.block_height, 1, started.elapsed().as_millis());
            return;
        }
    }

    if config.dry_run {
        info!(event = "dry_run_plan_built", plan_id, "dry run: plan simulated OK, not submitting");
        telemetry::cycle_finished(base_token, scan.block_height, 1, started.elapsed().as_millis());
        return;
    }

    if shared.cancellation.is_cancelled() {
        // Per the component design: a cancelled cycle never cancels an
        // already-submitted bundle, but simulate-only work up to this
        // point is safely discarded.
        return;
    }

    let calldata = planner::encode_flash_loan_call(&plan, config.arb_executor, U256::ZERO);
    let pending = shared.pending.snapshot().await;
    match submission::submit(
        &plan,
        calldata,
        provider_address,
        &shared.chain,
        config,
        scan.block_height,
        &pending,
    )
    .await
    {
        Ok(SubmissionOutcome::Included { tx_hash, block }) => {
            info!(event = "cycle_succeeded", tx_hash, block, base_token = %base_token);
        }
        Ok(SubmissionOutcome::Cancelled { reason }) => {
            warn!(event = "cycle_cancelled", base_token = %base_token, reason);
        }
        Ok(SubmissionOutcome::Expired) => {
            warn!(event = "cycle_expired", base_token = %base_token);
        }
        Err(err) => {
            telemetry::engine_error("submission", &err);
        }
    }

    telemetry::cycle_finished(base_token, scan.block_height, 1, started.elapsed().as_millis());
}

fn gas_price_wei(config: &BotConfig) -> U256 {
    U256::from(config.gas_price_gwei_estimate) * U256::from(1_000_000_000u64)
}

/// Builds the Planner's candidate list from whichever providers are
/// configured. Available liquidity isn't live-queried against the
/// provider's own balance (no teacher counterpart reads Aave/Balancer
/// reserves) — `max_amount_in` stands in as the ceiling the Evaluator
/// already sized against.
fn provider_candidates(
    config: &BotConfig,
    failures: &DashMap<FlashLoanProviderKind, Arc<AtomicU32>>,
) -> Vec<ProviderCandidate> {
    let mut candidates = Vec::new();
    if let Some(address) = config.aave_pool {
        candidates.push(ProviderCandidate {
            kind: FlashLoanProviderKind::AaveStyle,
            address,
            fee_bps: 0,
            available_liquidity: config.max_amount_in,
            recent_failure_count: failure_count(failures, FlashLoanProviderKind::AaveStyle),
        });
    }
    if let Some(address) = config.balancer_vault {
        candidates.push(ProviderCandidate {
            kind: FlashLoanProviderKind::BalancerStyle,
            address,
            fee_bps: config.flash_loan_fee_bps_estimate,
            available_liquidity: config.max_amount_in,
            recent_failure_count: failure_count(failures, FlashLoanProviderKind::BalancerStyle),
        });
    }
    candidates
}

fn failure_count(failures: &DashMap<FlashLoanProviderKind, Arc<AtomicU32>>, kind: FlashLoanProviderKind) -> u32 {
    failures.get(&kind).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0)
}

fn record_provider_outcome(failures: &DashMap<FlashLoanProviderKind, Arc<AtomicU32>>, kind: FlashLoanProviderKind, ok: bool) {
    let counter = failures.entry(kind).or_insert_with(|| Arc::new(AtomicU32::new(0)));
    if ok {
        counter.store(0, Ordering::SeqCst);
    } else {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}
