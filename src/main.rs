//! Cross-DEX flash-loan arbitrage engine — process entry point.
//!
//! Loads configuration, brings up the Chain Client and Pool Registry, and
//! hands both to the Orchestrator. Shutdown is signal-driven: SIGINT/SIGTERM
//! cancel the Orchestrator's `CancellationToken` and the process exits once
//! its run loop observes it.

use anyhow::Result;
use arb_engine::chain::ChainClient;
use arb_engine::orchestrator::Orchestrator;
use arb_engine::registry::PoolRegistry;
use arb_engine::{telemetry, BotConfig};
use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use tracing::info;

/// Blocks used for a pool's first cooldown step after one quote failure;
/// matches the registry's own test defaults (`PoolCooldown::new(10)`).
const INITIAL_POOL_COOLDOWN_BLOCKS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_subscriber();

    let config = Arc::new(BotConfig::load()?);
    info!(chain_id = config.chain_id, dry_run = config.dry_run, "loading engine configuration");

    let chain = Arc::new(ChainClient::connect(&config).await?);
    let registry = Arc::new(PoolRegistry::new(
        config.pool_failure_cooldown_threshold,
        INITIAL_POOL_COOLDOWN_BLOCKS,
    ));

    let orchestrator = Orchestrator::new(Arc::clone(&config), chain, registry);
    let cancellation = orchestrator.cancellation();

    let signals = Signals::new([SIGINT, SIGTERM])?;
    let signal_handle = signals.handle();
    let signal_task = tokio::spawn(async move {
        let mut signals = signals;
        if signals.next().await.is_some() {
            info!("shutdown signal received");
            cancellation.cancel();
        }
    });

    orchestrator.run().await;

    signal_handle.close();
    signal_task.await.ok();
    info!("engine stopped");
    Ok(())
}
