//! `ChainClient` — the Market Scanner and Orchestrator's only window onto
//! the chain. Holds an ordered list of providers, each with its own
//! WS/HTTP pair and its own rate limiter, and fails over to the next one
//! in priority order on a transport error, mirroring the teacher's
//! `mempool::monitor` dual-handle split (one handle for the subscription
//! stream, one free for concurrent RPC calls) per configured endpoint.

use crate::config::BotConfig;
use crate::error::{EngineError, EngineResult};
use alloy::consensus::Transaction as _;
use alloy::network::Ethereum;
use alloy::primitives::Bytes;
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::Subscription;
use alloy::rpc::types::Header;
use alloy::signers::local::PrivateKeySigner;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::nonce::NonceManager;
use super::rate_limiter::RateLimiter;

/// Once failed over to, a provider is kept active for at least this long
/// before another failure is allowed to advance the list again — avoids
/// flapping back and forth between two flaky endpoints.
const STICKY_WINDOW: Duration = Duration::from_secs(30);

struct ProviderSlot {
    label: String,
    ws: RootProvider<Ethereum>,
    http: RootProvider<Ethereum>,
    rate_limiter: RateLimiter,
}

pub struct ChainClient {
    /// Priority order: index 0 is tried first; failover only ever moves
    /// forward through the list, per spec.md §4.A.
    providers: Vec<ProviderSlot>,
    active: AtomicUsize,
    last_failover: Mutex<Instant>,
    max_reconnects: u32,
    /// Serializes nonce assignment across the Orchestrator's concurrent
    /// per-base-token cycles, which all submit from the same wallet.
    nonce_manager: NonceManager,
}

impl ChainClient {
    /// Connects every configured provider in priority order, skipping (and
    /// warning about) any whose WS endpoint refuses the connection up
    /// front. At least one must succeed.
    pub async fn connect(config: &BotConfig) -> EngineResult<Self> {
        let mut providers = Vec::new();
        for endpoint in &config.provider_urls {
            match connect_slot(endpoint).await {
                Ok(slot) => providers.push(slot),
                Err(e) => warn!("provider {} failed to connect, skipping: {e}", endpoint.http_url),
            }
        }

        if providers.is_empty() {
            return Err(EngineError::NoHealthyProvider {
                last_error: "no configured provider connected".into(),
            });
        }

        let wallet_address = config
            .private_key
            .parse::<PrivateKeySigner>()
            .map_err(|e| EngineError::MissingSecret(format!("invalid wallet private key: {e}")))?
            .address();

        Ok(Self {
            providers,
            active: AtomicUsize::new(0),
            last_failover: Mutex::new(Instant::now() - STICKY_WINDOW),
            max_reconnects: config.max_reconnects,
            nonce_manager: NonceManager::new(wallet_address),
        })
    }

    /// Shared across every concurrent cycle submitting from this wallet —
    /// see `submission::sign_raw_transaction`.
    pub fn nonce_manager(&self) -> &NonceManager {
        &self.nonce_manager
    }

    fn active_index(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn active_slot(&self) -> &ProviderSlot {
        &self.providers[self.active_index()]
    }

    /// Advances to the next provider in priority order, if the sticky
    /// window has elapsed since the last switch and there is one left.
    /// A no-op once the list is exhausted — the caller sees the last
    /// provider's own error in that case.
    fn failover(&self) {
        let mut last = self.last_failover.lock().expect("failover mutex poisoned");
        if last.elapsed() < STICKY_WINDOW {
            return;
        }
        let idx = self.active_index();
        if idx + 1 >= self.providers.len() {
            return;
        }
        self.active.store(idx + 1, Ordering::SeqCst);
        *last = Instant::now();
        warn!(
            "chain client failing over from provider {} ({}) to provider {} ({})",
            idx,
            self.providers[idx].label,
            idx + 1,
            self.providers[idx + 1].label
        );
    }

    /// Request/response handle, backed by whichever provider is currently
    /// active. All `eth_call`, `eth_getTransactionCount`, `eth_estimateGas`
    /// calls issued elsewhere in the crate go through this.
    pub fn rpc(&self) -> &RootProvider<Ethereum> {
        &self.active_slot().http
    }

    pub async fn throttle(&self) {
        self.active_slot().rate_limiter.acquire().await;
    }

    /// Runs `f` against the active provider, throttled; on failure,
    /// fails over to the next provider and retries once before giving up.
    pub async fn call<T, E, F, Fut>(&self, label: &str, f: F) -> EngineResult<T>
    where
        F: Fn(RootProvider<Ethereum>) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.throttle().await;
        let idx = self.active_index();
        match f(self.providers[idx].http.clone()).await {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!("{label} failed on provider {} ({}): {e} — failing over", idx, self.providers[idx].label);
                self.failover();
                let retry_idx = self.active_index();
                if retry_idx == idx {
                    return Err(EngineError::Transport {
                        endpoint: self.providers[idx].label.clone(),
                        source: Box::new(e),
                    });
                }
                self.throttle().await;
                f(self.providers[retry_idx].http.clone())
                    .await
                    .map_err(|e2| EngineError::NoHealthyProvider { last_error: e2.to_string() })
            }
        }
    }

    pub async fn current_block(&self) -> EngineResult<u64> {
        self.call("eth_blockNumber", |p| async move { p.get_block_number().await }).await
    }

    /// Subscribes to new heads on the active provider, reconnecting on
    /// drop up to `max_reconnects` times per the teacher's
    /// `MAX_RECONNECTS` pattern in `mempool::monitor::run_observation`.
    /// Each resolved head is sent on the returned channel; a subscription
    /// failure fails the client over to the next provider before
    /// retrying, so a dead WS endpoint doesn't exhaust the reconnect
    /// budget on its own.
    pub fn subscribe_new_heads(self: &Arc<Self>) -> tokio::sync::mpsc::Receiver<Header> {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut reconnects = 0u32;
            loop {
                match client.run_head_subscription(&tx).await {
                    Ok(()) => {
                        info!("head subscription ended cleanly");
                        break;
                    }
                    Err(e) => {
                        reconnects += 1;
                        if reconnects > client.max_reconnects {
                            warn!("head subscription: reconnects exhausted: {e}");
                            break;
                        }
                        client.failover();
                        warn!(
                            "head subscription error (reconnect {}/{}): {e} — retrying in 5s",
                            reconnects, client.max_reconnects
                        );
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });
        rx
    }

    async fn run_head_subscription(
        &self,
        tx: &tokio::sync::mpsc::Sender<Header>,
    ) -> EngineResult<()> {
        let idx = self.active_index();
        let sub: Subscription<Header> =
            self.providers[idx]
                .ws
                .subscribe_blocks()
                .await
                .map_err(|e| EngineError::Transport {
                    endpoint: self.providers[idx].label.clone(),
                    source: Box::new(e),
                })?;
        let mut stream = sub.into_stream();
        while let Some(header) = stream.next().await {
            if tx.send(header).await.is_err() {
                return Ok(());
            }
        }
        Err(EngineError::Transport {
            endpoint: self.providers[idx].label.clone(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "head subscription stream ended",
            )),
        })
    }

    /// Subscribes to the active provider's public mempool, same
    /// reconnect-on-drop shape as `subscribe_new_heads`. Each pending
    /// transaction's calldata is sent on the returned channel for
    /// `submission::sandwich` to decode and track — the Sandwich
    /// Detector's only source of observations.
    pub fn subscribe_pending_transactions(self: &Arc<Self>) -> tokio::sync::mpsc::Receiver<Bytes> {
        let (tx, rx) = tokio::sync::mpsc::channel(256);
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut reconnects = 0u32;
            loop {
                match client.run_pending_tx_subscription(&tx).await {
                    Ok(()) => {
                        info!("pending transaction subscription ended cleanly");
                        break;
                    }
                    Err(e) => {
                        reconnects += 1;
                        if reconnects > client.max_reconnects {
                            warn!("pending tx subscription: reconnects exhausted: {e}");
                            break;
                        }
                        client.failover();
                        warn!(
                            "pending tx subscription error (reconnect {}/{}): {e} — retrying in 5s",
                            reconnects, client.max_reconnects
                        );
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });
        rx
    }

    async fn run_pending_tx_subscription(&self, tx: &tokio::sync::mpsc::Sender<Bytes>) -> EngineResult<()> {
        let idx = self.active_index();
        let sub = self.providers[idx]
            .ws
            .subscribe_full_pending_transactions()
            .await
            .map_err(|e| EngineError::Transport {
                endpoint: self.providers[idx].label.clone(),
                source: Box::new(e),
            })?;
        let mut stream = sub.into_stream();
        while let Some(pending_tx) = stream.next().await {
            if tx.send(pending_tx.input().clone()).await.is_err() {
                return Ok(());
            }
        }
        Err(EngineError::Transport {
            endpoint: self.providers[idx].label.clone(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "pending transaction subscription stream ended",
            )),
        })
    }
}

async fn connect_slot(endpoint: &crate::config::ProviderEndpoint) -> EngineResult<ProviderSlot> {
    let ws = ProviderBuilder::new()
        .connect_ws(WsConnect::new(&endpoint.ws_url))
        .await
        .map_err(|e| EngineError::Transport {
            endpoint: endpoint.ws_url.clone(),
            source: Box::new(e),
        })?;

    let http_url: reqwest::Url = endpoint
        .http_url
        .parse()
        .map_err(|e| EngineError::MissingConfig(format!("invalid provider http url: {e}")))?;
    let http = ProviderBuilder::new().connect_http(http_url);

    Ok(ProviderSlot {
        label: endpoint.http_url.clone(),
        ws,
        http,
        rate_limiter: RateLimiter::new(20.0, 10.0),
    })
}
