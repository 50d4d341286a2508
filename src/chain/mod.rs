//! Chain Client — ordered-provider-list failover, per-provider rate
//! limiting, and nonce tracking.
//!
//! Two alloy provider handles are kept alive per configured endpoint: one
//! carries the new-head subscription, the other is free for
//! request/response calls (`eth_call`, `eth_getTransactionCount`, …)
//! issued while the subscription stream is being polled. The teacher's
//! `mempool::monitor` uses the same split to avoid borrowing the
//! subscription stream and a request future at once. `ChainClient` tries
//! providers in priority order and fails over to the next one on a
//! transport error, sticking with the new provider for a cooldown window
//! before considering another switch.

pub mod live;
mod nonce;
mod provider;
mod rate_limiter;

pub use live::{discover_pools, ChainPoolSampler};
pub use nonce::NonceManager;
pub use provider::ChainClient;
pub use rate_limiter::RateLimiter;
