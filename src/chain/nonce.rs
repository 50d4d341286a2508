//! Nonce manager.
//!
//! Supplemented: the teacher ran one trade at a time, so its executor
//! never had two in-flight transactions racing for the same nonce. This
//! crate's orchestrator runs one independent cycle per base token
//! concurrently, so a shared, mutex-guarded counter is required to avoid
//! two submissions claiming the same nonce.

use alloy::primitives::Address;
use alloy::providers::Provider;
use anyhow::{Context, Result};
use tokio::sync::Mutex;

pub struct NonceManager {
    address: Address,
    next: Mutex<Option<u64>>,
}

impl NonceManager {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            next: Mutex::new(None),
        }
    }

    /// Returns the next nonce to use, lazily seeding from the chain on
    /// first call, then incrementing in-process for every subsequent
    /// reservation so concurrent cycles never collide.
    pub async fn reserve<P: Provider>(&self, provider: &P) -> Result<u64> {
        let mut guard = self.next.lock().await;
        let nonce = match *guard {
            Some(n) => n,
            None => provider
                .get_transaction_count(self.address)
                .await
                .context("fetching starting nonce")?,
        };
        *guard = Some(nonce + 1);
        Ok(nonce)
    }

    /// Resets the cached nonce so the next `reserve` re-reads it from
    /// chain — used after a `NonceCollision` error to resynchronize.
    pub async fn resync(&self) {
        *self.next.lock().await = None;
    }
}
