//! Pool Registry — cache of known pools keyed by `(protocol, token pair)`,
//! with single-flight discovery and failure-triggered invalidation.
//!
//! Grounded on the teacher's `pool::state::PoolStateManager` (a
//! `DashMap`-backed concurrent cache, cloned cheaply via an inner `Arc`),
//! extended with the arena/handle indirection the Design Note calls for
//! ("Pointer graphs in the Pool Registry") and a per-key single-flight
//! guard so concurrent `get_or_discover` calls for the same pair collapse
//! into one discovery instead of racing.

mod cooldown;

pub use cooldown::PoolCooldown;

use crate::types::{Pool, PoolHandle, PoolId, ProtocolKind};
use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;
use tracing::debug;

/// Order-insensitive pair key: tokens are sorted before hashing so
/// `(a, b)` and `(b, a)` resolve to the same discovery slot.
fn pair_key(protocol: ProtocolKind, a: Address, b: Address) -> (ProtocolKind, Address, Address) {
    if a < b {
        (protocol, a, b)
    } else {
        (protocol, b, a)
    }
}

/// What `get_or_discover` returns while a concurrent discovery for the
/// same key is in flight: callers await the `Notify` rather than
/// launching their own discovery.
enum DiscoverySlot {
    InFlight(Arc<Notify>),
    Done,
}

#[derive(Clone)]
pub struct PoolRegistry {
    /// Arena of pool records; index is the `PoolHandle`.
    arena: Arc<RwLock<Vec<Pool>>>,
    /// `(protocol, sorted token pair)` → handles of every pool discovered
    /// for that pair (a pair can have several pools: multiple V3 fee
    /// tiers, or a V2 pool alongside a stable pool).
    by_pair: Arc<DashMap<(ProtocolKind, Address, Address), Vec<PoolHandle>>>,
    /// Single-flight guards for in-progress discovery.
    inflight: Arc<DashMap<(ProtocolKind, Address, Address), DiscoverySlot>>,
    cooldown: Arc<std::sync::Mutex<PoolCooldown>>,
    failure_threshold: u32,
    next_handle: Arc<AtomicU32>,
}

impl PoolRegistry {
    pub fn new(failure_threshold: u32, initial_cooldown_blocks: u64) -> Self {
        Self {
            arena: Arc::new(RwLock::new(Vec::new())),
            by_pair: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
            cooldown: Arc::new(std::sync::Mutex::new(PoolCooldown::new(initial_cooldown_blocks))),
            failure_threshold,
            next_handle: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn get(&self, handle: PoolHandle) -> Option<Pool> {
        self.arena.read().unwrap().get(handle.0 as usize).cloned()
    }

    pub fn pools_for_pair(&self, protocol: ProtocolKind, a: Address, b: Address) -> Vec<PoolHandle> {
        self.by_pair
            .get(&pair_key(protocol, a, b))
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Linear scan by identity rather than handle — used by the Path
    /// Finder/Evaluator, which carry `PoolId` on each `Hop` rather than a
    /// handle. Cheap enough at this crate's pool-count scale; callers that
    /// already hold a handle should prefer `get`.
    pub fn get_by_id(&self, id: PoolId) -> Option<Pool> {
        self.arena.read().unwrap().iter().find(|p| p.id == id).cloned()
    }

    /// `get_or_discover(protocol, token_a, token_b) -> list<Pool>`: if
    /// this pair was already discovered, returns the cached handles
    /// immediately. Otherwise runs `discover` exactly once per key even
    /// under concurrent callers — everyone else awaits the same
    /// `Notify`.
    pub async fn get_or_discover<F, Fut>(
        &self,
        protocol: ProtocolKind,
        token_a: Address,
        token_b: Address,
        discover: F,
    ) -> Vec<PoolHandle>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Vec<Pool>>,
    {
        let key = pair_key(protocol, token_a, token_b);

        if let Some(existing) = self.by_pair.get(&key) {
            return existing.clone();
        }

        // Try to become the discoverer for this key.
        let notify = Arc::new(Notify::new());
        let became_leader = match self.inflight.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(DiscoverySlot::InFlight(Arc::clone(&notify)));
                true
            }
        };

        if !became_leader {
            // Someone else is discovering; wait for them, then read the cache.
            if let Some(slot) = self.inflight.get(&key) {
                if let DiscoverySlot::InFlight(other_notify) = &*slot {
                    let other_notify = Arc::clone(other_notify);
                    drop(slot);
                    other_notify.notified().await;
                }
            }
            return self.by_pair.get(&key).map(|v| v.clone()).unwrap_or_default();
        }

        let discovered = discover().await;
        let handles = self.insert_discovered(discovered);
        self.by_pair.insert(key, handles.clone());
        self.inflight.insert(key, DiscoverySlot::Done);
        notify.notify_waiters();
        self.inflight.remove(&key);

        debug!(pools = handles.len(), "pool discovery complete");
        handles
    }

    fn insert_discovered(&self, pools: Vec<Pool>) -> Vec<PoolHandle> {
        let mut arena = self.arena.write().unwrap();
        pools
            .into_iter()
            .map(|pool| {
                let idx = self.next_handle.fetch_add(1, Ordering::SeqCst);
                arena.push(pool);
                PoolHandle(idx)
            })
            .collect()
    }

    /// Record a failed quote against `pool`; once consecutive failures
    /// reach `failure_threshold` the entry is evicted from its pair's
    /// handle list (the arena slot stays, just unreachable by lookup) and
    /// put into cooldown.
    pub fn record_quote_failure(&self, id: PoolId, current_block: u64) {
        let mut cooldown = self.cooldown.lock().unwrap();
        cooldown.record_failure(id, current_block);

        if cooldown.failure_count(id) >= self.failure_threshold {
            self.evict(id);
        }
    }

    pub fn record_quote_success(&self, id: PoolId) {
        self.cooldown.lock().unwrap().record_success(id);
    }

    pub fn is_cooled_down(&self, id: PoolId, current_block: u64) -> bool {
        self.cooldown.lock().unwrap().is_cooled_down(id, current_block)
    }

    fn evict(&self, id: PoolId) {
        let mut arena = self.arena.write().unwrap();
        let handle = arena
            .iter()
            .position(|p| p.id == id)
            .map(|idx| PoolHandle(idx as u32));
        drop(arena);

        let Some(handle) = handle else { return };
        for mut entry in self.by_pair.iter_mut() {
            entry.value_mut().retain(|h| *h != handle);
        }
    }

    pub fn pool_count(&self) -> usize {
        self.arena.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Token;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn sample_pool(address: Address, token0: Address, token1: Address) -> Pool {
        Pool {
            id: PoolId {
                protocol: ProtocolKind::V2,
                address,
            },
            token0: Token::new(token0, 18, "A"),
            token1: Token::new(token1, 18, "B"),
            fee_bps: 30,
            last_seen_block: 1,
            consecutive_failures: 0,
        }
    }

    #[tokio::test]
    async fn discovery_runs_once_per_key() {
        let registry = PoolRegistry::new(3, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let a = addr(1);
        let b = addr(2);
        let pool_addr = addr(10);

        let mut handles_set = Vec::new();
        for _ in 0..5 {
            let calls = Arc::clone(&calls);
            let registry = registry.clone();
            let handles = registry
                .get_or_discover(ProtocolKind::V2, a, b, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    vec![sample_pool(pool_addr, a, b)]
                })
                .await;
            handles_set.push(handles);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handles_set.iter().all(|h| h.len() == 1));
    }

    #[tokio::test]
    async fn pair_lookup_is_order_insensitive() {
        let registry = PoolRegistry::new(3, 10);
        let a = addr(1);
        let b = addr(2);
        registry
            .get_or_discover(ProtocolKind::V2, a, b, || async move {
                vec![sample_pool(addr(10), a, b)]
            })
            .await;

        let via_reversed = registry.pools_for_pair(ProtocolKind::V2, b, a);
        assert_eq!(via_reversed.len(), 1);
    }

    #[test]
    fn failure_threshold_evicts_pool_from_pair_lookup() {
        let registry = PoolRegistry::new(2, 10);
        let a = addr(1);
        let b = addr(2);
        let pool = sample_pool(addr(10), a, b);
        let id = pool.id;
        let handles = registry.insert_discovered(vec![pool]);
        registry.by_pair.insert(pair_key(ProtocolKind::V2, a, b), handles);

        registry.record_quote_failure(id, 100);
        assert_eq!(registry.pools_for_pair(ProtocolKind::V2, a, b).len(), 1);

        registry.record_quote_failure(id, 101);
        assert_eq!(registry.pools_for_pair(ProtocolKind::V2, a, b).len(), 0);
    }
}
