//! Escalating-backoff cooldown, ported from the teacher's
//! `arbitrage::cooldown::RouteCooldown`. The teacher keyed cooldowns by
//! `(pair_symbol, buy_dex, sell_dex)` for route-level suppression; this
//! version is keyed by `PoolId` so the Pool Registry can suppress a
//! single repeatedly-failing pool without touching every other pool for
//! the same token pair. The escalation math and defaults are unchanged.

use crate::types::PoolId;
use std::collections::HashMap;
use tracing::{debug, info};

struct CooldownEntry {
    last_failed_block: u64,
    cooldown_blocks: u64,
    failure_count: u32,
}

const ESCALATION_FACTOR: u64 = 5;
const DEFAULT_MAX_COOLDOWN: u64 = 1800;

/// Per-pool cooldown tracker with escalating backoff.
pub struct PoolCooldown {
    entries: HashMap<PoolId, CooldownEntry>,
    initial_cooldown: u64,
    max_cooldown: u64,
}

impl PoolCooldown {
    /// `initial_cooldown` = blocks to suppress after the first failure
    /// (0 disables cooldown entirely).
    pub fn new(initial_cooldown: u64) -> Self {
        Self {
            entries: HashMap::new(),
            initial_cooldown,
            max_cooldown: DEFAULT_MAX_COOLDOWN,
        }
    }

    pub fn is_cooled_down(&self, pool: PoolId, current_block: u64) -> bool {
        if self.initial_cooldown == 0 {
            return false;
        }
        match self.entries.get(&pool) {
            Some(entry) => current_block < entry.last_failed_block + entry.cooldown_blocks,
            None => false,
        }
    }

    /// Record a quote failure, creating or escalating the cooldown:
    /// `initial * 5^(failures-1)`, capped at `max_cooldown`.
    pub fn record_failure(&mut self, pool: PoolId, block: u64) {
        if self.initial_cooldown == 0 {
            return;
        }
        let entry = self.entries.entry(pool).or_insert_with(|| CooldownEntry {
            last_failed_block: block,
            cooldown_blocks: 0,
            failure_count: 0,
        });
        entry.failure_count += 1;
        entry.last_failed_block = block;

        let escalated = self
            .initial_cooldown
            .saturating_mul(ESCALATION_FACTOR.saturating_pow(entry.failure_count.saturating_sub(1)));
        entry.cooldown_blocks = escalated.min(self.max_cooldown);

        debug!(
            pool = %pool,
            failure_count = entry.failure_count,
            cooldown_blocks = entry.cooldown_blocks,
            "pool cooldown escalated"
        );
    }

    /// A successful quote resets the cooldown entirely.
    pub fn record_success(&mut self, pool: PoolId) {
        if self.entries.remove(&pool).is_some() {
            info!(pool = %pool, "pool cooldown reset after success");
        }
    }

    pub fn cleanup(&mut self, current_block: u64) {
        self.entries
            .retain(|_, entry| current_block < entry.last_failed_block + entry.cooldown_blocks);
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    pub fn failure_count(&self, pool: PoolId) -> u32 {
        self.entries.get(&pool).map(|e| e.failure_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProtocolKind;
    use alloy::primitives::Address;

    fn pool_id(byte: u8) -> PoolId {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        PoolId {
            protocol: ProtocolKind::V2,
            address: Address::from(bytes),
        }
    }

    #[test]
    fn no_cooldown_initially() {
        let cd = PoolCooldown::new(10);
        assert!(!cd.is_cooled_down(pool_id(1), 100));
    }

    #[test]
    fn cooldown_after_failure_expires_on_schedule() {
        let mut cd = PoolCooldown::new(10);
        cd.record_failure(pool_id(1), 100);
        assert!(cd.is_cooled_down(pool_id(1), 109));
        assert!(!cd.is_cooled_down(pool_id(1), 110));
    }

    #[test]
    fn escalation_multiplies_by_five_each_failure() {
        let mut cd = PoolCooldown::new(10);
        let pool = pool_id(2);

        cd.record_failure(pool, 100);
        assert!(!cd.is_cooled_down(pool, 110));

        cd.record_failure(pool, 200);
        assert!(cd.is_cooled_down(pool, 249));
        assert!(!cd.is_cooled_down(pool, 250));

        cd.record_failure(pool, 300);
        assert!(cd.is_cooled_down(pool, 549));
        assert!(!cd.is_cooled_down(pool, 550));
    }

    #[test]
    fn escalation_caps_at_max_cooldown() {
        let mut cd = PoolCooldown::new(10);
        let pool = pool_id(3);
        for (i, block) in [100u64, 200, 300, 600, 2000].into_iter().enumerate() {
            cd.record_failure(pool, block);
            let _ = i;
        }
        assert!(cd.is_cooled_down(pool, 3799));
        assert!(!cd.is_cooled_down(pool, 3800));
    }

    #[test]
    fn success_resets_cooldown() {
        let mut cd = PoolCooldown::new(10);
        let pool = pool_id(4);
        cd.record_failure(pool, 100);
        assert!(cd.is_cooled_down(pool, 101));
        cd.record_success(pool);
        assert!(!cd.is_cooled_down(pool, 101));
        assert_eq!(cd.active_count(), 0);
    }

    #[test]
    fn different_pools_are_independent() {
        let mut cd = PoolCooldown::new(10);
        cd.record_failure(pool_id(5), 100);
        assert!(!cd.is_cooled_down(pool_id(6), 101));
    }

    #[test]
    fn disabled_when_zero() {
        let mut cd = PoolCooldown::new(0);
        cd.record_failure(pool_id(7), 100);
        assert!(!cd.is_cooled_down(pool_id(7), 100));
    }

    #[test]
    fn cleanup_removes_expired_entries() {
        let mut cd = PoolCooldown::new(10);
        cd.record_failure(pool_id(8), 100);
        cd.record_failure(pool_id(9), 200);
        assert_eq!(cd.active_count(), 2);
        cd.cleanup(111);
        assert_eq!(cd.active_count(), 1);
        cd.cleanup(211);
        assert_eq!(cd.active_count(), 0);
    }
}
