//! Path Finder — builds the token graph from one scan's quotes and
//! enumerates simple cycles back to the base token.
//!
//! No graph crate is introduced (the teacher never depends on one; this
//! keeps the dependency stack aligned with it) — a hand-rolled bounded
//! DFS is enough at the token-universe sizes this crate targets (tens of
//! tokens, not thousands). The two-hop case is the teacher's
//! `arbitrage::detector::OpportunityDetector::check_pair_unified` nested
//! loop over pools for a single pair, generalized here to fall out of
//! the same DFS as a depth-2 path rather than living as special-cased
//! code.

use crate::types::{Hop, Path, Quote};
use alloy::primitives::Address;
use std::collections::HashMap;

/// Directed quote graph for one scan cycle: `token_in -> quotes departing
/// from it`. Built fresh every scan; never persisted.
pub struct QuoteGraph {
    edges: HashMap<Address, Vec<Quote>>,
}

impl QuoteGraph {
    pub fn build(quotes_by_pair: &HashMap<(Address, Address), Vec<Quote>>) -> Self {
        let mut edges: HashMap<Address, Vec<Quote>> = HashMap::new();
        for quotes in quotes_by_pair.values() {
            for quote in quotes {
                edges.entry(quote.token_in).or_default().push(quote.clone());
            }
        }
        Self { edges }
    }

    fn edges_from(&self, token: Address) -> &[Quote] {
        self.edges.get(&token).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Enumerates simple cycles `base_token -> ... -> base_token` of length
/// in `[2, max_hops]`, restricted at every intermediate step to
/// `intermediate_tokens` (the base token itself is always a valid next
/// hop once at least 2 hops have been taken). Edges whose `price_impact`
/// exceeds `price_impact_ceiling` are pruned before recursing.
pub fn find_cycles(
    graph: &QuoteGraph,
    base_token: Address,
    intermediate_tokens: &[Address],
    max_hops: usize,
    price_impact_ceiling: f64,
) -> Vec<Path> {
    let mut results: Vec<(Path, f64)> = Vec::new();
    let mut trail: Vec<Hop> = Vec::new();
    let mut visited_pools = std::collections::HashSet::new();

    dfs(
        graph,
        base_token,
        base_token,
        intermediate_tokens,
        max_hops,
        price_impact_ceiling,
        &mut trail,
        0.0,
        &mut visited_pools,
        &mut results,
    );

    rank(results)
}

#[allow(clippy::too_many_arguments)]
fn dfs(
    graph: &QuoteGraph,
    base_token: Address,
    current: Address,
    intermediate_tokens: &[Address],
    max_hops: usize,
    price_impact_ceiling: f64,
    trail: &mut Vec<Hop>,
    aggregate_impact: f64,
    visited_pools: &mut std::collections::HashSet<crate::types::PoolId>,
    results: &mut Vec<(Path, f64)>,
) {
    if trail.len() >= 1 {
        for quote in graph.edges_from(current) {
            if quote.token_out == base_token && quote.price_impact <= price_impact_ceiling {
                let mut hops = trail.clone();
                hops.push(Hop {
                    pool: quote.pool,
                    input_token: quote.token_in,
                    output_token: quote.token_out,
                });
                results.push((Path::new(hops), aggregate_impact + quote.price_impact));
            }
        }
    }

    if trail.len() >= max_hops {
        return;
    }

    for quote in graph.edges_from(current) {
        if quote.price_impact > price_impact_ceiling {
            continue;
        }
        if visited_pools.contains(&quote.pool) {
            continue;
        }
        // Intermediate hops must land on a configured intermediate token,
        // unless this step closes the cycle back at the base (handled above).
        if quote.token_out != base_token && !intermediate_tokens.contains(&quote.token_out) {
            continue;
        }
        if quote.token_out == base_token {
            continue; // closing moves are only taken in the check above
        }

        trail.push(Hop {
            pool: quote.pool,
            input_token: quote.token_in,
            output_token: quote.token_out,
        });
        visited_pools.insert(quote.pool);

        dfs(
            graph,
            base_token,
            quote.token_out,
            intermediate_tokens,
            max_hops,
            price_impact_ceiling,
            trail,
            aggregate_impact + quote.price_impact,
            visited_pools,
            results,
        );

        visited_pools.remove(&quote.pool);
        trail.pop();
    }
}

/// Tie-breaking: fewer hops first, then lower aggregate price impact,
/// then lexicographic pool address — deterministic given equal inputs.
fn rank(mut paths: Vec<(Path, f64)>) -> Vec<Path> {
    paths.sort_by(|(a, impact_a), (b, impact_b)| {
        a.len()
            .cmp(&b.len())
            .then_with(|| impact_a.partial_cmp(impact_b).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| {
                let addr_a = a.hops.first().map(|h| h.pool.address);
                let addr_b = b.hops.first().map(|h| h.pool.address);
                addr_a.cmp(&addr_b)
            })
    });
    paths.into_iter().map(|(p, _)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PoolId;
    use crate::types::ProtocolKind;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn quote(pool_addr: u8, token_in: Address, token_out: Address) -> Quote {
        Quote {
            pool: PoolId { protocol: ProtocolKind::V2, address: addr(pool_addr) },
            token_in,
            token_out,
            amount_in: alloy::primitives::U256::from(1u64),
            amount_out: alloy::primitives::U256::from(1u64),
            price_impact: 0.001,
            timestamp: 0,
            block_height: 100,
        }
    }

    #[test]
    fn finds_two_hop_cycle() {
        let base = addr(1);
        let mid = addr(2);
        let mut quotes_by_pair = HashMap::new();
        quotes_by_pair.insert((base, mid), vec![quote(10, base, mid), quote(11, mid, base)]);

        let graph = QuoteGraph::build(&quotes_by_pair);
        let cycles = find_cycles(&graph, base, &[mid], 4, 0.1);
        assert!(!cycles.is_empty());
        assert!(cycles.iter().any(|p| p.len() == 2 && p.is_circular()));
    }

    #[test]
    fn no_cycle_without_return_edge() {
        let base = addr(1);
        let mid = addr(2);
        let mut quotes_by_pair = HashMap::new();
        quotes_by_pair.insert((base, mid), vec![quote(10, base, mid)]);

        let graph = QuoteGraph::build(&quotes_by_pair);
        let cycles = find_cycles(&graph, base, &[mid], 4, 0.1);
        assert!(cycles.is_empty());
    }

    #[test]
    fn three_hop_cycle_through_two_intermediates() {
        let base = addr(1);
        let mid1 = addr(2);
        let mid2 = addr(3);
        let mut quotes_by_pair = HashMap::new();
        quotes_by_pair.insert((base, mid1), vec![quote(10, base, mid1)]);
        quotes_by_pair.insert((mid1, mid2), vec![quote(11, mid1, mid2)]);
        quotes_by_pair.insert((mid2, base), vec![quote(12, mid2, base)]);

        let graph = QuoteGraph::build(&quotes_by_pair);
        let cycles = find_cycles(&graph, base, &[mid1, mid2], 4, 0.1);
        assert!(cycles.iter().any(|p| p.len() == 3));
    }
}
