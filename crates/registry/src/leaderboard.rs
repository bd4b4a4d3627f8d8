//! Per-contributor earnings leaderboard.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::node::{Node, OwnerId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub owner_id: OwnerId,
    pub total_credits: f64,
    pub node_count: usize,
    pub bytes_served: u64,
    pub total_requests: u64,
    /// Mean success rate over the owner's nodes that served at least one
    /// request; 0 when none have.
    pub average_success_rate: f64,
}

#[derive(Default)]
struct Accumulator {
    credits: f64,
    nodes: usize,
    bytes_served: u64,
    requests: u64,
    success_sum: f64,
    active_nodes: usize,
}

/// Group every node (online or not) by owner, ranked by credits.
pub fn build<'a>(nodes: impl IntoIterator<Item = &'a Node>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut owners: HashMap<OwnerId, Accumulator> = HashMap::new();

    for node in nodes {
        let acc = owners.entry(node.owner_id.clone()).or_default();
        acc.credits += node.credits_earned;
        acc.nodes += 1;
        acc.bytes_served = acc.bytes_served.saturating_add(node.bytes_served);
        acc.requests = acc.requests.saturating_add(node.total_requests);
        if node.total_requests > 0 {
            acc.success_sum += node.success_rate;
            acc.active_nodes += 1;
        }
    }

    let mut entries: Vec<LeaderboardEntry> = owners
        .into_iter()
        .map(|(owner_id, acc)| LeaderboardEntry {
            owner_id,
            total_credits: acc.credits,
            node_count: acc.nodes,
            bytes_served: acc.bytes_served,
            total_requests: acc.requests,
            average_success_rate: if acc.active_nodes == 0 {
                0.0
            } else {
                acc.success_sum / acc.active_nodes as f64
            },
        })
        .collect();

    entries.sort_by(|a, b| {
        b.total_credits
            .total_cmp(&a.total_credits)
            .then_with(|| a.owner_id.cmp(&b.owner_id))
    });
    entries.truncate(limit);
    entries
}
