//! Relay selection: filter, rank by score, optionally diversify.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geo::Continent;
use crate::node::{Node, NodeType};

/// Result count when the query does not specify one.
pub const DEFAULT_SELECTION_COUNT: usize = 10;

/// Constraints for a selection. All filters are optional and conjunctive;
/// offline nodes are never selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionQuery {
    pub country: Option<String>,
    pub continent: Option<Continent>,
    pub asn: Option<u32>,
    pub node_type: Option<NodeType>,
    pub min_success_rate: Option<f64>,
    /// Upper bound on p50 latency, in milliseconds.
    pub max_latency_ms: Option<u64>,
    pub exclude_asns: HashSet<u32>,
    pub count: usize,
    pub diverse_asns: bool,
    pub diverse_countries: bool,
}

impl Default for SelectionQuery {
    fn default() -> Self {
        Self {
            country: None,
            continent: None,
            asn: None,
            node_type: None,
            min_success_rate: None,
            max_latency_ms: None,
            exclude_asns: HashSet::new(),
            count: DEFAULT_SELECTION_COUNT,
            diverse_asns: false,
            diverse_countries: false,
        }
    }
}

impl SelectionQuery {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }

    pub fn is_diverse(&self) -> bool {
        self.diverse_asns || self.diverse_countries
    }

    /// Whether `node` passes every filter.
    pub fn matches(&self, node: &Node) -> bool {
        if !node.online {
            return false;
        }
        if let Some(country) = &self.country {
            if !node.geo.country_code.eq_ignore_ascii_case(country) {
                return false;
            }
        }
        if self.continent.is_some_and(|c| c != node.continent) {
            return false;
        }
        if self.asn.is_some() && self.asn != node.geo.asn {
            return false;
        }
        if self.node_type.is_some_and(|t| t != node.node_type) {
            return false;
        }
        if self.min_success_rate.is_some_and(|min| node.success_rate < min) {
            return false;
        }
        if self.max_latency_ms.is_some_and(|max| node.latency.p50 > max) {
            return false;
        }
        if node.geo.asn.is_some_and(|asn| self.exclude_asns.contains(&asn)) {
            return false;
        }
        true
    }
}

/// Select from `candidates`, which must be in registration order.
///
/// Ranking is by score, descending. The sort is stable, so equal scores keep
/// registration order.
///
/// With a diversity flag set, a single greedy pass accepts unconditionally
/// while fewer than half of `count` are taken (three picks for a count of
/// five), then only candidates whose ASN and/or country has not been taken
/// yet. The pass never backtracks, so a homogeneous pool yields fewer than
/// `count` nodes.
pub fn select(candidates: Vec<Node>, query: &SelectionQuery) -> Vec<Node> {
    let mut ranked: Vec<Node> = candidates
        .into_iter()
        .filter(|node| query.matches(node))
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    if !query.is_diverse() {
        ranked.truncate(query.count);
        return ranked;
    }

    let mut selected: Vec<Node> = Vec::with_capacity(query.count);
    let mut seen_asns: HashSet<Option<u32>> = HashSet::new();
    let mut seen_countries: HashSet<String> = HashSet::new();

    for node in ranked {
        if selected.len() >= query.count {
            break;
        }
        if selected.iter().any(|taken| taken.id == node.id) {
            continue;
        }

        let country = node.geo.country_code.to_ascii_uppercase();
        if selected.len() * 2 >= query.count {
            if query.diverse_asns && seen_asns.contains(&node.geo.asn) {
                continue;
            }
            if query.diverse_countries && seen_countries.contains(&country) {
                continue;
            }
        }

        seen_asns.insert(node.geo.asn);
        seen_countries.insert(country);
        selected.push(node);
    }

    selected
}
