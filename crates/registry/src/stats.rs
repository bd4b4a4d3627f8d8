//! Network-wide aggregate statistics.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::geo::Continent;
use crate::node::{Node, NodeType};

/// Length of the top-country and top-ASN lists.
pub const TOP_N: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCount {
    pub country_code: String,
    pub country_name: String,
    pub nodes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnCount {
    pub asn: u32,
    pub as_org: Option<String>,
    pub nodes: usize,
}

/// Snapshot of the whole network, computed by a full scan.
///
/// Request and byte totals cover every node; all other aggregates cover
/// online nodes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub total_bandwidth_mbps: f64,
    pub total_requests: u64,
    pub total_bytes_served: u64,
    pub average_latency_ms: f64,
    pub average_success_rate: f64,
    pub countries: usize,
    pub continents: BTreeMap<Continent, usize>,
    pub top_countries: Vec<CountryCount>,
    pub top_asns: Vec<AsnCount>,
    pub node_types: BTreeMap<NodeType, usize>,
    pub computed_at: u64,
}

impl NetworkStats {
    pub fn compute<'a>(nodes: impl IntoIterator<Item = &'a Node>, computed_at: u64) -> Self {
        let mut total_nodes = 0;
        let mut online_nodes = 0;
        let mut total_bandwidth_mbps = 0.0;
        let mut total_requests: u64 = 0;
        let mut total_bytes_served: u64 = 0;
        let mut latency_sum = 0.0;
        let mut success_sum = 0.0;
        let mut continents: BTreeMap<Continent, usize> = BTreeMap::new();
        let mut node_types: BTreeMap<NodeType, usize> = BTreeMap::new();
        let mut countries: HashMap<String, CountryCount> = HashMap::new();
        let mut asns: HashMap<u32, AsnCount> = HashMap::new();

        for node in nodes {
            total_nodes += 1;
            total_requests = total_requests.saturating_add(node.total_requests);
            total_bytes_served = total_bytes_served.saturating_add(node.bytes_served);

            if !node.online {
                continue;
            }

            online_nodes += 1;
            total_bandwidth_mbps += node.bandwidth_mbps;
            latency_sum += node.latency.average;
            success_sum += node.success_rate;

            *continents.entry(node.continent).or_default() += 1;
            *node_types.entry(node.node_type).or_default() += 1;

            let code = node.geo.country_code.to_ascii_uppercase();
            countries
                .entry(code.clone())
                .or_insert_with(|| CountryCount {
                    country_code: code,
                    country_name: node.geo.country_name.clone(),
                    nodes: 0,
                })
                .nodes += 1;

            if let Some(asn) = node.geo.asn {
                let entry = asns.entry(asn).or_insert_with(|| AsnCount {
                    asn,
                    as_org: None,
                    nodes: 0,
                });
                entry.nodes += 1;
                if entry.as_org.is_none() {
                    entry.as_org = node.geo.as_org.clone();
                }
            }
        }

        let (average_latency_ms, average_success_rate) = if online_nodes == 0 {
            (0.0, 0.0)
        } else {
            (
                latency_sum / online_nodes as f64,
                success_sum / online_nodes as f64,
            )
        };

        let distinct_countries = countries.len();

        let mut top_countries: Vec<CountryCount> = countries.into_values().collect();
        top_countries.sort_by(|a, b| {
            b.nodes
                .cmp(&a.nodes)
                .then_with(|| a.country_code.cmp(&b.country_code))
        });
        top_countries.truncate(TOP_N);

        let mut top_asns: Vec<AsnCount> = asns.into_values().collect();
        top_asns.sort_by(|a, b| b.nodes.cmp(&a.nodes).then_with(|| a.asn.cmp(&b.asn)));
        top_asns.truncate(TOP_N);

        Self {
            total_nodes,
            online_nodes,
            total_bandwidth_mbps,
            total_requests,
            total_bytes_served,
            average_latency_ms,
            average_success_rate,
            countries: distinct_countries,
            continents,
            top_countries,
            top_asns,
            node_types,
            computed_at,
        }
    }
}
