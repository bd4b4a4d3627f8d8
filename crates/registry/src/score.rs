//! Ranking score for relay nodes.
//!
//! A transparent heuristic over the node's current metrics. The weights and
//! band edges are fixed; selection results and stored leaderboards depend on
//! them, so they must not drift.
//!
//! | Component      | Points                                                     |
//! |----------------|------------------------------------------------------------|
//! | success rate   | `rate * 40`                                                |
//! | p50 latency    | `<100ms` 30, `<200ms` 25, `<500ms` 15, `<1000ms` 5, else 0 |
//! | bandwidth      | `>=100` 15, `>=50` 12, `>=20` 8, `>=5` 4, else 0           |
//! | uptime         | `uptime / 100 * 10`                                        |
//! | node type      | residential 5, mobile 4, datacenter 2, isp 0               |
//! | ASN known      | 2                                                          |
//! | TLS fingerprint| 3                                                          |

use crate::node::{Node, NodeType};

const SUCCESS_RATE_WEIGHT: f64 = 40.0;
const UPTIME_WEIGHT: f64 = 10.0;
const ASN_BONUS: f64 = 2.0;
const FINGERPRINT_BONUS: f64 = 3.0;

/// Score a node, rounded to two decimal places.
pub fn compute_score(node: &Node) -> f64 {
    let score = success_rate_points(node.success_rate)
        + latency_points(node.latency.p50)
        + bandwidth_points(node.bandwidth_mbps)
        + uptime_points(node.uptime)
        + type_points(node.node_type)
        + if node.geo.asn.is_some() { ASN_BONUS } else { 0.0 }
        + if node.tls_fingerprint.is_some() {
            FINGERPRINT_BONUS
        } else {
            0.0
        };

    round2(score)
}

pub fn success_rate_points(success_rate: f64) -> f64 {
    success_rate.clamp(0.0, 1.0) * SUCCESS_RATE_WEIGHT
}

pub fn latency_points(p50_ms: u64) -> f64 {
    match p50_ms {
        0..100 => 30.0,
        100..200 => 25.0,
        200..500 => 15.0,
        500..1000 => 5.0,
        _ => 0.0,
    }
}

pub fn bandwidth_points(mbps: f64) -> f64 {
    if mbps >= 100.0 {
        15.0
    } else if mbps >= 50.0 {
        12.0
    } else if mbps >= 20.0 {
        8.0
    } else if mbps >= 5.0 {
        4.0
    } else {
        0.0
    }
}

pub fn uptime_points(uptime_percent: f64) -> f64 {
    (uptime_percent.clamp(0.0, 100.0) / 100.0) * UPTIME_WEIGHT
}

pub fn type_points(node_type: NodeType) -> f64 {
    match node_type {
        NodeType::Residential => 5.0,
        NodeType::Mobile => 4.0,
        NodeType::Datacenter => 2.0,
        NodeType::Isp => 0.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
