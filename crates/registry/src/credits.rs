//! Credit rewards for served traffic.

use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const SECS_PER_HOUR: f64 = 3600.0;

/// Reward parameters applied to every recorded request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditPolicy {
    /// Flat credits per request.
    pub base_per_request: f64,
    /// Credits per MiB transferred.
    pub per_mb_rate: f64,
    /// Multiplier applied while the success rate is above `quality_threshold`.
    pub quality_multiplier: f64,
    /// Success rate a node must exceed to earn the multiplier.
    pub quality_threshold: f64,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            base_per_request: 0.001,
            per_mb_rate: 0.01,
            quality_multiplier: 1.2,
            quality_threshold: 0.95,
        }
    }
}

impl CreditPolicy {
    /// Credits for one request of `bytes` at the node's current success rate.
    pub fn reward(&self, bytes: u64, success_rate: f64) -> f64 {
        let base = self.base_per_request + (bytes as f64 / BYTES_PER_MB) * self.per_mb_rate;
        if success_rate > self.quality_threshold {
            base * self.quality_multiplier
        } else {
            base
        }
    }
}

/// Lifetime earning rate, treating nodes younger than an hour as one hour old.
pub fn credits_per_hour(credits_earned: f64, registered_at: u64, now: u64) -> f64 {
    let hours = (now.saturating_sub(registered_at) as f64 / SECS_PER_HOUR).max(1.0);
    credits_earned / hours
}
