//! Bounded latency sample window and percentile statistics.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of recent samples retained per node.
pub const LATENCY_WINDOW_CAPACITY: usize = 100;

/// Summary of the samples currently held in a [`LatencyWindow`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min: u64,
    pub max: u64,
    pub average: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
}

/// Most recent latency observations in milliseconds, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VecDeque<u64>", into = "VecDeque<u64>")]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
}

impl From<VecDeque<u64>> for LatencyWindow {
    /// Keeps only the newest samples of an oversized input.
    fn from(mut samples: VecDeque<u64>) -> Self {
        while samples.len() > LATENCY_WINDOW_CAPACITY {
            samples.pop_front();
        }
        Self { samples }
    }
}

impl From<LatencyWindow> for VecDeque<u64> {
    fn from(window: LatencyWindow) -> Self {
        window.samples
    }
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(LATENCY_WINDOW_CAPACITY),
        }
    }

    /// Append a sample, evicting the oldest ones beyond capacity.
    pub fn push(&mut self, latency_ms: u64) {
        self.samples.push_back(latency_ms);
        while self.samples.len() > LATENCY_WINDOW_CAPACITY {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }

    /// Compute statistics over the held samples. All zero when empty.
    pub fn stats(&self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let len = sorted.len();

        LatencyStats {
            min: sorted.first().copied().unwrap_or_default(),
            max: sorted.last().copied().unwrap_or_default(),
            average: sum as f64 / len as f64,
            p50: percentile(&sorted, 0.5),
            p90: percentile(&sorted, 0.9),
            p99: percentile(&sorted, 0.99),
        }
    }
}

/// Value at `floor(len * q)` of an ascending slice, clamped to the last index.
fn percentile(sorted: &[u64], q: f64) -> u64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0;
    };
    let idx = ((sorted.len() as f64 * q).floor() as usize).min(last);
    sorted.get(idx).copied().unwrap_or_default()
}
