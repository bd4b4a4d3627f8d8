//! Registry metrics

use metrics::{Counter, Gauge, Histogram};

/// Registry metrics
#[derive(Clone, Debug)]
pub(crate) struct RegistryMetrics {
    /// Number of registrations, including re-registrations
    pub(crate) registrations_total: Counter,
    /// Number of successful unregistrations
    pub(crate) unregistrations_total: Counter,
    /// Number of request outcomes recorded against known nodes
    pub(crate) requests_recorded_total: Counter,
    /// Number of recorded outcomes that failed
    pub(crate) requests_failed_total: Counter,
    /// Number of registrations that fell back to unknown geography
    pub(crate) geo_lookup_failures_total: Counter,
    /// Number of completed store flushes
    pub(crate) flushes_total: Counter,
    /// Number of failed store flushes
    pub(crate) flush_failures_total: Counter,
    /// Nodes currently registered
    pub(crate) nodes: Gauge,
    /// Nodes currently online, as of the last stats recomputation
    pub(crate) online_nodes: Gauge,
    /// Reported request latency, in milliseconds
    pub(crate) request_latency_ms: Histogram,
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        Self {
            registrations_total: metrics::counter!("registry.registrations_total"),
            unregistrations_total: metrics::counter!("registry.unregistrations_total"),
            requests_recorded_total: metrics::counter!("registry.requests_recorded_total"),
            requests_failed_total: metrics::counter!("registry.requests_failed_total"),
            geo_lookup_failures_total: metrics::counter!("registry.geo_lookup_failures_total"),
            flushes_total: metrics::counter!("registry.persistence.flushes_total"),
            flush_failures_total: metrics::counter!("registry.persistence.flush_failures_total"),
            nodes: metrics::gauge!("registry.nodes"),
            online_nodes: metrics::gauge!("registry.online_nodes"),
            request_latency_ms: metrics::histogram!("registry.request_latency_ms"),
        }
    }
}

impl RegistryMetrics {
    pub(crate) fn inc_registrations(&self) {
        self.registrations_total.increment(1);
    }

    pub(crate) fn inc_unregistrations(&self) {
        self.unregistrations_total.increment(1);
    }

    pub(crate) fn inc_geo_lookup_failures(&self) {
        self.geo_lookup_failures_total.increment(1);
    }

    pub(crate) fn record_request(&self, success: bool, latency_ms: u64) {
        self.requests_recorded_total.increment(1);
        if !success {
            self.requests_failed_total.increment(1);
        }
        self.request_latency_ms.record(latency_ms as f64);
    }

    pub(crate) fn inc_flushes(&self) {
        self.flushes_total.increment(1);
    }

    pub(crate) fn inc_flush_failures(&self) {
        self.flush_failures_total.increment(1);
    }

    pub(crate) fn set_node_count(&self, count: usize) {
        self.nodes.set(count as f64);
    }

    pub(crate) fn set_online_count(&self, count: usize) {
        self.online_nodes.set(count as f64);
    }
}
