//! Periodic network status reporting.
//!
//! Every interval the task recomputes network statistics, logs them at `info`
//! and marks nodes that stopped reporting as offline.

use std::sync::Arc;
use std::time::Duration;

use relay_registry::RelayRegistry;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

/// Status reporter configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatusConfig {
    /// Interval between status reports.
    pub(crate) interval: Duration,
    /// Online nodes silent for this long are marked offline. `None` disables.
    pub(crate) stale_after: Option<Duration>,
}

/// Spawns a background task that periodically reports registry status.
pub(crate) fn spawn_status_task(
    registry: Arc<RelayRegistry>,
    config: StatusConfig,
    shutdown: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown = shutdown;
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("status task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    report(&registry, config.stale_after);
                }
            }
        }
    })
}

/// Sweep stale nodes, then log current statistics at info level.
fn report(registry: &RelayRegistry, stale_after: Option<Duration>) -> usize {
    let swept = stale_after
        .map(|age| registry.sweep_stale(age.as_secs()))
        .unwrap_or(0);

    let stats = registry.recompute_stats();
    let top_country = stats
        .top_countries
        .first()
        .map(|c| format!("{}:{}", c.country_code, c.nodes))
        .unwrap_or_else(|| "-".to_string());

    info!(
        total = stats.total_nodes,
        online = stats.online_nodes,
        swept,
        countries = stats.countries,
        top_country = %top_country,
        bandwidth_mbps = stats.total_bandwidth_mbps,
        requests = stats.total_requests,
        avg_latency_ms = format_args!("{:.1}", stats.average_latency_ms),
        avg_success_rate = format_args!("{:.3}", stats.average_success_rate),
        "relay network status"
    );

    swept
}
