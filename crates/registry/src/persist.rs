//! Debounced write-behind persistence.
//!
//! Every registry mutation signals a shared [`Notify`]. The background task
//! waits for the signal, then for a quiet period of `debounce` (capped at
//! `max_delay` from the first signal) before writing the full node set once.
//! Mutations inside that window are lost on a crash.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::registry::RelayRegistry;
use crate::store::{NodeStore, NodeStoreError};

const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Persistence task configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Quiet period after the last mutation before a flush.
    pub debounce: Duration,
    /// Upper bound between the first pending mutation and its flush.
    pub max_delay: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Handle to a running persistence task.
#[derive(Debug)]
pub struct PersistenceHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    flushes: watch::Receiver<u64>,
}

impl PersistenceHandle {
    /// Completed flush count, updated after every successful write.
    pub fn flushes(&self) -> watch::Receiver<u64> {
        self.flushes.clone()
    }

    /// Stop the task, flushing pending mutations first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            warn!(%err, "persistence task did not shut down cleanly");
        }
    }
}

/// Spawn the write-behind task for `registry` onto the current runtime.
pub fn spawn_persistence<S>(
    registry: Arc<RelayRegistry>,
    store: S,
    config: PersistenceConfig,
) -> PersistenceHandle
where
    S: NodeStore + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (flushes_tx, flushes_rx) = watch::channel(0);
    let task = tokio::spawn(run(registry, Arc::new(store), config, shutdown_rx, flushes_tx));

    PersistenceHandle {
        shutdown: shutdown_tx,
        task,
        flushes: flushes_rx,
    }
}

async fn run<S>(
    registry: Arc<RelayRegistry>,
    store: Arc<S>,
    config: PersistenceConfig,
    mut shutdown: oneshot::Receiver<()>,
    flushes: watch::Sender<u64>,
) where
    S: NodeStore + 'static,
{
    let dirty = registry.dirty();
    let mut pending = false;

    'outer: loop {
        tokio::select! {
            biased;
            _ = dirty.notified() => pending = true,
            _ = &mut shutdown => break,
        }

        let deadline = Instant::now() + config.max_delay;
        loop {
            let wait = config
                .debounce
                .min(deadline.saturating_duration_since(Instant::now()));
            if wait.is_zero() {
                trace!("persistence max delay reached");
                break;
            }

            tokio::select! {
                quiet = tokio::time::timeout(wait, dirty.notified()) => {
                    if quiet.is_err() {
                        break;
                    }
                }
                _ = &mut shutdown => break 'outer,
            }
        }

        match flush(&registry, &store).await {
            Ok(count) => {
                pending = false;
                flushes.send_modify(|n| *n += 1);
                debug!(count, "flushed nodes to store");
            }
            Err(err) => {
                warn!(%err, "node store flush failed, will retry");
                registry.metrics().inc_flush_failures();
                dirty.notify_one();
            }
        }
    }

    if pending {
        match flush(&registry, &store).await {
            Ok(count) => {
                flushes.send_modify(|n| *n += 1);
                debug!(count, "final flush on shutdown");
            }
            Err(err) => {
                warn!(%err, "final node store flush failed");
                registry.metrics().inc_flush_failures();
            }
        }
    }
    debug!("persistence task shutting down");
}

/// Snapshot the registry and write it on the blocking pool.
async fn flush<S>(registry: &RelayRegistry, store: &Arc<S>) -> Result<usize, NodeStoreError>
where
    S: NodeStore + 'static,
{
    let nodes = registry.nodes();
    let count = nodes.len();
    let store = Arc::clone(store);

    tokio::task::spawn_blocking(move || {
        store.save_all(&nodes)?;
        store.flush()
    })
    .await
    .map_err(|e| NodeStoreError::Storage(e.to_string()))??;

    registry.metrics().inc_flushes();
    Ok(count)
}
