//! In-memory node store (does not persist across restarts).

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::node::Node;

use super::{NodeStore, NodeStoreError};

/// In-memory node store for testing.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<Vec<Node>>,
    saves: AtomicUsize,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, as if a previous run had saved `nodes`.
    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save_all` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl NodeStore for MemoryNodeStore {
    fn load_all(&self) -> Result<Vec<Node>, NodeStoreError> {
        Ok(self.nodes.read().clone())
    }

    fn save_all(&self, nodes: &[Node]) -> Result<(), NodeStoreError> {
        *self.nodes.write() = nodes.to_vec();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn count(&self) -> Result<usize, NodeStoreError> {
        Ok(self.nodes.read().len())
    }
}
