//! Durable node persistence trait and implementations (memory, file).

mod file;
mod memory;

use auto_impl::auto_impl;
use thiserror::Error;

use crate::node::Node;

pub use file::FileNodeStore;
pub use memory::MemoryNodeStore;

#[derive(Debug, Error)]
pub enum NodeStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Node persistence with auto-impl for &, Box, Arc.
///
/// The registry always writes its full node set; `save_all` replaces
/// whatever the store held before.
#[auto_impl(&, Box, Arc)]
pub trait NodeStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Node>, NodeStoreError>;

    fn save_all(&self, nodes: &[Node]) -> Result<(), NodeStoreError>;

    fn count(&self) -> Result<usize, NodeStoreError> {
        Ok(self.load_all()?.len())
    }

    fn flush(&self) -> Result<(), NodeStoreError> {
        Ok(())
    }
}
