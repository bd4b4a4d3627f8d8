//! JSON file-based node store with atomic writes.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::node::Node;

use super::{NodeStore, NodeStoreError};

/// JSON file store. Loaded to memory on startup, written back on flush.
///
/// Scores are not stored; callers recompute them after `load_all`.
#[derive(Debug)]
pub struct FileNodeStore {
    path: PathBuf,
    nodes: RwLock<Vec<Node>>,
    dirty: Mutex<bool>,
}

impl FileNodeStore {
    /// Load existing file or create empty store.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, NodeStoreError> {
        let path = path.into();
        let nodes = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            nodes: RwLock::new(nodes),
            dirty: Mutex::new(false),
        })
    }

    /// Create store, making parent directories if needed.
    pub fn new_with_create_dir(path: impl Into<PathBuf>) -> Result<Self, NodeStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::new(path)
    }

    fn load_from_file(path: &Path) -> Result<Vec<Node>, NodeStoreError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        serde_json::from_reader(reader).map_err(|e| NodeStoreError::Serialization(e.to_string()))
    }

    fn save_to_file(&self) -> Result<(), NodeStoreError> {
        let nodes = self.nodes.read();

        // Write to temp file first, then rename (atomic)
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let writer = BufWriter::new(file);
            serde_json::to_writer_pretty(writer, &*nodes)
                .map_err(|e| NodeStoreError::Serialization(e.to_string()))?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        *self.dirty.lock()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NodeStore for FileNodeStore {
    fn load_all(&self) -> Result<Vec<Node>, NodeStoreError> {
        Ok(self.nodes.read().clone())
    }

    fn save_all(&self, nodes: &[Node]) -> Result<(), NodeStoreError> {
        *self.nodes.write() = nodes.to_vec();
        *self.dirty.lock() = true;
        Ok(())
    }

    fn count(&self) -> Result<usize, NodeStoreError> {
        Ok(self.nodes.read().len())
    }

    fn flush(&self) -> Result<(), NodeStoreError> {
        let mut dirty = self.dirty.lock();
        if *dirty {
            self.save_to_file()?;
            *dirty = false;
        }
        Ok(())
    }
}

impl Drop for FileNodeStore {
    fn drop(&mut self) {
        if self.is_dirty() {
            let _ = self.save_to_file();
        }
    }
}
