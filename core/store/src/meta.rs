//! The persistent node array backing one asset's hash tree.
//!
//! A `meta` file is a flat array of 32-byte tree nodes, memory-mapped for
//! node-granular access. A fresh file is zero-filled, which decodes as
//! all-empty nodes, so creation and "no progress yet" are the same state.

use std::path::Path;

use arrayref::array_ref;
use fmmap::tokio::{AsyncMmapFileExt, AsyncMmapFileMut, AsyncMmapFileMutExt};
use tigertree::{NodeStorage, TigerNode, NODE_SIZE};
use tracing::warn;

use crate::error::OpenError;

pub struct MetaStore {
    map: AsyncMmapFileMut,
    nodes: usize,
}

impl std::fmt::Debug for MetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaStore")
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl MetaStore {
    /// Open or create `path` with room for `node_count` nodes. An existing
    /// shorter file is extended with zeroes; a longer one is left alone (the
    /// tail is simply unused capacity).
    pub async fn open(path: impl AsRef<Path>, node_count: usize) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let wanted = (node_count * NODE_SIZE) as u64;

        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .await?;
        if file.metadata().await?.len() < wanted {
            file.set_len(wanted).await?;
        }
        drop(file);

        let map = unsafe { AsyncMmapFileMut::open(path) }.await?;
        Ok(Self {
            map,
            nodes: node_count,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Push written nodes out to the backing file.
    pub fn flush(&self) -> Result<(), fmmap::error::Error> {
        self.map.flush()
    }
}

impl NodeStorage for MetaStore {
    fn len(&self) -> usize {
        self.nodes
    }

    fn get(&self, index: usize) -> TigerNode {
        debug_assert!(index < self.nodes);
        let offset = index * NODE_SIZE;
        TigerNode::from_bytes(array_ref![self.map.as_slice(), offset, NODE_SIZE])
    }

    fn put(&mut self, index: usize, node: &TigerNode) {
        debug_assert!(index < self.nodes);
        let offset = index * NODE_SIZE;
        self.map.as_mut_slice()[offset..offset + NODE_SIZE].copy_from_slice(&node.to_bytes());
    }
}

impl Drop for MetaStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("failed flushing metadata on close: {e}");
        }
    }
}
