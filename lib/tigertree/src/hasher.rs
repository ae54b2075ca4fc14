//! Incremental TTH over an abstract node array.
//!
//! Leaves arrive in any order (hashing runs in parallel over many blocks);
//! every completed leaf is written to the backing storage and propagation
//! walks toward the root for as long as complete subtrees are available.
//! Since the backing storage persists, a half-finished hash survives restart
//! and picks up where it left off.

use thiserror::Error;

use crate::node::{node_digest, TigerDigest, TigerNode};
use crate::tree::{tree_size, NodeIdx};

/// Random access array of [`TigerNode`], the backing of a [`TreeHasher`].
pub trait NodeStorage {
    /// Number of node slots available.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> TigerNode;

    fn put(&mut self, index: usize, node: &TigerNode);
}

impl NodeStorage for Vec<TigerNode> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> TigerNode {
        self[index]
    }

    fn put(&mut self, index: usize, node: &TigerNode) {
        self[index] = *node;
    }
}

#[derive(Debug, Error)]
#[error("node storage holds {actual} nodes but a tree of {leaves} leaves needs {needed}")]
pub struct StorageTooSmall {
    pub leaves: u32,
    pub needed: usize,
    pub actual: usize,
}

/// Incremental hasher over a tree with a fixed leaf count.
#[derive(Debug)]
pub struct TreeHasher<S> {
    storage: S,
    leaves: u32,
}

impl<S: NodeStorage> TreeHasher<S> {
    /// Wrap `storage` as a tree of `leaves` leaf nodes. The storage must be
    /// large enough to hold the full tree.
    pub fn new(storage: S, leaves: u32) -> Result<Self, StorageTooSmall> {
        debug_assert!(leaves >= 1);
        let needed = tree_size(leaves) as usize;
        if storage.len() < needed {
            return Err(StorageTooSmall {
                leaves,
                needed,
                actual: storage.len(),
            });
        }
        Ok(Self { storage, leaves })
    }

    pub fn leaves(&self) -> u32 {
        self.leaves
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Whether leaf `i` has a verified digest.
    pub fn is_leaf_set(&self, i: u32) -> bool {
        self.node(self.leaf(i)).is_set()
    }

    /// The root node; empty until every leaf below it has been set.
    pub fn root(&self) -> TigerNode {
        self.node(NodeIdx::new(0, 1))
    }

    /// Store the digest for leaf `i` and propagate upward: a parent becomes
    /// set as soon as both children are, and an unpaired trailing node is
    /// promoted one layer up without rehashing.
    pub fn set_leaf(&mut self, i: u32, digest: TigerDigest) {
        let mut idx = self.leaf(i);
        debug_assert!(idx.is_valid());
        let mut node = TigerNode::set(digest);
        self.put(idx, &node);

        while !idx.is_root() {
            let sibling = idx.sibling();
            let parent_digest = if sibling.is_valid() {
                let other = self.node(sibling);
                if !other.is_set() {
                    return;
                }
                if idx.index & 1 == 0 {
                    node_digest(&node.digest, &other.digest)
                } else {
                    node_digest(&other.digest, &node.digest)
                }
            } else {
                node.digest
            };

            idx = idx.parent();
            node = TigerNode::set(parent_digest);
            self.put(idx, &node);
        }
    }

    fn leaf(&self, i: u32) -> NodeIdx {
        NodeIdx::new(i, self.leaves)
    }

    fn node(&self, idx: NodeIdx) -> TigerNode {
        self.storage.get(idx.flat_index())
    }

    fn put(&mut self, idx: NodeIdx, node: &TigerNode) {
        self.storage.put(idx.flat_index(), node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{leaf_digest, BLOCK_SIZE};
    use crate::reference;

    fn storage_for(leaves: u32) -> Vec<TigerNode> {
        vec![TigerNode::EMPTY; tree_size(leaves) as usize]
    }

    fn hash_by_blocks(data: &[u8], order: impl IntoIterator<Item = u32>) -> TreeHasher<Vec<TigerNode>> {
        let leaves = data.chunks(BLOCK_SIZE).count().max(1) as u32;
        let mut hasher = TreeHasher::new(storage_for(leaves), leaves).unwrap();
        let blocks: Vec<&[u8]> = if data.is_empty() {
            vec![&[]]
        } else {
            data.chunks(BLOCK_SIZE).collect()
        };
        for i in order {
            hasher.set_leaf(i, leaf_digest(blocks[i as usize]));
        }
        hasher
    }

    #[test]
    fn rejects_undersized_storage() {
        assert!(TreeHasher::new(storage_for(3), 4).is_err());
        assert!(TreeHasher::new(storage_for(4), 4).is_ok());
    }

    #[test]
    fn single_leaf_is_root() {
        let hasher = hash_by_blocks(b"hello", [0]);
        assert!(hasher.is_leaf_set(0));
        assert_eq!(hasher.root().digest, reference::hash(b"hello"));
    }

    #[test]
    fn root_stays_empty_until_all_leaves_arrive() {
        let data = vec![0x5Au8; BLOCK_SIZE * 4];
        let mut hasher = hash_by_blocks(&data, [0, 2, 3]);
        assert!(!hasher.root().is_set());
        assert!(!hasher.is_leaf_set(1));

        hasher.set_leaf(1, leaf_digest(&data[BLOCK_SIZE..2 * BLOCK_SIZE]));
        assert!(hasher.root().is_set());
        assert_eq!(hasher.root().digest, reference::hash(&data));
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let data: Vec<u8> = (0..BLOCK_SIZE * 5 + 13).map(|i| i as u8).collect();
        let forward = hash_by_blocks(&data, 0..6);
        let backward = hash_by_blocks(&data, (0..6).rev());
        assert_eq!(forward.root().digest, backward.root().digest);
        assert_eq!(forward.root().digest, reference::hash(&data));
    }

    #[test]
    fn unpaired_leaf_promotes_without_rehash() {
        // Three leaves: root = node(node(l0, l1), l2), with l2 promoted
        // through the two-node layer untouched.
        let data = vec![7u8; BLOCK_SIZE * 3];
        let hasher = hash_by_blocks(&data, 0..3);

        let l = leaf_digest(&data[..BLOCK_SIZE]);
        let expected = node_digest(&node_digest(&l, &l), &l);
        assert_eq!(hasher.root().digest, expected);
        assert_eq!(hasher.root().digest, reference::hash(&data));
    }

    #[test]
    fn sibling_completion_sets_parent() {
        let data = vec![1u8; BLOCK_SIZE * 2];
        let hasher = hash_by_blocks(&data, 0..2);
        let l = leaf_digest(&data[..BLOCK_SIZE]);
        assert_eq!(hasher.root().digest, node_digest(&l, &l));
    }

    #[test]
    fn multi_layer_payload_matches_reference() {
        // 2 MiB: 2048 leaves, 12 layers.
        let data: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i * 31) as u8).collect();
        let hasher = hash_by_blocks(&data, 0..2048);
        assert_eq!(hasher.root().digest, reference::hash(&data));
    }
}
