//! Tiger Tree Hash (TTH) primitives.
//!
//! A TTH is a Merkle tree built with the Tiger hash function: leaves hash
//! 1 KiB blocks of content under a `0x00` domain prefix, interior nodes hash
//! the concatenation of their children under a `0x01` prefix, and an unpaired
//! trailing node on an odd layer is promoted to its parent without rehashing.
//!
//! The whole tree is kept in a single flat array, layer by layer with the
//! root at index 0, so it can live directly inside a fixed-size file mapping.
//! [`tree`] provides the index arithmetic over that array, [`node`] the
//! fixed-size node record and the two digest rules, and [`hasher`] an
//! incremental hasher that accepts leaves in any order and propagates
//! completed subtrees toward the root.

pub mod hasher;
pub mod node;
pub mod reference;
pub mod tree;

pub use hasher::{NodeStorage, StorageTooSmall, TreeHasher};
pub use node::{
    leaf_digest,
    node_digest,
    NodeState,
    TigerDigest,
    TigerNode,
    BLOCK_SIZE,
    DIGEST_SIZE,
    NODE_SIZE,
};
pub use tree::{bottom_layer_size, parent_layer_size, tree_size, NodeIdx};
