//! Straightforward whole-buffer TTH.
//!
//! Hashes every block, then folds layers bottom-up until one digest remains.
//! Slower than [`crate::hasher`] and needs the entire payload in memory, but
//! trivially correct, which makes it the yardstick for the incremental
//! implementation and a convenient one-shot hash for client-side tooling.

use crate::node::{leaf_digest, node_digest, TigerDigest, BLOCK_SIZE};

/// Compute the TTH root digest of `data`.
pub fn hash(data: &[u8]) -> TigerDigest {
    let mut layer: Vec<TigerDigest> = data.chunks(BLOCK_SIZE).map(leaf_digest).collect();
    if layer.is_empty() {
        // An empty payload still has one (empty) leaf.
        layer.push(leaf_digest(&[]));
    }

    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => node_digest(left, right),
                [lone] => *lone,
                _ => unreachable!(),
            })
            .collect();
    }
    layer[0]
}
