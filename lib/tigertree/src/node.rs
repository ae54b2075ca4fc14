//! The fixed-size tree node record and the two TTH digest rules.

use arrayref::array_ref;
use tiger::{Digest, Tiger};

/// TTH leaf granularity in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Tiger digest length in bytes.
pub const DIGEST_SIZE: usize = 24;

/// On-disk node record length: 1 state byte, 7 reserved zero bytes, digest.
pub const NODE_SIZE: usize = 32;

pub type TigerDigest = [u8; DIGEST_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Empty,
    Set,
}

/// One node of the hash tree. The digest is meaningless unless the state
/// is [`NodeState::Set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TigerNode {
    pub state: NodeState,
    pub digest: TigerDigest,
}

impl TigerNode {
    pub const EMPTY: TigerNode = TigerNode {
        state: NodeState::Empty,
        digest: [0; DIGEST_SIZE],
    };

    #[inline]
    pub fn set(digest: TigerDigest) -> Self {
        Self {
            state: NodeState::Set,
            digest,
        }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.state == NodeState::Set
    }

    /// Encode into the 32-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; NODE_SIZE] {
        let mut buf = [0u8; NODE_SIZE];
        buf[0] = match self.state {
            NodeState::Empty => 0,
            NodeState::Set => 1,
        };
        buf[8..].copy_from_slice(&self.digest);
        buf
    }

    /// Decode the 32-byte on-disk form. Reserved state values are treated
    /// as empty so an upgraded format never reads as valid data.
    pub fn from_bytes(buf: &[u8; NODE_SIZE]) -> Self {
        let state = match buf[0] {
            1 => NodeState::Set,
            _ => NodeState::Empty,
        };
        Self {
            state,
            digest: *array_ref![buf, 8, DIGEST_SIZE],
        }
    }
}

impl Default for TigerNode {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Digest of one content block: `Tiger(0x00 || block)`.
///
/// The final block of a file may be shorter than [`BLOCK_SIZE`]; callers
/// must never pass more than one block at a time.
pub fn leaf_digest(block: &[u8]) -> TigerDigest {
    debug_assert!(block.len() <= BLOCK_SIZE);
    let mut hasher = Tiger::new();
    hasher.update([0u8]);
    hasher.update(block);
    hasher.finalize().into()
}

/// Digest of an interior node: `Tiger(0x01 || left || right)`.
pub fn node_digest(left: &TigerDigest, right: &TigerDigest) -> TigerDigest {
    let mut hasher = Tiger::new();
    hasher.update([1u8]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use data_encoding::BASE32_NOPAD;

    use super::*;

    // The well-known TTH of the empty payload, i.e. Tiger(0x00).
    const EMPTY_TTH: &str = "LWPNACQDBZRYXW3VHJVCJ64QBZNGHOHHHZWCLNQ";

    #[test]
    fn empty_leaf_matches_published_vector() {
        let expected = BASE32_NOPAD.decode(EMPTY_TTH.as_bytes()).unwrap();
        assert_eq!(leaf_digest(&[]).as_slice(), expected.as_slice());
    }

    #[test]
    fn node_codec_round_trip() {
        let digest = leaf_digest(b"some block");
        let node = TigerNode::set(digest);
        let decoded = TigerNode::from_bytes(&node.to_bytes());
        assert_eq!(decoded, node);

        let empty = TigerNode::from_bytes(&TigerNode::EMPTY.to_bytes());
        assert!(!empty.is_set());
    }

    #[test]
    fn encoded_layout() {
        let node = TigerNode::set([0xAB; DIGEST_SIZE]);
        let bytes = node.to_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..8], &[0; 7]);
        assert_eq!(&bytes[8..], &[0xAB; DIGEST_SIZE]);
    }

    #[test]
    fn reserved_state_decodes_as_empty() {
        let mut bytes = TigerNode::set([7; DIGEST_SIZE]).to_bytes();
        bytes[0] = 0x7F;
        assert!(!TigerNode::from_bytes(&bytes).is_set());
    }

    #[test]
    fn leaf_and_node_digests_differ_on_same_input() {
        let d = leaf_digest(b"x");
        assert_ne!(node_digest(&d, &d), d);
    }
}
