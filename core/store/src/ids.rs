//! Asset identifiers and the control requests this core consumes.
//!
//! The wire protocol carries a set of `(hash type, digest)` pairs per asset.
//! Every family is stored and indexed, but only `TREE_TIGER` is ever trusted
//! for content verification. The text form of an identifier is RFC 4648
//! base32, uppercase without padding.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use data_encoding::BASE32_NOPAD;
use tigertree::{TigerDigest, DIGEST_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    Sha1,
    Sha256,
    TreeTiger,
    Ed2k,
}

impl HashType {
    pub fn name(self) -> &'static str {
        match self {
            HashType::Sha1 => "SHA1",
            HashType::Sha256 => "SHA256",
            HashType::TreeTiger => "TREE_TIGER",
            HashType::Ed2k => "ED2K",
        }
    }

    /// Directory name of this family's index under the store meta dir.
    pub fn dir_name(self) -> &'static str {
        match self {
            HashType::Sha1 => "sha1",
            HashType::Sha256 => "sha256",
            HashType::TreeTiger => "tiger",
            HashType::Ed2k => "ed2k",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub hash_type: HashType,
    pub id: Bytes,
}

impl Identifier {
    pub fn new(hash_type: HashType, id: impl Into<Bytes>) -> Self {
        Self {
            hash_type,
            id: id.into(),
        }
    }

    pub fn tree_tiger(digest: TigerDigest) -> Self {
        Self::new(HashType::TreeTiger, digest.to_vec())
    }

    pub fn base32(&self) -> String {
        BASE32_NOPAD.encode(&self.id)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.hash_type.name(), self.base32())
    }
}

pub type BitHordeIds = Vec<Identifier>;

/// The tiger digest out of an identifier set, if present and well-formed.
pub fn find_tiger_id(ids: &[Identifier]) -> Option<TigerDigest> {
    ids.iter()
        .find(|id| id.hash_type == HashType::TreeTiger && id.id.len() == DIGEST_SIZE)
        .map(|id| {
            let mut digest = [0u8; DIGEST_SIZE];
            digest.copy_from_slice(&id.id);
            digest
        })
}

/// Request to open an asset for reading.
#[derive(Debug, Clone, Default)]
pub struct BindRead {
    pub ids: BitHordeIds,
    /// Remaining time budget, as supplied by the requester.
    pub timeout: Option<Duration>,
    /// Peer name of the session the request came in on, if any.
    pub requester: Option<String>,
    /// Names of peers this request has already traversed.
    pub routes: Vec<String>,
}

impl BindRead {
    pub fn new(ids: BitHordeIds) -> Self {
        Self {
            ids,
            ..Default::default()
        }
    }
}

/// Request to begin writing an upload-type asset.
#[derive(Debug, Clone, Copy)]
pub struct BindWrite {
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiger_id_lookup() {
        let digest = [0x11u8; DIGEST_SIZE];
        let ids = vec![
            Identifier::new(HashType::Sha256, vec![0u8; 32]),
            Identifier::tree_tiger(digest),
        ];
        assert_eq!(find_tiger_id(&ids), Some(digest));
        assert_eq!(find_tiger_id(&ids[..1]), None);
    }

    #[test]
    fn malformed_tiger_id_is_skipped() {
        let ids = vec![Identifier::new(HashType::TreeTiger, vec![0u8; 8])];
        assert_eq!(find_tiger_id(&ids), None);
    }

    #[test]
    fn display_is_unpadded_upper_base32() {
        let id = Identifier::new(HashType::TreeTiger, vec![0u8; DIGEST_SIZE]);
        let text = id.to_string();
        let (family, b32) = text.split_once('=').unwrap();
        assert_eq!(family, "TREE_TIGER");
        assert_eq!(b32, BASE32_NOPAD.encode(&[0u8; DIGEST_SIZE]));
        assert!(!b32.contains('='));
    }
}
