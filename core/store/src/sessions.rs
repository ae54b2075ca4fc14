//! Live-asset registry.
//!
//! Maps a TTH root digest to the one live [`StoredAsset`] representing it,
//! held weakly so an asset's lifetime stays with its sessions. Dead entries
//! are purged when a lookup fails to upgrade them.
//!
//! Lookup-or-create sequences span several awaits, so the registry also
//! hands out one async bind lock per digest: whoever may end up inserting
//! for a digest holds its lock for the whole sequence, keeping the digest
//! mapped to at most one live asset process-wide.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tigertree::TigerDigest;
use tokio::sync::Mutex as AsyncMutex;

use crate::asset::StoredAsset;

#[derive(Default)]
pub struct AssetSessions {
    map: Mutex<HashMap<TigerDigest, Weak<StoredAsset>>>,
    binding: Mutex<HashMap<TigerDigest, Arc<AsyncMutex<()>>>>,
}

impl AssetSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, digest: &TigerDigest) -> Option<Arc<StoredAsset>> {
        let mut map = self.map.lock();
        match map.get(digest).map(Weak::upgrade) {
            Some(Some(asset)) => Some(asset),
            Some(None) => {
                map.remove(digest);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, digest: TigerDigest, asset: &Arc<StoredAsset>) {
        self.map.lock().insert(digest, Arc::downgrade(asset));
    }

    /// The lock serializing lookup-or-create for `digest`. Hold its guard
    /// across the whole lookup, construct and insert sequence, then call
    /// [`release_bind_lock`](Self::release_bind_lock).
    pub fn bind_lock(&self, digest: &TigerDigest) -> Arc<AsyncMutex<()>> {
        self.binding.lock().entry(*digest).or_default().clone()
    }

    /// Drop the bind-lock entry once no caller references it anymore.
    pub fn release_bind_lock(&self, digest: &TigerDigest) {
        let mut binding = self.binding.lock();
        if binding
            .get(digest)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            binding.remove(digest);
        }
    }

    /// Number of currently live entries.
    pub fn live(&self) -> usize {
        self.map
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
