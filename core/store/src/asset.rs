//! Stored assets: a data file plus its persistent hash tree.
//!
//! Reads are gated on hash validity: a byte is only ever served once the
//! 1 KiB block it belongs to has a set leaf in the tree. Hashing runs as a
//! self-bounded pipeline of block jobs on the CPU pool; the pipeline holds a
//! strong reference to the asset, so dropping every session handle lets an
//! in-flight hash run to completion before the asset is freed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tigertree::{leaf_digest, tree_size, TigerDigest, TreeHasher, BLOCK_SIZE};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::dispatch::Dispatcher;
use crate::error::{HashError, OpenError, ReadError};
use crate::ids::{BitHordeIds, Identifier};
use crate::meta::MetaStore;
use crate::raf::{Mode, RandomAccessFile};

/// Upper bound on a single read.
pub const MAX_CHUNK: usize = 64 * 1024;

/// In-flight block-hash jobs per asset.
pub const PARALLEL_HASH_JOBS: usize = 64;

const BLOCK: u64 = BLOCK_SIZE as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Success,
    NotFound,
    Timeout,
}

/// A servable asset, local or forwarded.
#[async_trait]
pub trait Asset: Send + Sync {
    fn size(&self) -> u64;

    /// Deliver up to `len` verified bytes from `offset`. A range that is not
    /// (yet) backed by validated data yields an empty buffer, never
    /// unverified bytes.
    async fn read(&self, offset: u64, len: usize) -> Result<Bytes, ReadError>;

    /// The asset's identifiers; empty until the root hash is known.
    fn ids(&self) -> BitHordeIds;

    fn status(&self) -> watch::Receiver<Status>;
}

/// An asset folder: `data` plus its `meta` hash tree.
#[derive(Debug)]
pub struct StoredAsset {
    folder: PathBuf,
    file: Arc<RandomAccessFile>,
    hasher: Mutex<TreeHasher<MetaStore>>,
    dispatcher: Dispatcher,
    status_tx: watch::Sender<Status>,
}

impl StoredAsset {
    /// Open the asset under `folder`, adopting the data file's on-disk size.
    pub async fn open(
        dispatcher: Dispatcher,
        folder: impl Into<PathBuf>,
        mode: Mode,
    ) -> Result<Arc<Self>, OpenError> {
        Self::with_size(dispatcher, folder, mode, 0).await
    }

    /// Open the asset under `folder`, requiring the data file to be
    /// `size` bytes (creating it at that size when write access allows).
    pub async fn with_size(
        dispatcher: Dispatcher,
        folder: impl Into<PathBuf>,
        mode: Mode,
        size: u64,
    ) -> Result<Arc<Self>, OpenError> {
        let folder = folder.into();
        let file = RandomAccessFile::open(folder.join("data"), mode, size)?;
        let leaves = file.blocks(BLOCK).max(1);
        let meta = MetaStore::open(folder.join("meta"), tree_size(leaves) as usize).await?;
        let hasher = TreeHasher::new(meta, leaves)?;

        let initial = if hasher.root().is_set() {
            Status::Success
        } else {
            Status::Pending
        };
        let (status_tx, _) = watch::channel(initial);

        Ok(Arc::new(Self {
            folder,
            file: Arc::new(file),
            hasher: Mutex::new(hasher),
            dispatcher,
            status_tx,
        }))
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn has_root_hash(&self) -> bool {
        self.hasher.lock().root().is_set()
    }

    pub fn root_digest(&self) -> Option<TigerDigest> {
        let root = self.hasher.lock().root();
        root.is_set().then_some(root.digest)
    }

    /// The largest verified prefix of `[offset, offset + len)`, capped at
    /// [`MAX_CHUNK`]. Zero whenever the block containing `offset` is not yet
    /// hashed.
    pub fn can_read(&self, offset: u64, len: usize) -> usize {
        let stop = (offset + len.min(MAX_CHUNK) as u64).min(self.size());
        if stop <= offset {
            return 0;
        }
        let first_block = offset / BLOCK;
        let last_block = (stop - 1) / BLOCK;

        let hasher = self.hasher.lock();
        let mut res = 0usize;
        for block in first_block..=last_block {
            if !hasher.is_leaf_set(block as u32) {
                break;
            }
            res += BLOCK_SIZE;
            if block == first_block {
                res -= (offset % BLOCK) as usize;
            }
            if block == last_block {
                let overflow = stop % BLOCK;
                if overflow != 0 {
                    res -= BLOCK_SIZE - overflow as usize;
                }
            }
        }
        res
    }

    /// Tell the asset that `[offset, offset + len)` now holds valid data,
    /// scheduling hash jobs for every whole block in the range (the final
    /// partial block counts once the range reaches end of file).
    pub fn notify_valid_range(self: &Arc<Self>, offset: u64, len: u64) {
        let filesize = self.size();
        let mut end = (offset + len).min(filesize);
        let offset = round_up(offset, BLOCK);
        if end != filesize {
            end = round_down(end, BLOCK);
        }
        self.update_hash(offset, end);
    }

    /// Surface SUCCESS to waiting sessions once the root is set. Reported at
    /// most once.
    pub fn update_status(&self) {
        if self.has_root_hash() {
            self.status_tx.send_if_modified(|status| {
                if *status != Status::Success {
                    *status = Status::Success;
                    true
                } else {
                    false
                }
            });
        }
    }

    fn update_hash(self: &Arc<Self>, offset: u64, end: u64) {
        let tail = HashTail {
            asset: self.clone(),
            offset,
            end,
        };
        tokio::spawn(tail.run());
    }

    /// Record one hashed leaf. The propagation walk runs under the hasher
    /// lock; the metadata is flushed whenever the walk completes the root.
    fn store_leaf(&self, block: u32, digest: TigerDigest) {
        let mut hasher = self.hasher.lock();
        hasher.set_leaf(block, digest);
        if hasher.root().is_set() {
            if let Err(e) = hasher.storage().flush() {
                warn!(asset = %self.folder.display(), "failed flushing metadata: {e}");
            }
        }
    }
}

#[async_trait]
impl Asset for StoredAsset {
    fn size(&self) -> u64 {
        self.file.size()
    }

    async fn read(&self, offset: u64, len: usize) -> Result<Bytes, ReadError> {
        if offset > self.size() {
            return Err(ReadError::OutOfRange);
        }
        let len = self.can_read(offset, len);
        if len == 0 {
            return Ok(Bytes::new());
        }

        let file = self.file.clone();
        let read = self
            .dispatcher
            .dispatch(move || {
                let mut buf = vec![0u8; len];
                file.read_exact_at(offset, &mut buf).map(|()| buf)
            })
            .await;
        match read {
            Ok(Ok(buf)) => Ok(Bytes::from(buf)),
            Ok(Err(e)) => {
                // Transient I/O trouble shows up as a miss, not as an error.
                warn!(asset = %self.folder.display(), offset, "read failed: {e}");
                Ok(Bytes::new())
            }
            Err(e) => {
                warn!(asset = %self.folder.display(), offset, "read not dispatched: {e}");
                Ok(Bytes::new())
            }
        }
    }

    fn ids(&self) -> BitHordeIds {
        match self.root_digest() {
            Some(digest) => vec![Identifier::tree_tiger(digest)],
            None => Vec::new(),
        }
    }

    fn status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }
}

impl Drop for StoredAsset {
    fn drop(&mut self) {
        if let Err(e) = self.hasher.lock().storage().flush() {
            warn!(asset = %self.folder.display(), "failed flushing metadata on drop: {e}");
        }
    }
}

/// The remainder of one hashing request. Keeps the asset alive until every
/// launched block has reported back.
struct HashTail {
    asset: Arc<StoredAsset>,
    offset: u64,
    end: u64,
}

impl HashTail {
    async fn run(mut self) {
        if self.asset.size() == 0 {
            // An empty file still has its one (empty) leaf.
            self.asset.store_leaf(0, leaf_digest(&[]));
            self.asset.update_status();
            return;
        }

        let mut jobs = JoinSet::new();
        for _ in 0..PARALLEL_HASH_JOBS {
            if !self.launch_next(&mut jobs) {
                break;
            }
        }

        let mut failed = false;
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(Ok((block, digest))) => {
                    self.asset.store_leaf(block, digest);
                    if !failed {
                        self.launch_next(&mut jobs);
                    }
                }
                Ok(Err(e)) => {
                    // The faulty leaf stays empty, denying reads of its range.
                    error!(asset = %self.asset.folder().display(), "block hashing failed: {e}");
                    failed = true;
                }
                Err(e) => {
                    error!(asset = %self.asset.folder().display(), "hash job died: {e}");
                    failed = true;
                }
            }
        }
        self.asset.update_status();
    }

    /// Queue the next unhashed block, one [`BLOCK_SIZE`] unit at a time.
    fn launch_next(&mut self, jobs: &mut JoinSet<Result<(u32, TigerDigest), HashError>>) -> bool {
        if self.offset >= self.end {
            return false;
        }
        let block_len = (self.end - self.offset).min(BLOCK) as usize;
        let block = (self.offset / BLOCK) as u32;
        let offset = self.offset;
        self.offset += block_len as u64;

        let file = self.asset.file.clone();
        let dispatcher = self.asset.dispatcher.clone();
        jobs.spawn(async move {
            let digest = dispatcher
                .dispatch(move || {
                    let mut buf = vec![0u8; block_len];
                    file.read_exact_at(offset, &mut buf)?;
                    Ok::<_, ReadError>(leaf_digest(&buf))
                })
                .await??;
            Ok((block, digest))
        });
        true
    }
}

fn round_up(value: u64, to: u64) -> u64 {
    ((value + to - 1) / to) * to
}

fn round_down(value: u64, to: u64) -> u64 {
    value - value % to
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tigertree::reference;

    use super::*;
    use crate::ids::{find_tiger_id, HashType};

    async fn asset_with_content(
        dir: &Path,
        content: &[u8],
    ) -> Result<Arc<StoredAsset>, OpenError> {
        std::fs::write(dir.join("data"), content).unwrap();
        StoredAsset::open(Dispatcher::default(), dir, Mode::Read).await
    }

    async fn wait_success(asset: &Arc<StoredAsset>) {
        let mut status = asset.status();
        tokio::time::timeout(Duration::from_secs(10), async {
            while *status.borrow_and_update() != Status::Success {
                status.changed().await.unwrap();
            }
        })
        .await
        .expect("asset never reached SUCCESS");
    }

    async fn wait_for(mut probe: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !probe() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never became true");
    }

    #[tokio::test]
    async fn hashes_and_serves_verified_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![0xAAu8; 3072];
        let asset = asset_with_content(dir.path(), &content).await.unwrap();

        assert_eq!(asset.ids(), Vec::new());
        asset.notify_valid_range(0, asset.size());
        wait_success(&asset).await;

        assert_eq!(asset.can_read(0, 1024), 1024);
        let bytes = asset.read(0, 1024).await.unwrap();
        assert_eq!(&bytes[..], &content[..1024]);

        let ids = asset.ids();
        assert_eq!(ids[0].hash_type, HashType::TreeTiger);
        assert_eq!(find_tiger_id(&ids), Some(reference::hash(&content)));
    }

    #[tokio::test]
    async fn partial_validity_gates_reads() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..5120).map(|i| i as u8).collect();
        let asset = asset_with_content(dir.path(), &content).await.unwrap();

        // Only the first two blocks become valid.
        asset.notify_valid_range(0, 2048);
        wait_for(|| asset.can_read(0, 2048) == 2048).await;

        assert_eq!(asset.can_read(512, 4096), 2 * 1024 - 512);
        assert_eq!(asset.can_read(2048, 1024), 0);
        assert!(!asset.has_root_hash());

        let bytes = asset.read(512, 4096).await.unwrap();
        assert_eq!(bytes.len(), 1536);
        assert_eq!(&bytes[..], &content[512..2048]);

        let miss = asset.read(2048, 1024).await.unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn unaligned_notify_rounds_inward() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![3u8; 4096];
        let asset = asset_with_content(dir.path(), &content).await.unwrap();

        // [100, 2100) only fully covers block 1.
        asset.notify_valid_range(100, 2000);
        wait_for(|| asset.can_read(1024, 1024) == 1024).await;
        assert_eq!(asset.can_read(0, 1024), 0);
        assert_eq!(asset.can_read(2048, 1024), 0);
    }

    #[tokio::test]
    async fn reads_are_capped_at_max_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![9u8; 2 * MAX_CHUNK];
        let asset = asset_with_content(dir.path(), &content).await.unwrap();
        asset.notify_valid_range(0, asset.size());
        wait_success(&asset).await;

        assert_eq!(asset.can_read(0, 2 * MAX_CHUNK), MAX_CHUNK);
        let bytes = asset.read(0, 2 * MAX_CHUNK).await.unwrap();
        assert_eq!(bytes.len(), MAX_CHUNK);
    }

    #[tokio::test]
    async fn out_of_range_read_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_content(dir.path(), &[1, 2, 3]).await.unwrap();
        assert!(matches!(
            asset.read(10, 1).await,
            Err(ReadError::OutOfRange)
        ));
    }

    #[tokio::test]
    async fn empty_file_still_gets_a_root() {
        let dir = tempfile::tempdir().unwrap();
        let asset = asset_with_content(dir.path(), &[]).await.unwrap();
        asset.notify_valid_range(0, 0);
        wait_success(&asset).await;

        assert_eq!(find_tiger_id(&asset.ids()), Some(reference::hash(&[])));
        assert_eq!(asset.can_read(0, 1024), 0);
    }

    #[tokio::test]
    async fn hash_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![0x55u8; 2048];
        let root = {
            let asset = asset_with_content(dir.path(), &content).await.unwrap();
            asset.notify_valid_range(0, asset.size());
            wait_success(&asset).await;
            asset.root_digest().unwrap()
        };

        let reopened = StoredAsset::open(Dispatcher::default(), dir.path(), Mode::Read)
            .await
            .unwrap();
        assert!(reopened.has_root_hash());
        assert_eq!(reopened.root_digest(), Some(root));
        assert_eq!(*reopened.status().borrow(), Status::Success);
    }

    #[tokio::test]
    async fn hashing_outlives_dropped_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![0x77u8; 64 * 1024];
        let asset = asset_with_content(dir.path(), &content).await.unwrap();

        let mut status = asset.status();
        asset.notify_valid_range(0, asset.size());
        drop(asset);

        // The tail's strong reference keeps hashing alive to completion.
        tokio::time::timeout(Duration::from_secs(10), async {
            while *status.borrow_and_update() != Status::Success {
                status.changed().await.unwrap();
            }
        })
        .await
        .expect("background hashing never finished");

        let reopened = StoredAsset::open(Dispatcher::default(), dir.path(), Mode::Read)
            .await
            .unwrap();
        assert!(reopened.has_root_hash());
    }
}
