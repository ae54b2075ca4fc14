//! The source store: raw files under a base directory exposed as assets.
//!
//! Ingest (`add_asset`) allocates a pool folder, plants a relative `data`
//! symlink and kicks off hashing; once the root digest is known the id index
//! is updated so later `find_asset` calls resolve it. Live assets are shared
//! through the session registry, one instance per root digest.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tigertree::TigerDigest;
use tokio::fs;
use tracing::{error, warn};

use crate::asset::{Asset as _, Status, StoredAsset};
use crate::config::Config;
use crate::dispatch::{Dispatcher, THREADPOOL_CONCURRENCY};
use crate::error::{IngestError, OpenError};
use crate::ids::{find_tiger_id, BindRead};
use crate::management::{Info, InfoList, Manageable};
use crate::raf::Mode;
use crate::sessions::AssetSessions;
use crate::store::{AssetStore, META_DIR};

pub struct Store {
    label: String,
    base_dir: PathBuf,
    assets: AssetStore,
    sessions: AssetSessions,
    dispatcher: Dispatcher,
}

impl Store {
    /// Open the store rooted at `base_dir`, which must exist.
    pub async fn open(
        label: impl Into<String>,
        base_dir: impl Into<PathBuf>,
    ) -> Result<Arc<Self>, OpenError> {
        let base_dir = fs::canonicalize(base_dir.into()).await?;
        let assets = AssetStore::new(base_dir.join(META_DIR));
        assets.open_or_create().await?;
        Ok(Arc::new(Self {
            label: label.into(),
            base_dir,
            assets,
            sessions: AssetSessions::new(),
            dispatcher: Dispatcher::new(THREADPOOL_CONCURRENCY),
        }))
    }

    pub async fn from_config(config: Config) -> Result<Arc<Self>, OpenError> {
        Self::open(config.label, config.root).await
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Expose `file` as an asset. The file must live under the base
    /// directory; anything else is refused before touching the pool.
    pub async fn add_asset(self: &Arc<Self>, file: &Path) -> Result<Arc<StoredAsset>, IngestError> {
        let file = fs::canonicalize(file).await?;
        if !file.starts_with(&self.base_dir) {
            return Err(IngestError::OutsideBase { path: file });
        }

        let folder = self.assets.new_asset_dir().await?;
        match self.setup_asset(&folder, &file).await {
            Ok(asset) => {
                self.watch_for_root(&asset);
                asset.notify_valid_range(0, asset.size());
                Ok(asset)
            }
            Err(e) => {
                error!(
                    folder = %folder.display(),
                    file = %file.display(),
                    "failed creating asset folder for hashing, purging. {e}"
                );
                if let Err(e) = self.assets.remove_asset(&folder).await {
                    warn!(folder = %folder.display(), "purge failed: {e}");
                }
                Err(e.into())
            }
        }
    }

    /// Open a pool folder directly. An unhashed folder is sent back through
    /// the hash pipeline and reported as absent for this request.
    pub async fn open_asset(
        self: &Arc<Self>,
        folder: &Path,
    ) -> Result<Option<Arc<StoredAsset>>, OpenError> {
        let asset = StoredAsset::open(self.dispatcher.clone(), folder, Mode::Read).await?;
        if asset.has_root_hash() {
            Ok(Some(asset))
        } else {
            warn!(folder = %folder.display(), "unhashed asset detected, hashing");
            self.watch_for_root(&asset);
            asset.notify_valid_range(0, asset.size());
            Ok(None)
        }
    }

    /// Look an asset up by the request's tiger id: live sessions first, then
    /// the on-disk index (re-verifying the root against the link name).
    /// Bind attempts for one digest are serialized, so a digest never gets a
    /// second live instance.
    pub async fn find_asset(self: &Arc<Self>, req: &BindRead) -> Option<Arc<StoredAsset>> {
        let digest = find_tiger_id(&req.ids)?;
        if let Some(asset) = self.sessions.lookup(&digest) {
            return Some(asset);
        }

        let lock = self.sessions.bind_lock(&digest);
        let guard = lock.lock().await;
        // A concurrent bind may have won while we queued for the lock.
        let found = match self.sessions.lookup(&digest) {
            Some(asset) => Some(asset),
            None => self.bind_indexed(req, digest).await,
        };
        drop(guard);
        drop(lock);
        self.sessions.release_bind_lock(&digest);
        found
    }

    async fn bind_indexed(
        self: &Arc<Self>,
        req: &BindRead,
        digest: TigerDigest,
    ) -> Option<Arc<StoredAsset>> {
        let folder = self.assets.resolve_ids(&req.ids).await?;
        match self.open_asset(&folder).await {
            Ok(Some(asset)) => {
                if asset.root_digest() != Some(digest) {
                    warn!(folder = %folder.display(), "stale id link, ignoring");
                    return None;
                }
                self.sessions.insert(digest, &asset);
                Some(asset)
            }
            Ok(None) => None,
            Err(e) => {
                error!(folder = %folder.display(), "failed opening indexed asset: {e}");
                None
            }
        }
    }

    async fn setup_asset(&self, folder: &Path, file: &Path) -> Result<Arc<StoredAsset>, OpenError> {
        fs::symlink(relative_to(folder, file), folder.join("data")).await?;
        StoredAsset::open(self.dispatcher.clone(), folder, Mode::Read).await
    }

    /// Plant the id links and register the session once the root digest
    /// becomes available.
    fn watch_for_root(self: &Arc<Self>, asset: &Arc<StoredAsset>) {
        let mut status = asset.status();
        let store = Arc::downgrade(self);
        let asset = Arc::downgrade(asset);
        tokio::spawn(async move {
            loop {
                if *status.borrow_and_update() == Status::Success {
                    break;
                }
                if status.changed().await.is_err() {
                    return;
                }
            }
            if let (Some(store), Some(asset)) = (store.upgrade(), asset.upgrade()) {
                store.register(&asset).await;
            }
        });
    }

    async fn register(&self, asset: &Arc<StoredAsset>) {
        let ids = asset.ids();
        if ids.is_empty() {
            return;
        }
        if let Some(digest) = find_tiger_id(&ids) {
            // Inserting under the bind lock keeps an in-flight find_asset
            // from constructing its own instance for the same digest.
            let lock = self.sessions.bind_lock(&digest);
            let guard = lock.lock().await;
            self.sessions.insert(digest, asset);
            drop(guard);
            drop(lock);
            self.sessions.release_bind_lock(&digest);
        }
        if let Err(e) = self.assets.update_links(&ids, asset.folder()).await {
            error!(asset = %asset.folder().display(), "failed updating id links: {e}");
        }
    }
}

impl Manageable for Store {
    fn describe(&self, target: &mut Info) {
        target.put(format_args!(
            "{}: {}MB",
            self.base_dir.display(),
            self.assets.stored_bytes() / (1024 * 1024)
        ));
    }

    fn inspect(&self, target: &mut InfoList) {
        target.append("path", self.base_dir.display());
        target.append("size", self.assets.stored_bytes());
    }
}

/// Relative path from `base` (a directory) to `target`; both absolute.
fn relative_to(base: &Path, target: &Path) -> PathBuf {
    let base_parts: Vec<Component> = base.components().collect();
    let target_parts: Vec<Component> = target.components().collect();
    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part);
    }
    rel
}
