//! The asset-folder pool and the id-to-folder link index.
//!
//! Asset folders live in a flat pool under `assets/`, named by random tokens
//! so concurrent ingests and restarts never collide. Lookup goes through
//! per-hash-family directories of relative symlinks; replacing a link is a
//! symlink-then-rename so concurrent readers always see a complete entry.

use std::io;
use std::path::{Path, PathBuf};

use data_encoding::HEXLOWER;
use tokio::fs;

use crate::ids::{BitHordeIds, HashType, Identifier};

pub const META_DIR: &str = ".bh_meta";
const ASSETS_DIR: &str = "assets";

pub struct AssetStore {
    root: PathBuf,
    assets: PathBuf,
}

impl AssetStore {
    /// `meta_root` is the `.bh_meta` directory this store manages.
    pub fn new(meta_root: impl Into<PathBuf>) -> Self {
        let root = meta_root.into();
        let assets = root.join(ASSETS_DIR);
        Self { root, assets }
    }

    pub async fn open_or_create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.assets).await?;
        fs::create_dir_all(self.family_dir(HashType::TreeTiger)).await?;
        Ok(())
    }

    pub fn family_dir(&self, family: HashType) -> PathBuf {
        self.root.join(family.dir_name())
    }

    /// Allocate a fresh folder in the pool. `create_dir` is the atomicity
    /// point; a token collision simply retries.
    pub async fn new_asset_dir(&self) -> io::Result<PathBuf> {
        loop {
            let token: [u8; 16] = rand::random();
            let path = self.assets.join(HEXLOWER.encode(&token));
            match fs::create_dir(&path).await {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Recursively delete an asset folder, e.g. to undo a failed ingest.
    pub async fn remove_asset(&self, folder: &Path) -> io::Result<()> {
        fs::remove_dir_all(folder).await
    }

    /// Point every identifier's index entry at `folder`, atomically
    /// replacing whatever was there.
    pub async fn update_links(&self, ids: &BitHordeIds, folder: &Path) -> io::Result<()> {
        let name = folder
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "asset folder has no name"))?;
        let target = Path::new("..").join(ASSETS_DIR).join(name);

        for id in ids {
            let dir = self.family_dir(id.hash_type);
            fs::create_dir_all(&dir).await?;
            let link = dir.join(id.base32());
            // Unique staging name: concurrent replacements of the same link
            // must never collide before the rename.
            let token: [u8; 8] = rand::random();
            let staging = dir.join(format!(".{}.{}", id.base32(), HEXLOWER.encode(&token)));
            fs::symlink(&target, &staging).await?;
            fs::rename(&staging, &link).await?;
        }
        Ok(())
    }

    /// Dereference the first identifier with an index entry, tiger first.
    pub async fn resolve_ids(&self, ids: &BitHordeIds) -> Option<PathBuf> {
        let (tiger, other): (Vec<&Identifier>, Vec<&Identifier>) = ids
            .iter()
            .partition(|id| id.hash_type == HashType::TreeTiger);
        for id in tiger.into_iter().chain(other) {
            let link = self.family_dir(id.hash_type).join(id.base32());
            if let Ok(folder) = fs::canonicalize(&link).await {
                return Some(folder);
            }
        }
        None
    }

    /// Bytes of pool content (data and metadata), for management output.
    pub fn stored_bytes(&self) -> u64 {
        let Ok(pool) = std::fs::read_dir(&self.assets) else {
            return 0;
        };
        let mut total = 0;
        for entry in pool.flatten() {
            for name in ["data", "meta"] {
                if let Ok(meta) = std::fs::metadata(entry.path().join(name)) {
                    total += meta.len();
                }
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Identifier;

    fn store(dir: &Path) -> AssetStore {
        AssetStore::new(dir.join(META_DIR))
    }

    #[tokio::test]
    async fn pool_dirs_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.open_or_create().await.unwrap();

        let a = store.new_asset_dir().await.unwrap();
        let b = store.new_asset_dir().await.unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
    }

    #[tokio::test]
    async fn links_resolve_and_die_with_their_asset() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.open_or_create().await.unwrap();

        let folder = store.new_asset_dir().await.unwrap();
        let ids = vec![Identifier::tree_tiger([0x5C; 24])];
        store.update_links(&ids, &folder).await.unwrap();

        let resolved = store.resolve_ids(&ids).await.unwrap();
        assert_eq!(resolved, fs::canonicalize(&folder).await.unwrap());

        store.remove_asset(&folder).await.unwrap();
        assert_eq!(store.resolve_ids(&ids).await, None);
    }

    #[tokio::test]
    async fn links_replace_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.open_or_create().await.unwrap();

        let first = store.new_asset_dir().await.unwrap();
        let second = store.new_asset_dir().await.unwrap();
        let ids = vec![Identifier::tree_tiger([1; 24])];

        store.update_links(&ids, &first).await.unwrap();
        store.update_links(&ids, &second).await.unwrap();
        let resolved = store.resolve_ids(&ids).await.unwrap();
        assert_eq!(resolved, fs::canonicalize(&second).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_link_updates_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.open_or_create().await.unwrap();

        let first = store.new_asset_dir().await.unwrap();
        let second = store.new_asset_dir().await.unwrap();
        let ids = vec![Identifier::tree_tiger([3; 24])];

        let (a, b) = tokio::join!(
            store.update_links(&ids, &first),
            store.update_links(&ids, &second)
        );
        a.unwrap();
        b.unwrap();

        // Whoever renamed last won; either way the link is intact.
        let resolved = store.resolve_ids(&ids).await.unwrap();
        let first = fs::canonicalize(&first).await.unwrap();
        let second = fs::canonicalize(&second).await.unwrap();
        assert!(resolved == first || resolved == second);
    }

    #[tokio::test]
    async fn unknown_ids_resolve_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.open_or_create().await.unwrap();
        let ids = vec![Identifier::tree_tiger([9; 24])];
        assert_eq!(store.resolve_ids(&ids).await, None);
    }
}
