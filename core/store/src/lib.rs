//! Content-addressed asset storage.
//!
//! This crate implements the storage half of a bithorde daemon: local files
//! exposed as assets identified by their Tiger Tree Hash root, with reads
//! gated on hash validity and all tree metadata kept in persistent,
//! memory-mapped per-asset files so hashing survives restarts.
//!
//! The on-disk layout under a configured base directory looks like this:
//!
//! ```txt
//! /BASE/                          # raw user files live anywhere below here
//!     ./.bh_meta/
//!         ./assets/
//!             ./[token]/data      # relative symlink to the raw file
//!             ./[token]/meta      # flat array of 32-byte tree nodes
//!         ./tiger/
//!             ./[BASE32(root)]    # relative symlink to ../assets/[token]
//! ```
//!
//! `assets/` is an anonymous pool; lookup goes through the per-hash-family
//! index directories, of which `tiger/` is authoritative. A symlink is only
//! planted once the asset's root node is set, and readers re-verify the root
//! when resolving, so a stale link is never served.

pub mod asset;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod management;
pub mod meta;
pub mod raf;
pub mod sessions;
pub mod source;
pub mod store;

pub use asset::{Asset, Status, StoredAsset, MAX_CHUNK, PARALLEL_HASH_JOBS};
pub use config::Config;
pub use dispatch::{DispatchError, Dispatcher, THREADPOOL_CONCURRENCY};
pub use error::{HashError, IngestError, OpenError, ReadError, WriteError};
pub use ids::{find_tiger_id, BindRead, BindWrite, BitHordeIds, HashType, Identifier};
pub use management::{Info, InfoList, Manageable};
pub use meta::MetaStore;
pub use raf::{Mode, RandomAccessFile};
pub use source::Store;
pub use store::AssetStore;
