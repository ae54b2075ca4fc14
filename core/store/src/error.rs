use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("error accessing backing file. {0}")]
    Io(#[from] std::io::Error),
    #[error("{path} exists with mismatching size ({requested} : {actual})")]
    SizeMismatch {
        path: PathBuf,
        requested: u64,
        actual: u64,
    },
    #[error("error mapping metadata file. {0}")]
    Map(fmmap::error::Error),
    #[error("metadata file cannot hold the hash tree. {0}")]
    MetaTooSmall(#[from] tigertree::StorageTooSmall),
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("read beyond the end of the asset")]
    OutOfRange,
    #[error("error reading from disk. {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write beyond the end of the asset")]
    OutOfRange,
    #[error("error writing to disk. {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one block-hashing job.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("error reading block for hashing. {0}")]
    Read(#[from] ReadError),
    #[error("hash pool unavailable. {0}")]
    Pool(#[from] crate::dispatch::DispatchError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{path} is not inside the store base directory")]
    OutsideBase { path: PathBuf },
    #[error("failed setting up the asset folder. {0}")]
    Setup(#[from] OpenError),
    #[error("error preparing the asset folder. {0}")]
    Io(#[from] std::io::Error),
}
