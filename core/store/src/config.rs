use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration of one source store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name the store reports in management output.
    pub label: String,
    /// Base directory holding the raw files to expose.
    pub root: PathBuf,
}
