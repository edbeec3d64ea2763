//! Engine configuration with defaults matching a small local deployment.

use std::path::{Path, PathBuf};

/// Default root directory for WAL and SSTable files.
pub const DEFAULT_ROOT_DIR: &str = "./data";

/// Default memtable watermark: 64 MiB.
pub const DEFAULT_MEM_TABLE_MAX_BYTES: usize = 67_108_864;

/// Runtime configuration for one [`crate::Engine`] instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `current.wal` and the `*.db` SSTables.
    pub root_dir: PathBuf,

    /// Memtable byte watermark that triggers a flush.
    pub mem_table_max_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            mem_table_max_bytes: DEFAULT_MEM_TABLE_MAX_BYTES,
        }
    }
}

impl Config {
    /// Returns the root directory replaced with `path`.
    pub fn with_root_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.root_dir = path.as_ref().to_path_buf();
        self
    }

    /// Returns the memtable watermark replaced with `bytes`.
    pub fn with_mem_table_max_bytes(mut self, bytes: usize) -> Self {
        self.mem_table_max_bytes = bytes;
        self
    }
}
