//! # Engine: the DriftKV storage engine
//!
//! The central orchestrator that ties the [`memtable`], [`wal`], and
//! [`sstable`] crates into a persistent, ordered key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────┐
//! │                  ENGINE                      │
//! │                                              │
//! │ write.rs → WAL append (fsync) → Memtable     │
//! │              |                               │
//! │              |  (watermark crossed?)         │
//! │              v          yes                  │
//! │           flush() → new SSTable, WAL reset   │
//! │                                              │
//! │ read.rs → Memtable → SSTables newest-first   │
//! │            (first layer with the key wins)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module       | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | `lib.rs`     | `Engine` struct, constructors, accessors, `Debug`|
//! | `recovery`   | startup: scratch sweep, SSTable load, WAL replay |
//! | `write`      | `put`, `delete`, `batch_put`, `force_flush`      |
//! | `read`       | `read`, `read_range`                             |
//!
//! ## Concurrency
//!
//! All public operations take `&self`, so an `Engine` shared behind an
//! `Arc` serves many threads at once. Mutations are serialized by one
//! internal mutex that owns the WAL handle, which makes the WAL append
//! order the commit order. Readers touch only the lock-free memtable and a
//! cloned snapshot of the SSTable list, so they never wait on writers.
//!
//! ## Crash safety
//!
//! Every mutation is fsynced into the WAL before the memtable sees it. The
//! WAL is truncated only after a flush has published its SSTable. SSTables
//! are written to a scratch file, fsynced, and atomically renamed into
//! place; stale scratch files are swept on startup.

mod config;
mod read;
mod recovery;
mod write;

pub use config::Config;

use anyhow::Result;
use memtable::Memtable;
use parking_lot::{Mutex, RwLock};
use sstable::SSTable;
use std::path::Path;
use std::sync::Arc;
use wal::Wal;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// Name of the single active write-ahead log inside the root directory.
pub const WAL_FILE_NAME: &str = "current.wal";

/// The central storage engine orchestrating Memtable, WAL, and SSTables.
///
/// # Write path
///
/// 1. Append the mutation to the WAL and fsync (durability point).
/// 2. Apply it to the memtable.
/// 3. If the memtable has crossed its watermark, flush it to a new
///    SSTable, publish the table, clear the memtable, truncate the WAL.
///
/// # Read path
///
/// 1. Check the memtable (freshest data, tombstones included).
/// 2. Check SSTables newest to oldest; the first table holding the key
///    decides, so newer tombstones shadow older values.
///
/// # Recovery
///
/// On [`Engine::open`] stale scratch files are removed, every `*.db` file
/// is opened newest-first (rebuilding its filter and index), and the WAL is
/// replayed into a fresh memtable.
pub struct Engine {
    config: Config,
    mem: Memtable,
    /// Live SSTables, newest first. Readers clone the `Vec` under a brief
    /// read lock and iterate the snapshot without holding anything.
    sstables: RwLock<Vec<Arc<SSTable>>>,
    /// Serializes all mutations. Owns the WAL handle, so the append order
    /// equals the commit order, and the sequence counter for the next
    /// SSTable file.
    write_state: Mutex<WriteState>,
}

pub(crate) struct WriteState {
    pub(crate) wal: Wal,
    pub(crate) next_sequence: u64,
}

impl Engine {
    /// Opens or creates an engine rooted at `config.root_dir`, performing
    /// full recovery.
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.root_dir)?;

        recovery::sweep_scratch_files(&config.root_dir);

        let (tables, next_sequence) = recovery::load_sstables(&config.root_dir)?;

        // Replay before opening the append handle so the read pass sees a
        // quiescent file.
        let mem = Memtable::with_watermark(config.mem_table_max_bytes);
        let wal_path = config.root_dir.join(WAL_FILE_NAME);
        let replayed = recovery::replay_wal(&wal_path, &mem)?;
        let wal = Wal::open(&wal_path)?;

        tracing::info!(
            root = %config.root_dir.display(),
            sstables = tables.len(),
            wal_records = replayed,
            "engine opened"
        );

        Ok(Self {
            config,
            mem,
            sstables: RwLock::new(tables),
            write_state: Mutex::new(WriteState { wal, next_sequence }),
        })
    }

    /// Opens an engine with default configuration rooted at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(Config::default().with_root_dir(path))
    }

    /// The configuration this engine was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory holding the WAL and SSTable files.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.config.root_dir
    }

    /// Approximate bytes buffered in the memtable.
    #[must_use]
    pub fn memtable_size(&self) -> usize {
        self.mem.approx_size()
    }

    /// Entries currently buffered in the memtable, tombstones included.
    #[must_use]
    pub fn memtable_entry_count(&self) -> usize {
        self.mem.len()
    }

    /// Number of live SSTables.
    #[must_use]
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("root_dir", &self.config.root_dir)
            .field("mem_table_max_bytes", &self.config.mem_table_max_bytes)
            .field("memtable_size", &self.mem.approx_size())
            .field("memtable_entries", &self.mem.len())
            .field("sstable_count", &self.sstable_count())
            .finish()
    }
}

/// `42` → `0000000042.db`. The zero-padded decimal keeps lexicographic and
/// numeric order aligned.
pub(crate) fn sstable_file_name(sequence: u64) -> String {
    format!("{:010}.db", sequence)
}
