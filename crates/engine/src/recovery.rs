//! Startup recovery: scratch-file sweep, SSTable loading, WAL replay.
//!
//! The crash matrix is simple because publication is a rename and the WAL
//! is cleared last:
//!
//! - crash before rename: only a scratch file exists; it is swept here and
//!   the WAL still holds every acknowledged write.
//! - crash after rename, before WAL clear: the SSTable and the WAL hold the
//!   same data; replay re-inserts it into the memtable, which harmlessly
//!   shadows the identical entries in the newest table.

use anyhow::{Context, Result};
use memtable::Memtable;
use sstable::SSTable;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wal::{WalReader, WalRecord};

/// Suffix of flush scratch files, e.g. `0000000003.db.tmp`.
const SCRATCH_SUFFIX: &str = ".db.tmp";

/// Best-effort removal of scratch files left by a crash mid-flush. Their
/// contents were never published; the WAL still has the data.
pub(crate) fn sweep_scratch_files(root: &Path) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.ends_with(SCRATCH_SUFFIX) {
            tracing::warn!(file = name, "removing stale flush scratch file");
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

/// Opens every `*.db` file in `root`, newest first, and returns the list
/// together with the next unused sequence number.
///
/// A `.db` file that fails to open is corrupt, and that is fatal: better to
/// refuse startup than to silently serve a store with a hole in it.
pub(crate) fn load_sstables(root: &Path) -> Result<(Vec<Arc<SSTable>>, u64)> {
    let mut numbered: Vec<(u64, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "db") {
            continue;
        }
        match parse_sequence(&path) {
            Some(sequence) => numbered.push((sequence, path)),
            None => {
                tracing::warn!(file = %path.display(), "ignoring non-sequence .db file");
            }
        }
    }

    // Largest sequence first: the newest table is searched first.
    numbered.sort_by(|a, b| b.0.cmp(&a.0));
    let next_sequence = numbered.first().map_or(0, |(sequence, _)| sequence + 1);

    let mut tables = Vec::with_capacity(numbered.len());
    for (_, path) in &numbered {
        let table =
            SSTable::open(path).with_context(|| format!("load sstable {}", path.display()))?;
        tables.push(Arc::new(table));
    }
    Ok((tables, next_sequence))
}

/// `0000000042.db` → `42`.
fn parse_sequence(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// Replays the WAL at `path` into `mem`. A missing file means a clean
/// shutdown after a flush; nothing to do. Returns the record count.
pub(crate) fn replay_wal(path: &Path, mem: &Memtable) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let mut reader = WalReader::open(path)?;
    let count = reader.replay(|record| match record {
        WalRecord::Put { key, value } => mem.put(key, value),
        WalRecord::Delete { key } => mem.delete(key),
    })?;
    Ok(count)
}
