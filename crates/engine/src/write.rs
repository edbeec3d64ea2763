//! Write path: `put`, `delete`, `batch_put`, `force_flush`, and the
//! internal flush.
//!
//! All mutations take the engine's write mutex, append to the WAL (fsynced
//! before anything else observes the write), then apply to the memtable.
//! When the memtable crosses its watermark the same locked section flushes
//! it to a new SSTable.

use anyhow::Result;
use sstable::{SSTable, SSTableWriter};
use std::sync::Arc;
use wal::WalRecord;

use crate::{sstable_file_name, Engine, WriteState, MAX_KEY_SIZE, MAX_VALUE_SIZE};

impl Engine {
    /// Inserts or overwrites a key-value pair. Returns once the mutation is
    /// durable in the WAL.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let mut state = self.write_state.lock();
        self.put_locked(&mut state, key, value)
    }

    /// Deletes a key by writing a tombstone. Deleting an absent key is
    /// valid and still writes the tombstone. Returns once durable.
    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        check_key(&key)?;

        let mut state = self.write_state.lock();
        state.wal.append(&WalRecord::Delete { key: key.clone() })?;
        self.mem.delete(key);
        self.maybe_flush(&mut state)
    }

    /// Applies each pair as an individual put, in iteration order, under a
    /// single lock acquisition. An empty batch is an acknowledged no-op.
    pub fn batch_put<I>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let mut state = self.write_state.lock();
        for (key, value) in items {
            self.put_locked(&mut state, key, value)?;
        }
        Ok(())
    }

    /// Flushes the memtable to a new SSTable regardless of the watermark.
    /// A no-op when the memtable is empty.
    pub fn force_flush(&self) -> Result<()> {
        let mut state = self.write_state.lock();
        if self.mem.is_empty() {
            return Ok(());
        }
        self.flush(&mut state)
    }

    fn put_locked(&self, state: &mut WriteState, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        check_key(&key)?;
        anyhow::ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );

        state.wal.append(&WalRecord::Put {
            key: key.clone(),
            value: value.clone(),
        })?;
        self.mem.put(key, value);
        self.maybe_flush(state)
    }

    fn maybe_flush(&self, state: &mut WriteState) -> Result<()> {
        if self.mem.is_over_full() {
            self.flush(state)?;
        }
        Ok(())
    }

    /// Moves the memtable's contents into a new SSTable.
    ///
    /// # Steps
    ///
    /// 1. Name the table from the sequence counter: `{:010}.db`.
    /// 2. Write the sorted entries (tombstones included) via the scratch +
    ///    fsync + rename protocol.
    /// 3. Open the published file, rebuilding its filter and index.
    /// 4. Insert it at the front of the SSTable list.
    /// 5. Clear the memtable, then truncate the WAL.
    ///
    /// The new table is reachable to readers before the memtable is
    /// cleared, so every key is served by at least one layer throughout.
    /// On failure the memtable and WAL are left untouched and the sequence
    /// counter does not advance; the next over-full write retries.
    fn flush(&self, state: &mut WriteState) -> Result<()> {
        let sequence = state.next_sequence;
        let file_name = sstable_file_name(sequence);
        let path = self.config.root_dir.join(&file_name);

        let entries = self.mem.sorted_entries();
        let entry_count = entries.len();

        SSTableWriter::write_entries(&path, entries)?;
        let table = Arc::new(SSTable::open(&path)?);

        self.sstables.write().insert(0, table);
        state.next_sequence = sequence + 1;

        self.mem.clear();
        state.wal.clear()?;

        tracing::info!(file = %file_name, entries = entry_count, "flushed memtable");
        Ok(())
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    anyhow::ensure!(!key.is_empty(), "key must not be empty");
    anyhow::ensure!(
        key.len() <= MAX_KEY_SIZE,
        "key too large: {} bytes (max {})",
        key.len(),
        MAX_KEY_SIZE
    );
    Ok(())
}
