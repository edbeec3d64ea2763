//! # Memtable
//!
//! A concurrent, sorted, in-memory write buffer for the DriftKV storage
//! engine.
//!
//! The memtable is the first point of contact for every write. It absorbs
//! recent `PUT` and `DELETE` operations in a lock-free ordered map
//! (`crossbeam_skiplist::SkipMap`) until the engine flushes it to an
//! immutable on-disk SSTable.
//!
//! ## Key properties
//! - **Sorted order**: entries iterate in ascending key order (required for
//!   SSTable flush and range scans).
//! - **Concurrent**: all operations take `&self`; readers never block
//!   writers and writers of different keys proceed in parallel.
//! - **Tombstone support**: deletes are recorded as [`ValueEntry::Tombstone`]
//!   markers, distinct from an empty-but-present value.
//! - **Approximate size tracking**: a monotonic byte counter of keys +
//!   values drives the flush watermark.
//!
//! ## Example
//! ```rust
//! use memtable::Memtable;
//!
//! let m = Memtable::new();
//! m.put(b"hello".to_vec(), b"world".to_vec());
//! assert_eq!(m.get(b"hello"), Some(b"world".to_vec()));
//!
//! m.delete(b"hello".to_vec());
//! assert!(m.get(b"hello").is_none());
//! ```

use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;

/// Default flush watermark: 64 MiB of key + value bytes.
pub const DEFAULT_WATERMARK_BYTES: usize = 64 * 1024 * 1024;

/// A single entry in the memtable: either a live value or a delete marker.
///
/// A zero-length live value and a tombstone are different things. Storing
/// `Live(vec![])` keeps the key readable with an empty payload; `Tombstone`
/// shadows any older value for the key in lower storage tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueEntry {
    /// The key holds these value bytes.
    Live(Vec<u8>),
    /// The key has been deleted.
    Tombstone,
}

impl ValueEntry {
    /// Returns `true` for delete markers.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, ValueEntry::Tombstone)
    }

    /// Returns the value bytes for live entries, `None` for tombstones.
    pub fn as_live(&self) -> Option<&[u8]> {
        match self {
            ValueEntry::Live(v) => Some(v),
            ValueEntry::Tombstone => None,
        }
    }

    /// Consumes the entry, returning the value bytes for live entries.
    pub fn into_live(self) -> Option<Vec<u8>> {
        match self {
            ValueEntry::Live(v) => Some(v),
            ValueEntry::Tombstone => None,
        }
    }
}

/// An ordered, concurrent, in-memory write buffer.
///
/// Backed by a skip list, so point operations and ordered iteration are safe
/// from any number of threads without an outer lock. Writers of the same key
/// are totally ordered by the map's atomic insert; the engine's write lock
/// orders them with respect to the WAL.
///
/// The byte counter only ever grows while the memtable is live: overwrites
/// do not subtract the replaced entry's size. The watermark is a soft
/// threshold that biases flush timing, not a strict limit, so the drift is
/// harmless. [`clear`](Memtable::clear) resets the counter to zero.
pub struct Memtable {
    map: SkipMap<Vec<u8>, ValueEntry>,
    approx_size: AtomicUsize,
    watermark: usize,
}

impl Memtable {
    /// Creates an empty memtable with the default watermark.
    pub fn new() -> Self {
        Self::with_watermark(DEFAULT_WATERMARK_BYTES)
    }

    /// Creates an empty memtable that reports over-full at `watermark` bytes.
    pub fn with_watermark(watermark: usize) -> Self {
        Self {
            map: SkipMap::new(),
            approx_size: AtomicUsize::new(0),
            watermark,
        }
    }

    /// Inserts or overwrites a live value for `key`.
    ///
    /// Adds `key.len() + value.len()` to the byte counter unconditionally;
    /// an overwrite therefore counts twice. The counter approximates.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.approx_size
            .fetch_add(key.len() + value.len(), Ordering::Relaxed);
        self.map.insert(key, ValueEntry::Live(value));
    }

    /// Records a tombstone for `key`, shadowing any older value.
    ///
    /// A tombstone carries no value, so only the key bytes are counted.
    pub fn delete(&self, key: Vec<u8>) {
        self.approx_size.fetch_add(key.len(), Ordering::Relaxed);
        self.map.insert(key, ValueEntry::Tombstone);
    }

    /// Returns the value for `key` if it is present and live.
    ///
    /// Tombstoned and missing keys both return `None`; use
    /// [`entry`](Memtable::entry) to tell them apart.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map
            .get(key)
            .and_then(|e| e.value().as_live().map(<[u8]>::to_vec))
    }

    /// Returns the raw [`ValueEntry`] for `key`, tombstones included.
    ///
    /// The engine uses this to distinguish "not in the memtable" (fall
    /// through to the SSTables) from "deleted here" (stop, return absent).
    pub fn entry(&self, key: &[u8]) -> Option<ValueEntry> {
        self.map.get(key).map(|e| e.value().clone())
    }

    /// Returns `true` if `key` has any entry, live or tombstone.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Returns live `(key, value)` pairs with `start <= key <= end`, in
    /// ascending key order. Tombstones are skipped.
    pub fn range(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        if start > end {
            return Vec::new();
        }
        self.map
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
            .filter_map(|e| e.value().as_live().map(|v| (e.key().clone(), v.to_vec())))
            .collect()
    }

    /// Returns all entries with `start <= key <= end` including tombstones,
    /// in ascending key order.
    ///
    /// The engine's range merge needs the tombstones so that a delete here
    /// shadows older SSTable data.
    pub fn range_entries(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, ValueEntry)> {
        if start > end {
            return Vec::new();
        }
        self.map
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Returns every entry in ascending key order, tombstones included.
    ///
    /// This is the flush input: the SSTable writer consumes exactly this
    /// sequence.
    pub fn sorted_entries(&self) -> Vec<(Vec<u8>, ValueEntry)> {
        self.map
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Returns the number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the memtable holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the approximate byte size of all keys and values inserted
    /// since the last clear. Never decreases between clears.
    pub fn approx_size(&self) -> usize {
        self.approx_size.load(Ordering::Relaxed)
    }

    /// Returns the configured watermark in bytes.
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Returns `true` once the byte counter has reached the watermark.
    pub fn is_over_full(&self) -> bool {
        self.approx_size() >= self.watermark
    }

    /// Removes all entries and zeroes the byte counter.
    ///
    /// Called by the engine after a successful flush, once the new SSTable
    /// is reachable to readers.
    pub fn clear(&self) {
        for entry in self.map.iter() {
            entry.remove();
        }
        self.approx_size.store(0, Ordering::Relaxed);
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}
