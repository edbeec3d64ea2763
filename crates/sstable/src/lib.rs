//! # SSTable: Sorted String Table
//!
//! Immutable, on-disk storage runs for the DriftKV storage engine.
//!
//! When the memtable crosses its watermark the engine flushes it to disk as
//! an SSTable. SSTables are **write-once, read-many**: once the atomic
//! rename publishes a file it is never modified again.
//!
//! ## File layout
//!
//! The file is nothing but entries, back to back, strictly ascending by key.
//! No header, no footer. All integers are big-endian.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ key_len (i32) | key | value_len (i32) | value        │
//! │ ... repeated for each entry ...                      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! `value_len == -1` marks a tombstone, which carries no value bytes.
//!
//! Because the file is self-describing, [`SSTable::open`] rebuilds the two
//! in-memory companions with a single sequential scan:
//!
//! - a [`BloomFilter`] holding every key, so point lookups for absent keys
//!   skip the disk entirely;
//! - a [`SparseIndex`] holding every 100th key and its byte offset, so a
//!   lookup seeks near its target and scans forward a bounded distance.

mod filter;
mod format;
mod index;
mod reader;
mod writer;

pub use filter::{BloomFilter, DEFAULT_FILTER_BITS, DEFAULT_FILTER_HASHES};
pub use format::SPARSE_INDEX_INTERVAL;
pub use index::SparseIndex;
pub use reader::{SSTable, SearchResult};
pub use writer::SSTableWriter;
