use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::filter::BloomFilter;
use crate::format::{encoded_len, read_entry, SPARSE_INDEX_INTERVAL};
use crate::index::SparseIndex;

/// Outcome of a point lookup against one SSTable.
///
/// `found` says whether this table holds an entry for the key at all;
/// `value` is `None` either because the table has no entry (`found ==
/// false`) or because the entry is a tombstone (`found == true`). The
/// engine stops at the first table with `found == true`, so a tombstone
/// here shadows live values in older tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub found: bool,
    pub value: Option<Vec<u8>>,
}

impl SearchResult {
    fn hit(value: Option<Vec<u8>>) -> Self {
        Self { found: true, value }
    }

    fn miss() -> Self {
        Self {
            found: false,
            value: None,
        }
    }
}

/// Read handle for one immutable SSTable file.
///
/// [`open`](SSTable::open) scans the file once to rebuild the bloom filter
/// and sparse index; after that, lookups and range scans seek straight to a
/// nearby offset. The data file is not kept open between operations; each
/// call opens its own handle, seeks, and reads, so any number of readers
/// proceed concurrently without coordination.
pub struct SSTable {
    path: PathBuf,
    index: SparseIndex,
    filter: BloomFilter,
}

impl SSTable {
    /// Opens an SSTable file, rebuilding its filter and index with one
    /// sequential scan.
    ///
    /// An empty file yields an empty table. A file that ends inside an
    /// entry, or whose length fields are nonsense, is corrupt; that is
    /// fatal for this table and surfaces as an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::open(&path).with_context(|| format!("open sstable {}", path.display()))?;
        let file_len = file.metadata()?.len();
        let mut rdr = BufReader::new(file);

        let mut filter = BloomFilter::default();
        let mut index = SparseIndex::new();
        let mut offset = 0u64;
        let mut position = 0usize;

        while offset < file_len {
            let (key, value) = match read_entry(&mut rdr) {
                Ok(Some(entry)) => entry,
                Ok(None) => bail!("sstable {} ends mid-entry", path.display()),
                Err(e) => bail!("corrupt sstable {}: {}", path.display(), e),
            };
            filter.insert(&key);
            if position % SPARSE_INDEX_INTERVAL == 0 {
                index.insert(key.clone(), offset);
            }
            offset += encoded_len(&key, value.as_deref());
            position += 1;
        }

        Ok(Self {
            path,
            index,
            filter,
        })
    }

    /// Point lookup for `key`.
    ///
    /// The filter rejects most absent keys without touching the disk. For
    /// the rest, the scan starts at the greatest indexed key at or below
    /// the target and walks forward; the file's ascending order bounds the
    /// walk to one index interval.
    ///
    /// # Errors
    ///
    /// I/O failures while reading the file.
    pub fn lookup(&self, key: &[u8]) -> Result<SearchResult> {
        if !self.filter.may_contain(key) {
            return Ok(SearchResult::miss());
        }
        let Some(offset) = self.index.floor(key) else {
            return Ok(SearchResult::miss());
        };

        let file =
            File::open(&self.path).with_context(|| format!("open {}", self.path.display()))?;
        let mut rdr = BufReader::new(file);
        rdr.seek(SeekFrom::Start(offset))?;

        while let Some((entry_key, value)) = read_entry(&mut rdr)? {
            if entry_key == key {
                return Ok(SearchResult::hit(value));
            }
            if entry_key.as_slice() > key {
                break; // sorted order: the key cannot appear later
            }
        }
        Ok(SearchResult::miss())
    }

    /// Returns all entries with `start <= key <= end`, tombstones included,
    /// in ascending key order.
    ///
    /// Tombstones are passed through on purpose: the engine's merge layer
    /// needs them to shadow older tables, then filters them out of the
    /// final result.
    pub fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>> {
        // Start at the floor of the start bound; if the start precedes every
        // indexed key, begin at the smallest one. Entry 0 is always indexed,
        // so an empty index means an empty file.
        let offset = match self.index.floor(start).or_else(|| self.index.first_offset()) {
            Some(offset) => offset,
            None => return Ok(Vec::new()),
        };

        let file =
            File::open(&self.path).with_context(|| format!("open {}", self.path.display()))?;
        let mut rdr = BufReader::new(file);
        rdr.seek(SeekFrom::Start(offset))?;

        let mut out = Vec::new();
        while let Some((key, value)) = read_entry(&mut rdr)? {
            if key.as_slice() > end {
                break;
            }
            if key.as_slice() >= start {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    /// Number of keys in the sparse index (not the entry count).
    pub fn indexed_keys(&self) -> usize {
        self.index.len()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SSTableWriter;
    use memtable::ValueEntry;
    use std::fs;
    use tempfile::tempdir;

    fn sample_entries() -> Vec<(Vec<u8>, ValueEntry)> {
        vec![
            (b"a".to_vec(), ValueEntry::Live(b"apple".to_vec())),
            (b"b".to_vec(), ValueEntry::Live(b"banana".to_vec())),
            (b"c".to_vec(), ValueEntry::Live(Vec::new())),
            (b"d".to_vec(), ValueEntry::Tombstone),
        ]
    }

    fn numbered_entries(n: usize) -> Vec<(Vec<u8>, ValueEntry)> {
        (0..n)
            .map(|i| {
                (
                    format!("key-{:05}", i).into_bytes(),
                    ValueEntry::Live(format!("value-{}", i).into_bytes()),
                )
            })
            .collect()
    }

    // -------------------- Open & lookup --------------------

    #[test]
    fn open_and_lookup_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let table = SSTable::open(&path).unwrap();

        let a = table.lookup(b"a").unwrap();
        assert!(a.found);
        assert_eq!(a.value.as_deref(), Some(b"apple".as_slice()));

        // Present but empty value: found, with zero-length bytes.
        let c = table.lookup(b"c").unwrap();
        assert!(c.found);
        assert_eq!(c.value, Some(Vec::new()));

        // Tombstone: found, but no value.
        let d = table.lookup(b"d").unwrap();
        assert!(d.found);
        assert!(d.value.is_none());
    }

    #[test]
    fn lookup_missing_key_between_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let table = SSTable::open(&path).unwrap();
        let r = table.lookup(b"bb").unwrap();
        assert!(!r.found);
        assert!(r.value.is_none());
    }

    #[test]
    fn lookup_key_past_the_last_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let table = SSTable::open(&path).unwrap();
        assert!(!table.lookup(b"zzz").unwrap().found);
    }

    #[test]
    fn lookup_key_before_the_first_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let table = SSTable::open(&path).unwrap();
        assert!(!table.lookup(b"A").unwrap().found); // 'A' < 'a'
    }

    #[test]
    fn lookup_across_sparse_index_intervals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        let entries = numbered_entries(350);
        SSTableWriter::write_entries(&path, entries).unwrap();

        let table = SSTable::open(&path).unwrap();
        // 350 entries at interval 100: entries 0, 100, 200, 300 are indexed.
        assert_eq!(table.indexed_keys(), 4);

        // Keys far from any indexed entry still resolve via forward scan.
        for i in [0usize, 1, 99, 100, 101, 149, 250, 349] {
            let key = format!("key-{:05}", i);
            let r = table.lookup(key.as_bytes()).unwrap();
            assert!(r.found, "key {} not found", key);
            assert_eq!(r.value.unwrap(), format!("value-{}", i).into_bytes());
        }
    }

    // -------------------- Filter short-circuit --------------------

    #[test]
    fn filter_short_circuits_missing_keys_without_io() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, numbered_entries(10_000)).unwrap();

        let table = SSTable::open(&path).unwrap();

        // Remove the backing file: any lookup that reaches the disk now
        // fails, so a clean miss proves the filter rejected it up front.
        fs::remove_file(&path).unwrap();

        // A handful of absent keys; all but the rare false positive must be
        // rejected by the filter alone.
        let mut clean_misses = 0;
        for i in 0..20 {
            let key = format!("never-inserted-{}", i);
            if let Ok(r) = table.lookup(key.as_bytes()) {
                assert!(!r.found);
                clean_misses += 1;
            }
        }
        assert!(clean_misses >= 15, "only {} filter rejections", clean_misses);

        // A present key must try the disk and therefore error.
        assert!(table.lookup(b"key-00042").is_err());
    }

    #[test]
    fn no_false_negatives_across_rebuild() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, numbered_entries(10_000)).unwrap();

        let table = SSTable::open(&path).unwrap();
        for i in 0..10_000 {
            let key = format!("key-{:05}", i);
            assert!(table.lookup(key.as_bytes()).unwrap().found, "lost {}", key);
        }
    }

    // -------------------- Range scans --------------------

    #[test]
    fn range_returns_inclusive_slice_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let table = SSTable::open(&path).unwrap();
        let out = table.range(b"b", b"c").unwrap();
        assert_eq!(
            out,
            vec![
                (b"b".to_vec(), Some(b"banana".to_vec())),
                (b"c".to_vec(), Some(Vec::new())),
            ]
        );
    }

    #[test]
    fn range_includes_tombstones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let table = SSTable::open(&path).unwrap();
        let out = table.range(b"c", b"z").unwrap();
        assert_eq!(
            out,
            vec![(b"c".to_vec(), Some(Vec::new())), (b"d".to_vec(), None)]
        );
    }

    #[test]
    fn range_start_before_first_key_scans_from_front() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let table = SSTable::open(&path).unwrap();
        let out = table.range(b"A", b"b").unwrap();
        let keys: Vec<&[u8]> = out.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"b".as_slice()]);
    }

    #[test]
    fn range_outside_keyspace_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let table = SSTable::open(&path).unwrap();
        assert!(table.range(b"x", b"z").unwrap().is_empty());
        assert!(table.range(b"A", b"B").unwrap().is_empty());
    }

    #[test]
    fn range_across_sparse_index_intervals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, numbered_entries(300)).unwrap();

        let table = SSTable::open(&path).unwrap();
        let out = table.range(b"key-00095", b"key-00205").unwrap();
        assert_eq!(out.len(), 111);
        assert_eq!(out.first().unwrap().0, b"key-00095".to_vec());
        assert_eq!(out.last().unwrap().0, b"key-00205".to_vec());

        // Ascending, no duplicates.
        let keys: Vec<&Vec<u8>> = out.iter().map(|(k, _)| k).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    // -------------------- Corruption & empties --------------------

    #[test]
    fn open_truncated_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let len = fs::metadata(&path).unwrap().len();
        let f = fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(len - 3).unwrap();

        assert!(SSTable::open(&path).is_err());
    }

    #[test]
    fn open_garbage_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        // A negative key length right at the start.
        fs::write(&path, (-7i32).to_be_bytes()).unwrap();

        assert!(SSTable::open(&path).is_err());
    }

    #[test]
    fn open_nonexistent_file_fails() {
        assert!(SSTable::open("/no/such/dir/0000000000.db").is_err());
    }

    #[test]
    fn open_empty_file_is_an_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");
        fs::write(&path, b"").unwrap();

        let table = SSTable::open(&path).unwrap();
        assert!(!table.lookup(b"anything").unwrap().found);
        assert!(table.range(b"a", b"z").unwrap().is_empty());
    }

    // -------------------- Large values --------------------

    #[test]
    fn large_value_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");

        let big = vec![b'x'; 500_000];
        SSTableWriter::write_entries(
            &path,
            vec![(b"big".to_vec(), ValueEntry::Live(big.clone()))],
        )
        .unwrap();

        let table = SSTable::open(&path).unwrap();
        let r = table.lookup(b"big").unwrap();
        assert_eq!(r.value.unwrap().len(), 500_000);
    }
}
