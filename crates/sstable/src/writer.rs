use anyhow::{Context, Result};
use memtable::ValueEntry;
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::format::write_entry;

/// Writes a sorted run of entries to disk as an immutable SSTable file.
///
/// The writer is stateless; all work happens inside
/// [`write_entries`](SSTableWriter::write_entries). The write is crash-safe:
/// entries land in a scratch file next to the target, the scratch is fsynced,
/// and an atomic rename publishes it. A crash before the rename leaves only
/// the scratch file, which startup sweeps away.
pub struct SSTableWriter {}

impl SSTableWriter {
    /// Writes `entries` to a new SSTable at `path`.
    ///
    /// The input must already be strictly ascending by key with no
    /// duplicates; the memtable's sorted snapshot satisfies this. Tombstones
    /// are written out like any other entry so they keep shadowing older
    /// runs.
    ///
    /// # Errors
    ///
    /// Any I/O failure while writing, syncing, or renaming. On error the
    /// target path is untouched; at worst a scratch file is left behind.
    pub fn write_entries<P, I>(path: P, entries: I) -> Result<()>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = (Vec<u8>, ValueEntry)>,
    {
        let path = path.as_ref();
        let tmp_path = scratch_path(path);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("create scratch file {}", tmp_path.display()))?;
        let mut w = BufWriter::new(file);

        for (key, entry) in entries {
            write_entry(&mut w, &key, entry.as_live())?;
        }

        w.flush()?;
        w.into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()
            .with_context(|| format!("sync {}", tmp_path.display()))?;

        rename(&tmp_path, path)
            .with_context(|| format!("publish {}", path.display()))?;
        Ok(())
    }
}

/// `<file>.tmp` next to the target, e.g. `0000000003.db.tmp`.
fn scratch_path(path: &Path) -> std::path::PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    os.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_entries() -> Vec<(Vec<u8>, ValueEntry)> {
        vec![
            (b"a".to_vec(), ValueEntry::Live(b"apple".to_vec())),
            (b"b".to_vec(), ValueEntry::Live(b"banana".to_vec())),
            (b"c".to_vec(), ValueEntry::Live(Vec::new())), // present but empty
            (b"d".to_vec(), ValueEntry::Tombstone),
        ]
    }

    #[test]
    fn writes_and_publishes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");

        SSTableWriter::write_entries(&path, sample_entries()).unwrap();

        let meta = fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
        // Scratch file must be gone after the rename.
        assert!(!path.with_extension("db.tmp").exists());
    }

    #[test]
    fn scratch_name_appends_tmp_suffix() {
        let p = Path::new("/data/0000000007.db");
        assert_eq!(scratch_path(p), Path::new("/data/0000000007.db.tmp"));
    }

    #[test]
    fn encodes_exact_expected_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");

        SSTableWriter::write_entries(
            &path,
            vec![(b"k".to_vec(), ValueEntry::Live(b"v".to_vec()))],
        )
        .unwrap();

        let bytes = fs::read(&path).unwrap();
        // key_len=1, 'k', value_len=1, 'v', big-endian lengths.
        assert_eq!(bytes, vec![0, 0, 0, 1, b'k', 0, 0, 0, 1, b'v']);
    }

    #[test]
    fn tombstone_entry_has_no_value_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");

        SSTableWriter::write_entries(&path, vec![(b"k".to_vec(), ValueEntry::Tombstone)])
            .unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 1, b'k', 0xFF, 0xFF, 0xFF, 0xFF] // value_len = -1
        );
    }

    #[test]
    fn empty_input_produces_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0000000000.db");

        SSTableWriter::write_entries(&path, Vec::new()).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }
}
