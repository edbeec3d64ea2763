//! # WAL
//!
//! Append-only write-ahead log for the DriftKV storage engine.
//!
//! Every mutation is appended here and forced to disk before it touches the
//! memtable, so an acknowledged write survives a crash at any point. On
//! startup the engine replays the log to rebuild the memtable, then the log
//! is truncated once a flush has made the data durable in an SSTable.
//!
//! ## Record format
//!
//! All integers are big-endian. Each record is:
//!
//! ```text
//! total_size (i32) | checksum (u64) | key_len (i32) | key | value_len (i32) | value
//! ```
//!
//! `total_size` counts the whole record including itself and the checksum,
//! so the payload is `total_size - 12` bytes. `value_len == -1` marks a
//! tombstone, which carries no value bytes. The checksum covers the payload
//! (everything after the checksum field); it is the CRC-32 of the payload
//! widened to the 8-byte field.
//!
//! A record that fails the checksum, or a truncated tail, marks the crash
//! point: replay keeps everything before it and discards the rest. Such a
//! record was never acknowledged, so dropping it loses nothing.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Bytes occupied by the `total_size` and `checksum` fields.
pub const HEADER_BYTES: usize = 4 + 8;

/// `value_len` sentinel marking a delete record.
const TOMBSTONE_LEN: i32 = -1;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl WalRecord {
    /// The key this record mutates.
    pub fn key(&self) -> &[u8] {
        match self {
            WalRecord::Put { key, .. } | WalRecord::Delete { key } => key,
        }
    }
}

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// The active log handle: appends records durably and truncates after flush.
///
/// Appends are not internally synchronized; the engine serializes them under
/// its write lock, which also fixes the commit order.
pub struct Wal {
    file: File,
    path: PathBuf,
}

impl Wal {
    /// Opens the log at `path`, creating it if absent. Existing records are
    /// preserved; new records are appended after them.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Appends one record and forces it to durable media.
    ///
    /// The record is assembled in memory and written with a single
    /// `write_all`, then `sync_all` pushes both data and metadata down
    /// before the append is acknowledged.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        let payload = encode_payload(record)?;
        let total = HEADER_BYTES + payload.len();

        let mut buf = Vec::with_capacity(total);
        buf.write_i32::<BigEndian>(total as i32)?;
        buf.write_u64::<BigEndian>(checksum(&payload))?;
        buf.extend_from_slice(&payload);

        self.file.write_all(&buf)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Truncates the log to zero length and forces the truncation down.
    /// Called only after a flush has succeeded.
    pub fn clear(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replays an existing log from the start. Opened read-only at startup,
/// separate from the append handle.
pub struct WalReader {
    rdr: BufReader<File>,
}

impl WalReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let f = File::open(path)?;
        Ok(Self {
            rdr: BufReader::new(f),
        })
    }

    /// Applies every intact record in order and returns how many there were.
    ///
    /// Replay stops silently at the first record that is truncated, fails
    /// its checksum, or does not parse: that is the crash point, and
    /// everything before it is the acknowledged history. Only real I/O
    /// errors (not end-of-file) surface as `Err`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<usize, WalError>
    where
        F: FnMut(WalRecord),
    {
        let mut count = 0usize;
        loop {
            let total = match self.rdr.read_i32::<BigEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(count),
                Err(e) => return Err(WalError::Io(e)),
            };
            let stored = match self.rdr.read_u64::<BigEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(count),
                Err(e) => return Err(WalError::Io(e)),
            };

            // Smallest legal record: header + key_len + one key byte + value_len.
            if total < (HEADER_BYTES as i32) + 9 {
                return Ok(count);
            }

            let mut payload = vec![0u8; total as usize - HEADER_BYTES];
            if let Err(e) = self.rdr.read_exact(&mut payload) {
                return if e.kind() == io::ErrorKind::UnexpectedEof {
                    Ok(count)
                } else {
                    Err(WalError::Io(e))
                };
            }

            if checksum(&payload) != stored {
                return Ok(count);
            }
            let Some(record) = decode_payload(&payload) else {
                return Ok(count);
            };

            apply(record);
            count += 1;
        }
    }
}

fn encode_payload(record: &WalRecord) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    match record {
        WalRecord::Put { key, value } => {
            payload.write_i32::<BigEndian>(key.len() as i32)?;
            payload.extend_from_slice(key);
            payload.write_i32::<BigEndian>(value.len() as i32)?;
            payload.extend_from_slice(value);
        }
        WalRecord::Delete { key } => {
            payload.write_i32::<BigEndian>(key.len() as i32)?;
            payload.extend_from_slice(key);
            payload.write_i32::<BigEndian>(TOMBSTONE_LEN)?;
        }
    }
    Ok(payload)
}

/// Parses a checksum-verified payload. `None` means the payload is
/// structurally damaged and replay must stop.
fn decode_payload(payload: &[u8]) -> Option<WalRecord> {
    let mut rd = payload;

    let key_len = rd.read_i32::<BigEndian>().ok()?;
    if key_len <= 0 || rd.len() < key_len as usize {
        return None;
    }
    let mut key = vec![0u8; key_len as usize];
    rd.read_exact(&mut key).ok()?;

    let value_len = rd.read_i32::<BigEndian>().ok()?;
    match value_len {
        TOMBSTONE_LEN => {
            if !rd.is_empty() {
                return None;
            }
            Some(WalRecord::Delete { key })
        }
        n if n >= 0 => {
            if rd.len() != n as usize {
                return None;
            }
            let mut value = vec![0u8; n as usize];
            rd.read_exact(&mut value).ok()?;
            Some(WalRecord::Put { key, value })
        }
        _ => None,
    }
}

fn checksum(payload: &[u8]) -> u64 {
    let mut hasher = Crc32::new();
    hasher.update(payload);
    u64::from(hasher.finalize())
}
