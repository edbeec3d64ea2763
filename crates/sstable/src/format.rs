//! Binary entry codec shared by the SSTable writer and reader.
//!
//! Every entry is laid out as:
//!
//! ```text
//! [key_len: i32 BE, > 0][key bytes][value_len: i32 BE][value bytes]
//! ```
//!
//! `value_len == -1` means tombstone (no value bytes follow). A clean
//! end-of-file at an entry boundary is a normal stop; end-of-file anywhere
//! inside an entry is corruption and surfaces as an error.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Every `SPARSE_INDEX_INTERVAL`-th entry (0-based) lands in the sparse
/// index, so entry 0 is always indexed.
pub const SPARSE_INDEX_INTERVAL: usize = 100;

/// `value_len` sentinel marking a tombstone entry.
pub(crate) const TOMBSTONE_LEN: i32 = -1;

/// Encodes one entry onto `w`. `None` writes a tombstone.
pub(crate) fn write_entry<W: Write>(
    w: &mut W,
    key: &[u8],
    value: Option<&[u8]>,
) -> io::Result<()> {
    w.write_i32::<BigEndian>(key.len() as i32)?;
    w.write_all(key)?;
    match value {
        Some(v) => {
            w.write_i32::<BigEndian>(v.len() as i32)?;
            w.write_all(v)?;
        }
        None => w.write_i32::<BigEndian>(TOMBSTONE_LEN)?,
    }
    Ok(())
}

/// Decodes the entry at the reader's current position.
///
/// Returns `Ok(None)` on a clean end-of-file before any byte of the entry.
/// Any other incomplete read, or a nonsensical length field, is an error.
pub(crate) fn read_entry<R: Read>(r: &mut R) -> io::Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
    let key_len = match r.read_i32::<BigEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if key_len <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid key length: {}", key_len),
        ));
    }

    let mut key = vec![0u8; key_len as usize];
    r.read_exact(&mut key)?;

    let value_len = r.read_i32::<BigEndian>()?;
    let value = match value_len {
        TOMBSTONE_LEN => None,
        n if n >= 0 => {
            let mut value = vec![0u8; n as usize];
            r.read_exact(&mut value)?;
            Some(value)
        }
        n => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid value length: {}", n),
            ))
        }
    };

    Ok(Some((key, value)))
}

/// Bytes the entry occupies on disk.
pub(crate) fn encoded_len(key: &[u8], value: Option<&[u8]>) -> u64 {
    (4 + key.len() + 4 + value.map_or(0, <[u8]>::len)) as u64
}
