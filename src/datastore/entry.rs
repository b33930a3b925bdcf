//! Entry codec: self-delimited binary frames.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! [total_len: u32][key_len: u32][key bytes][value_len: u32][value bytes]
//! ```
//!
//! `total_len` covers the whole frame: `12 + key_len + value_len`. The
//! length prefix lets a reader bound its own region, so a read never strays
//! into a neighboring frame.

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use super::error::{Result, StoreError};

/// Three u32 length fields per frame.
const FRAME_OVERHEAD: u64 = 12;

/// Predicts the encoded length of a frame without allocating.
pub fn frame_size(key: &str, value: &str) -> u64 {
    FRAME_OVERHEAD + key.len() as u64 + value.len() as u64
}

/// Encodes one key/value pair as a frame.
pub fn encode(key: &str, value: &str) -> Vec<u8> {
    let total = frame_size(key, value);
    let mut buf = Vec::with_capacity(total as usize);
    buf.extend_from_slice(&(total as u32).to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
    buf
}

/// Decodes one complete frame back into its key and value.
pub fn decode(buf: &[u8]) -> Result<(String, String)> {
    let mut reader = buf;
    let total = reader.read_u32::<LittleEndian>()? as u64;
    let key_len = reader.read_u32::<LittleEndian>()? as u64;
    if total != buf.len() as u64 || total < FRAME_OVERHEAD || FRAME_OVERHEAD + key_len > total {
        return Err(StoreError::Corrupt);
    }
    let mut key = vec![0u8; key_len as usize];
    reader.read_exact(&mut key)?;
    let value_len = reader.read_u32::<LittleEndian>()? as u64;
    if FRAME_OVERHEAD + key_len + value_len != total {
        return Err(StoreError::Corrupt);
    }
    let mut value = vec![0u8; value_len as usize];
    reader.read_exact(&mut value)?;
    Ok((into_utf8(key)?, into_utf8(value)?))
}

/// Streaming read of one frame's value: skips the header and key, returns
/// the raw stored value. Fails with an `UnexpectedEof` I/O error if the
/// stream ends mid-frame.
pub fn read_value<R: Read>(reader: &mut R) -> Result<String> {
    let total = reader.read_u32::<LittleEndian>()? as u64;
    let key_len = reader.read_u32::<LittleEndian>()? as u64;
    if total < FRAME_OVERHEAD || FRAME_OVERHEAD + key_len > total {
        return Err(StoreError::Corrupt);
    }
    skip(reader, key_len)?;
    let value_len = reader.read_u32::<LittleEndian>()? as u64;
    if FRAME_OVERHEAD + key_len + value_len != total {
        return Err(StoreError::Corrupt);
    }
    let mut value = vec![0u8; value_len as usize];
    reader.read_exact(&mut value)?;
    into_utf8(value)
}

/// One step of a front-to-back scan: reads a frame, returning its key and
/// framed length. `Ok(None)` means the stream holds no further complete
/// frame, either a clean end or a partial trailing frame; the caller
/// detects the latter by comparing consumed bytes against the file length.
pub(crate) fn scan_frame<R: Read>(reader: &mut R) -> Result<Option<(String, u64)>> {
    let total = match reader.read_u32::<LittleEndian>() {
        Ok(total) => total as u64,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let key_len = match reader.read_u32::<LittleEndian>() {
        Ok(key_len) => key_len as u64,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if total < FRAME_OVERHEAD || FRAME_OVERHEAD + key_len > total {
        return Err(StoreError::Corrupt);
    }
    let mut key = vec![0u8; key_len as usize];
    match reader.read_exact(&mut key) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let value_len = match reader.read_u32::<LittleEndian>() {
        Ok(value_len) => value_len as u64,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if FRAME_OVERHEAD + key_len + value_len != total {
        return Err(StoreError::Corrupt);
    }
    match skip(reader, value_len) {
        Ok(()) => {}
        Err(StoreError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
            return Ok(None)
        }
        Err(err) => return Err(err),
    }
    Ok(Some((into_utf8(key)?, total)))
}

fn skip<R: Read>(reader: &mut R, count: u64) -> Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(count), &mut io::sink())?;
    if skipped != count {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(())
}

fn into_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| StoreError::Corrupt)
}
