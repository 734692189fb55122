use std::io::Read;

use buff::{AsBytes, Buff};

use crate::{
    engine::ColumnId,
    error::{DbResult, Error},
};

/// Reads at most `len` bytes from the start of `reader`. Shorter sources
/// yield fewer bytes, not an error.
pub fn read_prefix(reader: impl Read, len: usize) -> DbResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut raw)?;
    Ok(raw)
}

/// Decodes a fixed-width value from the raw bytes of a column.
///
/// The engine hands back exactly as many bytes as the column type occupies, so
/// anything else is reported as [`Error::InvalidCellSize`] instead of being
/// truncated or padded.
pub fn decode_fixed<const S: usize, T>(column: ColumnId, mut raw: Vec<u8>) -> DbResult<T>
where
    T: AsBytes<Repr = [u8; S]>,
{
    if raw.len() != S {
        return Err(Error::InvalidCellSize {
            column,
            expected: S,
            actual: raw.len(),
        });
    }
    let mut buf = Buff::new(&mut raw);
    Ok(buf.read())
}

/// Decodes UTF-16LE bytes, replacing invalid sequences. A trailing odd byte is
/// dropped.
pub fn decode_utf16le(mut raw: Vec<u8>) -> String {
    let mut buf = Buff::new(&mut raw);
    let units: Vec<u16> = std::iter::from_fn(|| buf.try_read::<2, u16>()).collect();
    String::from_utf16_lossy(&units)
}

/// Removes embedded NUL characters.
pub fn strip_nul(text: &str) -> String {
    text.replace('\0', "")
}
