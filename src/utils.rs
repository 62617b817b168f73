// ============================================================================
// FILE: src/utils.rs
// ============================================================================

//! Utility functions used across the library.

use crate::error::BackupError;
use std::io::{self, Read};

/// Interprets a key bag value as a big-endian `u32`.
///
/// The value must be exactly four bytes; `what` names the field in the error.
#[inline]
pub fn be_u32(value: &[u8], what: &str) -> Result<u32, BackupError> {
    let bytes: [u8; 4] = value.try_into().map_err(|_| {
        BackupError::MalformedKeyBag(format!(
            "{what} must be 4 bytes, got {}",
            value.len()
        ))
    })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Renders a 4-byte tag for logs and error messages, escaping non-ASCII bytes.
pub fn tag_display(tag: &[u8; 4]) -> String {
    tag.escape_ascii().to_string()
}

/// XORs two 16-byte blocks and writes the result to `output`.
///
/// # Panics (by contract)
///
/// Panics if any slice is shorter than 16 bytes. All callers pass AES blocks.
#[inline(always)]
pub const fn xor_blocks(block_a: &[u8], block_b: &[u8], output: &mut [u8]) {
    let mut i = 0;
    while i < 16 {
        output[i] = block_a[i] ^ block_b[i];
        i += 1;
    }
}

/// Fills `buf` from `reader`, stopping early only at EOF.
///
/// Returns the number of bytes read; anything below `buf.len()` means EOF.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
