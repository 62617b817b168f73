//! src/keybag/hashes.rs
//! Offline-cracking hash lines: read-only projection of a locked bag
//!
//! One line per passcode-wrapped class:
//! `$itunes_backup$*10*<WPKY hex>*<ITER>*<SALT hex>*<DPIC>*<DPSL hex>`

use crate::consts::{
    ATTR_DPIC, ATTR_DPSL, ATTR_ITER, ATTR_SALT, HASH_FORMAT_VERSION, HASH_SCHEME,
};
use crate::error::BackupError;
use crate::keybag::types::KeyBag;
use crate::utils::be_u32;
use std::collections::BTreeSet;

/// Format one hash line (no trailing newline).
#[must_use]
pub fn format_hash_line(
    wrapped_key: &[u8],
    iterations: u32,
    salt: &[u8],
    passcode_iterations: u32,
    passcode_salt: &[u8],
) -> String {
    format!(
        "${HASH_SCHEME}$*{HASH_FORMAT_VERSION}*{}*{iterations}*{}*{passcode_iterations}*{}",
        hex::encode(wrapped_key),
        hex::encode(salt),
        hex::encode(passcode_salt),
    )
}

/// Hash-cracking material for every passcode-wrapped class of `bag`.
///
/// Needs no passcode and never mutates the bag. The four KDF attributes must be
/// present; a bag without passcode-wrapped classes yields an empty set.
pub fn collect_password_hashes(bag: &KeyBag) -> Result<BTreeSet<String>, BackupError> {
    let passcode_salt = bag.required_attribute(ATTR_DPSL)?;
    let passcode_iterations = be_u32(bag.required_attribute(ATTR_DPIC)?, "DPIC")?;
    let salt = bag.required_attribute(ATTR_SALT)?;
    let iterations = be_u32(bag.required_attribute(ATTR_ITER)?, "ITER")?;

    Ok(bag
        .passcode_wrapped()
        .filter_map(|record| record.wrapped_key.as_deref())
        .map(|wpky| format_hash_line(wpky, iterations, salt, passcode_iterations, passcode_salt))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_layout() {
        let line = format_hash_line(&[0xAB; 2], 10_000, &[0x01, 0x02], 10_000_000, &[0xFF]);
        assert_eq!(line, "$itunes_backup$*10*abab*10000*0102*10000000*ff");
    }

    #[test]
    fn missing_attributes_are_reported() {
        let err = collect_password_hashes(&KeyBag::default()).unwrap_err();
        assert_eq!(err.to_string(), "malformed key bag: missing attribute DPSL");
    }
}
