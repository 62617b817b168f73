//! src/decryptor/file_key.rs
//! Per-file key unwrap under a class key

use crate::aliases::Aes256Key32;
use crate::consts::WRAPPED_FILE_KEY_LENGTH;
use crate::crypto::keywrap::unwrap_key32;
use crate::error::BackupError;

/// Unwrap a file's 40-byte wrapped key with the content key of its protection class.
///
/// A wrapped key of any other length is [`BackupError::Crypto`]; a wrong class key
/// is [`BackupError::IntegrityCheck`].
pub fn unwrap_file_key(class_key: &Aes256Key32, wrapped: &[u8]) -> Result<Aes256Key32, BackupError> {
    if wrapped.len() != WRAPPED_FILE_KEY_LENGTH {
        return Err(BackupError::Crypto(format!(
            "wrapped file key must be {WRAPPED_FILE_KEY_LENGTH} bytes, got {}",
            wrapped.len()
        )));
    }
    unwrap_key32(class_key.expose_secret(), wrapped)
}
