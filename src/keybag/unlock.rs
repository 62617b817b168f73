//! src/keybag/unlock.rs
//! Class key unwrapping: consumes a locked bag, yields an immutable unlocked one

use crate::aliases::{Aes256Key32, PasscodeString};
use crate::crypto::kdf::derive_key_encryption_key;
use crate::crypto::keywrap::unwrap_key32;
use crate::decryptor::unwrap_file_key;
use crate::error::BackupError;
use crate::keybag::types::KeyBag;
use crate::record::FileEncryptionRecord;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A key bag whose passcode-wrapped class keys have been unwrapped.
///
/// Immutable once built: share it behind an `Arc` across decrypt workers.
#[derive(Debug)]
pub struct UnlockedKeyBag {
    bag: KeyBag,
    keys: BTreeMap<u32, Aes256Key32>,
    failed: Vec<u32>,
}

/// A rejected unlock. The locked bag is handed back so the caller can retry.
#[derive(Debug)]
pub struct UnlockRejected {
    pub bag: KeyBag,
    pub error: BackupError,
}

impl From<UnlockRejected> for BackupError {
    fn from(rejected: UnlockRejected) -> Self {
        rejected.error
    }
}

impl KeyBag {
    /// Unwrap every passcode-wrapped class key with `kek`.
    ///
    /// Classes that fail their integrity check stay locked and are listed in
    /// [`UnlockedKeyBag::failed_classes`]. If *every* passcode-wrapped class fails
    /// the passcode is wrong: no key is kept and the bag comes back in
    /// [`UnlockRejected`] with [`BackupError::WrongPassphrase`].
    /// Device-only classes are skipped; they are never recoverable from a backup.
    pub fn unlock(self, kek: &Aes256Key32) -> Result<UnlockedKeyBag, UnlockRejected> {
        let mut keys = BTreeMap::new();
        let mut failed = Vec::new();

        for record in self.passcode_wrapped() {
            let Some(wrapped) = record.wrapped_key.as_deref() else {
                continue;
            };
            match unwrap_key32(kek.expose_secret(), wrapped) {
                Ok(key) => {
                    keys.insert(record.class, key);
                }
                Err(err) => {
                    warn!(class = record.class, error = %err, "class key failed to unwrap");
                    failed.push(record.class);
                }
            }
        }

        if keys.is_empty() && !failed.is_empty() {
            return Err(UnlockRejected {
                error: BackupError::WrongPassphrase {
                    failed: failed.len(),
                },
                bag: self,
            });
        }

        info!(
            unlocked = keys.len(),
            failed = failed.len(),
            device_only = self.class_keys().filter(|r| r.is_device_only()).count(),
            "key bag unlocked"
        );
        Ok(UnlockedKeyBag {
            bag: self,
            keys,
            failed,
        })
    }

    /// Derive the key-encryption key from `passcode`, then [`unlock`](Self::unlock).
    pub fn unlock_with_passcode(
        self,
        passcode: &PasscodeString,
    ) -> Result<UnlockedKeyBag, UnlockRejected> {
        let kek = match self
            .kdf_params()
            .and_then(|params| derive_key_encryption_key(passcode, &params))
        {
            Ok(kek) => kek,
            Err(error) => return Err(UnlockRejected { bag: self, error }),
        };
        self.unlock(&kek)
    }
}

impl UnlockedKeyBag {
    /// The parsed bag this was unlocked from.
    #[must_use]
    pub const fn keybag(&self) -> &KeyBag {
        &self.bag
    }

    /// Content key of `class`, or [`BackupError::MissingProtectionClass`].
    pub fn class_key(&self, class: u32) -> Result<&Aes256Key32, BackupError> {
        self.keys
            .get(&class)
            .ok_or(BackupError::MissingProtectionClass(class))
    }

    pub fn unlocked_classes(&self) -> impl Iterator<Item = u32> + '_ {
        self.keys.keys().copied()
    }

    /// Passcode-wrapped classes whose integrity check failed.
    #[must_use]
    pub fn failed_classes(&self) -> &[u32] {
        &self.failed
    }

    /// Unwrap the per-file key of `record` under its class key.
    pub fn file_key(&self, record: &FileEncryptionRecord) -> Result<Aes256Key32, BackupError> {
        let class_key = self.class_key(record.protection_class)?;
        unwrap_file_key(class_key, record.wrapped_key.expose_secret())
    }
}
