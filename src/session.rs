//! # Decryption Session
//!
//! Drives one backup from its parsed key bag to decrypted files.
//!
//! ```text
//! KeyBagParsed ──unlock(ok)──▶ Unlocked ──decryptor()──▶ FileDecryptor (per file, any thread)
//!      │                          ▲
//!      └──unlock(wrong)──▶ LockedNoPasscode ──unlock(ok)──┘
//!
//! Plain (unencrypted backup) ──decryptor()──▶ FileDecryptor::Copy
//! ```
//!
//! Hash extraction works in every state that has a key bag. Decryption is only
//! reachable through a [`FileDecryptor`], which cannot be built from a locked bag.

use crate::aliases::PasscodeString;
use crate::backup::{BackupSource, LocalBackup, Manifest};
use crate::consts::MANIFEST_DB;
use crate::decryptor::decrypt_stream;
use crate::error::BackupError;
use crate::fs::{write_atomic, write_atomic_guarded};
use crate::keybag::{collect_password_hashes, parse_keybag, KeyBag, UnlockedKeyBag};
use crate::record::FileEncryptionRecord;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Observable state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Key bag parsed, no unlock attempted yet.
    KeyBagParsed,
    /// The last unlock attempt was rejected; only hash extraction is possible.
    LockedNoPasscode,
    Unlocked,
    /// Unencrypted backup: files are copied byte for byte.
    Plain,
}

enum Mode {
    Plain,
    Locked { bag: KeyBag, rejected: bool },
    Unlocked(Arc<UnlockedKeyBag>),
    /// Holds the slot while an unlock owns the bag. Never decryptable; a session
    /// left here by an interrupted unlock stays locked for good.
    Unlocking,
}

/// One backup's key material and decryption state.
pub struct Session {
    mode: Mode,
}

impl Session {
    /// Parse a raw key bag. A malformed bag is fatal for the whole run.
    pub fn from_keybag_bytes(bytes: &[u8]) -> Result<Self, BackupError> {
        Ok(Self::from_keybag(parse_keybag(bytes)?))
    }

    #[must_use]
    pub const fn from_keybag(bag: KeyBag) -> Self {
        Self {
            mode: Mode::Locked {
                bag,
                rejected: false,
            },
        }
    }

    /// Session for an unencrypted backup.
    #[must_use]
    pub const fn plain() -> Self {
        Self { mode: Mode::Plain }
    }

    /// Read `Manifest.plist` under `backup_root` and start the matching session.
    pub fn open_backup(backup_root: &Path) -> Result<(Self, Manifest), BackupError> {
        let manifest = Manifest::load(backup_root)?;
        let session = match manifest.keybag.as_deref() {
            Some(bag) if manifest.is_encrypted => Self::from_keybag_bytes(bag)?,
            _ => Self::plain(),
        };
        info!(
            root = %backup_root.display(),
            device = %manifest.device,
            format = manifest.version.as_deref().unwrap_or("?"),
            encrypted = manifest.is_encrypted,
            passcode_set = ?manifest.was_passcode_set,
            "opened backup"
        );
        Ok((session, manifest))
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        match &self.mode {
            Mode::Plain => SessionState::Plain,
            Mode::Locked { rejected: false, .. } => SessionState::KeyBagParsed,
            Mode::Locked { rejected: true, .. } | Mode::Unlocking => {
                SessionState::LockedNoPasscode
            }
            Mode::Unlocked(_) => SessionState::Unlocked,
        }
    }

    /// The parsed key bag, if this backup has one.
    #[must_use]
    pub fn keybag(&self) -> Option<&KeyBag> {
        match &self.mode {
            Mode::Plain | Mode::Unlocking => None,
            Mode::Locked { bag, .. } => Some(bag),
            Mode::Unlocked(unlocked) => Some(unlocked.keybag()),
        }
    }

    /// Passcode-wrapped classes that stayed locked although the unlock succeeded.
    ///
    /// Files of these classes fail with [`BackupError::MissingProtectionClass`].
    /// Empty before an unlock and for plain backups.
    #[must_use]
    pub fn failed_classes(&self) -> &[u32] {
        match &self.mode {
            Mode::Unlocked(unlocked) => unlocked.failed_classes(),
            _ => &[],
        }
    }

    /// Try `passcode` against the key bag.
    ///
    /// `Ok(false)` means the passcode was wrong; the session moves to
    /// [`SessionState::LockedNoPasscode`] and may be retried. Other errors (a bag
    /// missing its KDF attributes, a zero iteration count) leave the state as it was.
    /// Plain and already-unlocked sessions report `Ok(true)` without doing anything.
    pub fn unlock(&mut self, passcode: &PasscodeString) -> Result<bool, BackupError> {
        let (bag, rejected) = match std::mem::replace(&mut self.mode, Mode::Unlocking) {
            Mode::Locked { bag, rejected } => (bag, rejected),
            Mode::Unlocking => return Err(BackupError::Locked),
            other => {
                self.mode = other;
                return Ok(true);
            }
        };

        match bag.unlock_with_passcode(passcode) {
            Ok(unlocked) => {
                if !unlocked.failed_classes().is_empty() {
                    warn!(
                        classes = ?unlocked.failed_classes(),
                        "some class keys stayed locked"
                    );
                }
                self.mode = Mode::Unlocked(Arc::new(unlocked));
                Ok(true)
            }
            Err(rejection) => {
                let wrong = matches!(rejection.error, BackupError::WrongPassphrase { .. });
                self.mode = Mode::Locked {
                    bag: rejection.bag,
                    rejected: rejected || wrong,
                };
                if wrong {
                    warn!(error = %rejection.error, "unlock rejected");
                    Ok(false)
                } else {
                    Err(rejection.error)
                }
            }
        }
    }

    /// Hash-cracking lines for every passcode-wrapped class. Needs no unlock;
    /// a plain backup has none.
    pub fn extract_hashes(&self) -> Result<BTreeSet<String>, BackupError> {
        self.keybag()
            .map_or_else(|| Ok(BTreeSet::new()), collect_password_hashes)
    }

    /// A shareable handle for decrypting files, or [`BackupError::Locked`].
    pub fn decryptor(&self) -> Result<FileDecryptor, BackupError> {
        match &self.mode {
            Mode::Plain => Ok(FileDecryptor::Copy),
            Mode::Unlocked(unlocked) => Ok(FileDecryptor::Keys(Arc::clone(unlocked))),
            Mode::Locked { .. } | Mode::Unlocking => Err(BackupError::Locked),
        }
    }

    /// Decrypt `file_id` from `source` into memory.
    pub fn decrypt_one<S>(
        &self,
        source: &S,
        file_id: &str,
        declared_size: Option<u64>,
    ) -> Result<Vec<u8>, BackupError>
    where
        S: BackupSource + ?Sized,
    {
        let mut out = Vec::new();
        self.decryptor()?
            .decrypt_into(source, file_id, declared_size, &mut out)?;
        Ok(out)
    }
}

/// Decrypts individual files once the key bag is unlocked.
///
/// Cheap to clone; every batch worker holds its own copy of the same keys.
#[derive(Debug, Clone)]
pub enum FileDecryptor {
    /// Unencrypted backup: bytes are copied unchanged and the declared size is ignored.
    Copy,
    Keys(Arc<UnlockedKeyBag>),
}

impl FileDecryptor {
    /// Decrypt `reader` under the key of `record` into `writer`.
    pub fn decrypt_record<R, W>(
        &self,
        record: &FileEncryptionRecord,
        reader: R,
        writer: W,
        declared_size: Option<u64>,
    ) -> Result<u64, BackupError>
    where
        R: Read,
        W: Write,
    {
        match self {
            FileDecryptor::Copy => copy_plain(reader, writer),
            FileDecryptor::Keys(keys) => {
                let file_key = keys.file_key(record)?;
                decrypt_stream(reader, writer, &file_key, declared_size)
            }
        }
    }

    /// Resolve, unwrap and decrypt `file_id` from `source` into `writer`.
    pub fn decrypt_into<S, W>(
        &self,
        source: &S,
        file_id: &str,
        declared_size: Option<u64>,
        writer: W,
    ) -> Result<u64, BackupError>
    where
        S: BackupSource + ?Sized,
        W: Write,
    {
        match self {
            FileDecryptor::Copy => copy_plain(source.read_source_bytes(file_id)?, writer),
            FileDecryptor::Keys(keys) => {
                let record = FileEncryptionRecord::resolve(&source.locate_file_blob(file_id)?)?;
                let file_key = keys.file_key(&record)?;
                debug!(file_id, class = record.protection_class, "decrypting file");
                decrypt_stream(
                    source.read_source_bytes(file_id)?,
                    writer,
                    &file_key,
                    declared_size,
                )
            }
        }
    }

    /// Decrypt `file_id` to `destination`, which is only replaced on success.
    pub fn decrypt_to_file<S>(
        &self,
        source: &S,
        file_id: &str,
        declared_size: Option<u64>,
        destination: &Path,
    ) -> Result<u64, BackupError>
    where
        S: BackupSource + ?Sized,
    {
        self.decrypt_to_file_guarded(source, file_id, declared_size, destination, || Ok(()))
    }

    /// [`decrypt_to_file`](Self::decrypt_to_file), replacing `destination` only
    /// if `guard` still allows it once the plaintext is complete.
    pub fn decrypt_to_file_guarded<S, G>(
        &self,
        source: &S,
        file_id: &str,
        declared_size: Option<u64>,
        destination: &Path,
        guard: G,
    ) -> Result<u64, BackupError>
    where
        S: BackupSource + ?Sized,
        G: FnOnce() -> Result<(), BackupError>,
    {
        write_atomic_guarded(destination, guard, |file| {
            let mut writer = BufWriter::new(file);
            let written = self.decrypt_into(source, file_id, declared_size, &mut writer)?;
            writer.flush()?;
            Ok(written)
        })
    }

    /// Write the plaintext `Manifest.db` of the backup at `backup_root` to `destination`.
    ///
    /// Encrypted backups decrypt it with the `ManifestKey` from `Manifest.plist`,
    /// emitting every decrypted byte.
    pub fn decrypt_manifest_db(
        &self,
        manifest: &Manifest,
        backup_root: &Path,
        destination: &Path,
    ) -> Result<u64, BackupError> {
        let record = match self {
            FileDecryptor::Copy => None,
            FileDecryptor::Keys(_) => {
                let key = manifest.manifest_key.as_deref().ok_or_else(|| {
                    BackupError::Manifest("encrypted backup has no ManifestKey".into())
                })?;
                Some(FileEncryptionRecord::from_manifest_key(key)?)
            }
        };
        let source = File::open(backup_root.join(MANIFEST_DB))?;

        write_atomic(destination, |file| {
            let mut writer = BufWriter::new(file);
            let written = match &record {
                Some(record) => self.decrypt_record(record, source, &mut writer, None)?,
                None => copy_plain(source, &mut writer)?,
            };
            writer.flush()?;
            Ok(written)
        })
    }

    /// Decrypt the manifest database into `workdir` and open the backup on it.
    pub fn open_local_backup(
        &self,
        manifest: &Manifest,
        backup_root: &Path,
        workdir: &Path,
    ) -> Result<LocalBackup, BackupError> {
        let db_path = workdir.join(MANIFEST_DB);
        self.decrypt_manifest_db(manifest, backup_root, &db_path)?;
        LocalBackup::open(backup_root, &db_path)
    }
}

fn copy_plain<R: Read, W: Write>(mut reader: R, mut writer: W) -> Result<u64, BackupError> {
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(copied)
}
