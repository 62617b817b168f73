//! src/backup/source.rs
//! Where decryption gets its inputs: metadata blobs and raw file bytes

use crate::backup::directory::source_path;
use crate::backup::manifest_db::ManifestDb;
use crate::error::BackupError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// The two lookups decryption needs from a backup.
///
/// Implementations shared by batch workers must be `Send + Sync`.
pub trait BackupSource {
    type Reader: Read;

    /// Serialized keyed-archive metadata of `file_id`.
    fn locate_file_blob(&self, file_id: &str) -> Result<Vec<u8>, BackupError>;

    /// Raw (encrypted or plain) bytes of `file_id`.
    fn read_source_bytes(&self, file_id: &str) -> Result<Self::Reader, BackupError>;
}

/// A backup directory on disk with its decrypted manifest database.
#[derive(Debug)]
pub struct LocalBackup {
    root: PathBuf,
    manifest: ManifestDb,
}

impl LocalBackup {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, manifest: ManifestDb) -> Self {
        Self {
            root: root.into(),
            manifest,
        }
    }

    /// Open `root` using the plaintext manifest database at `manifest_db`.
    pub fn open(root: impl Into<PathBuf>, manifest_db: &Path) -> Result<Self, BackupError> {
        Ok(Self::new(root, ManifestDb::open(manifest_db)?))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn manifest(&self) -> &ManifestDb {
        &self.manifest
    }
}

impl BackupSource for LocalBackup {
    type Reader = File;

    fn locate_file_blob(&self, file_id: &str) -> Result<Vec<u8>, BackupError> {
        self.manifest.file_blob(file_id)
    }

    fn read_source_bytes(&self, file_id: &str) -> Result<File, BackupError> {
        Ok(File::open(source_path(&self.root, file_id))?)
    }
}

impl<S: BackupSource + ?Sized> BackupSource for &S {
    type Reader = S::Reader;

    fn locate_file_blob(&self, file_id: &str) -> Result<Vec<u8>, BackupError> {
        (**self).locate_file_blob(file_id)
    }

    fn read_source_bytes(&self, file_id: &str) -> Result<Self::Reader, BackupError> {
        (**self).read_source_bytes(file_id)
    }
}
