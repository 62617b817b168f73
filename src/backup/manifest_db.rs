//! src/backup/manifest_db.rs
//! Read-only access to a decrypted `Manifest.db`

use crate::error::BackupError;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// One row of the `Files` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub file_id: String,
    pub domain: String,
    pub relative_path: String,
    pub flags: i64,
}

/// The backup's file catalogue.
///
/// The connection sits behind a mutex so one instance can serve every batch
/// worker; lookups are short single-row queries.
#[derive(Debug)]
pub struct ManifestDb {
    conn: Mutex<Connection>,
}

impl ManifestDb {
    /// Open a plaintext manifest database without write access.
    pub fn open(path: &Path) -> Result<Self, BackupError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn))
    }

    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, BackupError> {
        self.conn
            .lock()
            .map_err(|_| BackupError::Manifest("manifest database lock poisoned".into()))
    }

    /// Serialized keyed-archive blob of `file_id`.
    ///
    /// A missing row, or a row without a blob, is [`BackupError::MalformedFileRecord`].
    pub fn file_blob(&self, file_id: &str) -> Result<Vec<u8>, BackupError> {
        let conn = self.lock_conn()?;
        let blob: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT file FROM Files WHERE fileID = ?1",
                [file_id],
                |row| row.get(0),
            )
            .optional()?;
        match blob {
            Some(Some(blob)) => Ok(blob),
            Some(None) => Err(BackupError::MalformedFileRecord(format!(
                "{file_id} has no metadata blob"
            ))),
            None => Err(BackupError::MalformedFileRecord(format!(
                "{file_id} is not in the manifest"
            ))),
        }
    }

    /// Entries of `domain` whose relative path contains `path_fragment`.
    pub fn find_files(
        &self,
        domain: &str,
        path_fragment: &str,
    ) -> Result<Vec<FileEntry>, BackupError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT fileID, domain, relativePath, flags FROM Files
             WHERE domain = ?1 AND instr(relativePath, ?2) > 0
             ORDER BY relativePath",
        )?;
        let rows = stmt.query_map([domain, path_fragment], |row| {
            Ok(FileEntry {
                file_id: row.get(0)?,
                domain: row.get(1)?,
                relative_path: row.get(2)?,
                flags: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
