//! src/backup/paths.rs
//! Well-known backup files: where each lives in the raw backup and what it is
//! called once decrypted

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A content category with a fixed location in every backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackupPath {
    Contacts,
    Messages,
    Voicemails,
    CallHistory,
    SafariHistory,
    Manifest,
}

impl BackupPath {
    pub const ALL: [BackupPath; 6] = [
        BackupPath::Contacts,
        BackupPath::Messages,
        BackupPath::Voicemails,
        BackupPath::CallHistory,
        BackupPath::SafariHistory,
        BackupPath::Manifest,
    ];

    /// Two-hex-character directory, or `None` for files at the backup root.
    #[must_use]
    pub const fn subdir(self) -> Option<&'static str> {
        match self {
            BackupPath::Contacts => Some("31"),
            BackupPath::Messages => Some("3d"),
            BackupPath::Voicemails => Some("99"),
            BackupPath::CallHistory => Some("5a"),
            BackupPath::SafariHistory => Some("1a"),
            BackupPath::Manifest => None,
        }
    }

    /// Content-addressed file id (or plain name for root files).
    #[must_use]
    pub const fn file_id(self) -> &'static str {
        match self {
            BackupPath::Contacts => "31bb7ba8914766d4ba40d6dfb6113c8b614be442",
            BackupPath::Messages => "3d0d7e5fb2ce288813306e4d4636395e047a3d28",
            BackupPath::Voicemails => "992df473bbb9e132f4b3b6e4d33f72171e97bc7a",
            BackupPath::CallHistory => "5a4935c78a5255723f707230a451d79c540d2741",
            BackupPath::SafariHistory => "1a0e7afc19d307da602ccdcece51af33afe92c53",
            BackupPath::Manifest => "Manifest.db",
        }
    }

    /// Friendly file name for the decrypted copy.
    #[must_use]
    pub const fn decrypted_name(self) -> &'static str {
        match self {
            BackupPath::Contacts => "contacts.db",
            BackupPath::Messages => "messages.db",
            BackupPath::Voicemails => "voicemails.db",
            BackupPath::CallHistory => "callhistory.db",
            BackupPath::SafariHistory => "safarihistory.db",
            BackupPath::Manifest => "Manifest.db",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            BackupPath::Contacts => "contacts",
            BackupPath::Messages => "messages",
            BackupPath::Voicemails => "voicemails",
            BackupPath::CallHistory => "calls",
            BackupPath::SafariHistory => "safari",
            BackupPath::Manifest => "manifest",
        }
    }

    #[must_use]
    pub fn encrypted_path(self, backup_root: &Path) -> PathBuf {
        match self.subdir() {
            Some(dir) => backup_root.join(dir).join(self.file_id()),
            None => backup_root.join(self.file_id()),
        }
    }

    #[must_use]
    pub fn decrypted_path(self, output_root: &Path) -> PathBuf {
        output_root.join(self.decrypted_name())
    }
}

impl fmt::Display for BackupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackupPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        BackupPath::ALL
            .into_iter()
            .find(|p| p.name() == lower || p.file_id().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = BackupPath::ALL.iter().map(|p| p.name()).collect();
                format!("unknown category '{s}' (expected one of: {})", names.join(", "))
            })
    }
}
