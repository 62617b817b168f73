// src/backup/mod.rs

//! The backup directory around the decryption core: `Manifest.plist`, the
//! manifest database, the content-addressed file layout and well-known files.

pub mod directory;
pub mod manifest;
pub mod manifest_db;
pub mod paths;
pub mod source;

pub use directory::source_path;
pub use manifest::{DeviceInfo, Manifest};
pub use manifest_db::{FileEntry, ManifestDb};
pub use paths::BackupPath;
pub use source::{BackupSource, LocalBackup};
