// src/lib.rs

pub mod aliases;
pub mod backup;
#[cfg(feature = "batch-ops")]
pub mod batch_ops;
pub mod builders;
pub mod consts;
pub mod crypto;
pub mod decryptor;
pub mod encryptor;
pub mod error;
pub mod fs;
pub mod keybag;
pub mod record;
pub mod session;
pub mod utils;

// High-level API
pub use error::BackupError;
pub use session::{FileDecryptor, Session, SessionState};

pub use keybag::{collect_password_hashes, parse_keybag, KeyBag, UnlockedKeyBag};
pub use record::FileEncryptionRecord;

// Primitives for custom flows and fixture authoring
pub use crypto::kdf::derive_key_encryption_key;
pub use crypto::keywrap::{unwrap_key32, wrap_key32};
pub use decryptor::{decrypt_stream, unwrap_file_key};
pub use encryptor::encrypt_stream;

pub use backup::{BackupPath, BackupSource, LocalBackup, Manifest};
pub use builders::{BatchConfig, BatchConfigBuilder};

#[cfg(feature = "batch-ops")]
pub use batch_ops::{decrypt_batch, BatchReport, FileJob, FileOutcome};
