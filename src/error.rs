//! # Error Types
//!
//! This module defines the error type used throughout the library.
//! All operations return [`Result<T, BackupError>`](BackupError).
//!
//! Errors fall into two scopes:
//! - **bag-level** ([`BackupError::MalformedKeyBag`], [`BackupError::WrongPassphrase`],
//!   [`BackupError::Locked`]) abort a whole run;
//! - **file-level** (everything else) fail one file and leave the rest of a batch running.

use thiserror::Error;

/// The error type for all backup decryption operations.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The key bag blob could not be parsed (truncated TLV, bad TYPE/UUID, missing attribute).
    ///
    /// Fatal for the whole run: no unlock is possible.
    #[error("malformed key bag: {0}")]
    MalformedKeyBag(String),

    /// Every passcode-wrapped class key failed its integrity check.
    ///
    /// The caller may prompt again; the library never retries on its own.
    #[error("wrong passphrase: {failed} class key(s) failed to unwrap")]
    WrongPassphrase {
        /// Number of passcode-wrapped classes that failed.
        failed: usize,
    },

    /// A decrypt operation was requested before a successful unlock.
    #[error("key bag is locked")]
    Locked,

    /// A file references a protection class with no unlocked key.
    #[error("no unlocked key for protection class {0}")]
    MissingProtectionClass(u32),

    /// The per-file keyed-archive blob could not be resolved.
    #[error("malformed file record: {0}")]
    MalformedFileRecord(String),

    /// An AES key unwrap failed its RFC 3394 integrity check.
    #[error("key unwrap integrity check failed")]
    IntegrityCheck,

    /// Cryptographic precondition or KDF failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// `Manifest.plist` is missing, unreadable, or lacks a required key.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Manifest database lookup failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A batch task did not report back before the batch deadline.
    #[error("timed out waiting for file task")]
    Timeout,

    /// Source unreadable or destination unwritable.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
