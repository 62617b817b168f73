//! # Constants
//!
//! Format constants for the key bag, the per-file keyed archive and the
//! backup directory, plus runtime defaults for batch decryption.

use std::time::Duration;

/// Length of the key bag's own UUID and of every class-key UUID.
pub const UUID_LENGTH: usize = 16;

/// Tags that belong to the class-key record currently being built.
///
/// `WRAP` is listed here but its *first* occurrence (before any class UUID)
/// sets the bag's global wrap flags instead.
pub const CLASS_KEY_TAGS: [&[u8; 4]; 5] = [b"CLAS", b"WRAP", b"WPKY", b"KTYP", b"PBKY"];

/// Class key wrapped by the device UID only; never recoverable from a backup.
pub const WRAP_DEVICE: u32 = 1;

/// Class key wrapped by the passcode-derived key-encryption key.
pub const WRAP_PASSCODE: u32 = 2;

/// Stage-1 (PBKDF2-HMAC-SHA256) salt attribute.
pub const ATTR_DPSL: &[u8; 4] = b"DPSL";
/// Stage-1 iteration count attribute.
pub const ATTR_DPIC: &[u8; 4] = b"DPIC";
/// Stage-2 (PBKDF2-HMAC-SHA1) salt attribute.
pub const ATTR_SALT: &[u8; 4] = b"SALT";
/// Stage-2 iteration count attribute.
pub const ATTR_ITER: &[u8; 4] = b"ITER";

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Output length of both KDF stages (256-bit key).
pub const KDF_OUTPUT_LENGTH: usize = 32;

/// RFC 3394 default initial value.
pub const KEY_WRAP_ICV: u64 = 0xA6A6_A6A6_A6A6_A6A6;

/// Bytes added to a key by RFC 3394 wrapping.
pub const KEY_WRAP_OVERHEAD: usize = 8;

/// A wrapped per-file key: 32-byte AES key plus 8-byte integrity block.
///
/// This is a format constant, not inferred from the archive.
pub const WRAPPED_FILE_KEY_LENGTH: usize = 40;

/// Bytes skipped at the start of `NS.data` before the wrapped file key.
pub const NS_DATA_KEY_OFFSET: usize = 4;

/// Bytes of little-endian protection class that prefix `ManifestKey`.
pub const MANIFEST_KEY_CLASS_LENGTH: usize = 4;

/// Hash-cracking scheme tag emitted by [`crate::keybag::collect_password_hashes`].
pub const HASH_SCHEME: &str = "itunes_backup";

/// Backup format version field of the hash line (iOS 10 and later).
pub const HASH_FORMAT_VERSION: u32 = 10;

/// Plist at the backup root describing encryption state and holding the key bag.
pub const MANIFEST_PLIST: &str = "Manifest.plist";

/// SQLite catalogue of every file in the backup.
pub const MANIFEST_DB: &str = "Manifest.db";

/// Default number of concurrent decrypt workers.
pub const DEFAULT_WORKERS: usize = 6;

/// Largest gap between decrypted length and declared size that is zero-filled.
/// A wider gap means the declared size is corrupt.
pub const MAX_ZERO_FILL: u64 = i32::MAX as u64;

/// Default deadline for a whole batch.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);
