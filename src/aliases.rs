//! # Secure-Gate Type Aliases
//!
//! Type aliases for secret material, built on [`secure-gate`](https://github.com/Slurp9187/secure-gate).
//! Every type here is zeroized on drop and only reachable through `.expose_secret()` /
//! `.expose_secret_mut()`.
//!
//! ## Type Categories
//!
//! ### HMAC Primitives
//! - [`HmacSha256`] - PRF for the stage-1 (passcode stretching) PBKDF2
//! - [`HmacSha1`] - PRF for the stage-2 (domain separation) PBKDF2
//!
//! ### Generic Secure Buffers
//! - [`SpanBuffer<N>`] - Generic secure stack buffer for any size `N`
//! - [`Block16`] - one AES block
//!
//! ### Dynamic Secrets
//! - [`PasscodeString`] - the user's backup passcode
//!
//! ### Fixed-Size Secrets
//! - [`Aes256Key32`] - class content keys, per-file keys, the KDF intermediate key and
//!   the key-encryption key (all 32 bytes)
//! - [`Iv16`] - CBC initialization vector
//! - [`WrappedKey40`] - a 32-byte key wrapped with the 8-byte RFC 3394 integrity block

use secure_gate::dynamic_alias;
use secure_gate::fixed_alias;

// ─────────────────────────────────────────────────────────────────────────────
// HMAC primitives
// ─────────────────────────────────────────────────────────────────────────────
use hmac::Hmac;
use sha1::Sha1;
use sha2::Sha256;

pub type HmacSha1 = Hmac<Sha1>;
pub type HmacSha256 = Hmac<Sha256>;

// ─────────────────────────────────────────────────────────────────────────────
// SpanBuffer: generic secure stack buffer
// ─────────────────────────────────────────────────────────────────────────────
pub type SpanBuffer<const N: usize> = secure_gate::Fixed<[u8; N]>;

pub type Block16 = SpanBuffer<16>; // one AES block

// ─────────────────────────────────────────────────────────────────────────────
// Dynamic secrets
// ─────────────────────────────────────────────────────────────────────────────
dynamic_alias!(PasscodeString, String);

// ─────────────────────────────────────────────────────────────────────────────
// Fixed-size concrete secrets, alphabetical order
// ─────────────────────────────────────────────────────────────────────────────
fixed_alias!(Aes256Key32, 32); // class key, file key, KEK
fixed_alias!(Iv16, 16); // CBC IV (always zero for backup files)
fixed_alias!(WrappedKey40, 40); // RFC 3394 wrapped 32-byte key
