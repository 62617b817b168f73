//! # Key Derivation Functions (KDF)
//!
//! The backup passcode becomes a key-encryption key through two chained PBKDF2 runs:
//!
//! 1. PBKDF2-HMAC-SHA256 over the UTF-8 passcode, salt `DPSL`, `DPIC` iterations
//!    -> 32-byte intermediate key (the expensive stretching step);
//! 2. PBKDF2-HMAC-SHA1 over the intermediate key, salt `SALT`, `ITER` iterations
//!    -> 32-byte key-encryption key.
//!
//! Both stages consume the exact salt bytes stored in the key bag.

pub mod pbkdf2;

pub use self::pbkdf2::{
    derive_intermediate_key, derive_kek_from_intermediate, derive_key_encryption_key, KdfParams,
};
