// src/decryptor/mod.rs

//! Per-file decryption.
//!
//! Core API: `decrypt_stream(input, output, file_key, declared_size)?` for one file's ciphertext.
//! Helper: `unwrap_file_key` turns a file's wrapped key into its content key.

pub(crate) mod file_key;
pub(crate) mod stream;

pub use file_key::unwrap_file_key;
pub use stream::decrypt_stream;
