// src/encryptor/mod.rs

//! Per-file encryption in the backup's file format.
//!
//! The inverse of [`crate::decryptor::decrypt_stream`], for authoring fixtures and
//! re-encrypting edited files.

pub(crate) mod stream;

pub use stream::encrypt_stream;
