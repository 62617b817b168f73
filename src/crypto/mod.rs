// src/crypto/mod.rs

//! Low-level crypto primitives: the two-stage passcode KDF and RFC 3394 key wrap.
//!
//! HMAC types are defined in `aliases.rs`.

pub mod kdf;
pub mod keywrap;
