//! Key bag: parse the TLV blob, unlock class keys, project hash-cracking lines.
//!
//! Lifecycle is carried by the types: [`KeyBag`] is the parsed, locked bag;
//! [`KeyBag::unlock`] consumes it and yields an [`UnlockedKeyBag`], the only type
//! that file decryption accepts. A rejected unlock hands the locked bag back.

pub(crate) mod hashes;
pub(crate) mod parse;
pub(crate) mod types;
pub(crate) mod unlock;

pub use hashes::{collect_password_hashes, format_hash_line};
pub use parse::parse_keybag;
pub use types::{ClassKeyRecord, KeyBag, KeyBagType};
pub use unlock::{UnlockRejected, UnlockedKeyBag};
