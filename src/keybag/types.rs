//! src/keybag/types.rs
//! Typed records produced by the key bag parser

use crate::consts::{ATTR_DPIC, ATTR_DPSL, ATTR_ITER, ATTR_SALT, UUID_LENGTH, WRAP_DEVICE, WRAP_PASSCODE};
use crate::crypto::kdf::KdfParams;
use crate::error::BackupError;
use crate::utils::{be_u32, tag_display};
use std::collections::BTreeMap;

/// Key bag `TYPE` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyBagType {
    /// No `TYPE` tag was present.
    #[default]
    Unknown,
    System,
    Backup,
    Escrow,
    /// Over-the-air (iCloud) escrow bag.
    Ota,
}

impl KeyBagType {
    /// Map a `TYPE` value to its variant; only 0–3 are defined.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::System),
            1 => Some(Self::Backup),
            2 => Some(Self::Escrow),
            3 => Some(Self::Ota),
            _ => None,
        }
    }
}

/// One protection class entry of the key bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassKeyRecord {
    /// The `UUID` tag that opened this record (absent for records started by another tag).
    pub uuid: Option<[u8; UUID_LENGTH]>,
    /// Protection class id (`CLAS`).
    pub class: u32,
    /// Wrap flags (`WRAP`); bit 1 means "wrapped by the passcode-derived key".
    pub wrap: u32,
    /// RFC 3394 wrapped class key (`WPKY`).
    pub wrapped_key: Option<Vec<u8>>,
    /// Key type (`KTYP`).
    pub key_type: Option<u32>,
    /// Public key for asymmetric classes (`PBKY`).
    pub public_key: Option<Vec<u8>>,
}

impl ClassKeyRecord {
    /// `true` when this class can be unlocked with the backup passcode.
    #[must_use]
    pub fn is_passcode_wrapped(&self) -> bool {
        self.wrap & WRAP_PASSCODE != 0 && self.wrapped_key.is_some()
    }

    /// `true` for classes wrapped only by the device key; a backup can never unlock these.
    #[must_use]
    pub const fn is_device_only(&self) -> bool {
        self.wrap & WRAP_DEVICE != 0 && self.wrap & WRAP_PASSCODE == 0
    }
}

/// A parsed key bag. Holds no unwrapped secrets; this is the locked state.
///
/// Parsing the same bytes twice yields equal values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyBag {
    pub(crate) kind: KeyBagType,
    pub(crate) uuid: Option<[u8; UUID_LENGTH]>,
    pub(crate) wrap: Option<u32>,
    pub(crate) attributes: BTreeMap<[u8; 4], Vec<u8>>,
    pub(crate) class_keys: BTreeMap<u32, ClassKeyRecord>,
}

impl KeyBag {
    /// Parse a raw key bag blob. See [`parse_keybag`](crate::keybag::parse_keybag).
    pub fn parse(bytes: &[u8]) -> Result<Self, BackupError> {
        crate::keybag::parse_keybag(bytes)
    }

    #[must_use]
    pub const fn kind(&self) -> KeyBagType {
        self.kind
    }

    #[must_use]
    pub const fn uuid(&self) -> Option<&[u8; UUID_LENGTH]> {
        self.uuid.as_ref()
    }

    /// Global wrap flags (first `WRAP` tag).
    #[must_use]
    pub const fn wrap(&self) -> Option<u32> {
        self.wrap
    }

    /// Free-form attribute by tag, e.g. `b"DPSL"`.
    #[must_use]
    pub fn attribute(&self, tag: &[u8; 4]) -> Option<&[u8]> {
        self.attributes.get(tag).map(Vec::as_slice)
    }

    #[must_use]
    pub fn class_key(&self, class: u32) -> Option<&ClassKeyRecord> {
        self.class_keys.get(&class)
    }

    /// All class-key records, ordered by class id.
    pub fn class_keys(&self) -> impl Iterator<Item = &ClassKeyRecord> {
        self.class_keys.values()
    }

    /// Class keys that the passcode can unlock.
    pub fn passcode_wrapped(&self) -> impl Iterator<Item = &ClassKeyRecord> {
        self.class_keys
            .values()
            .filter(|record| record.is_passcode_wrapped())
    }

    pub(crate) fn required_attribute(&self, tag: &[u8; 4]) -> Result<&[u8], BackupError> {
        self.attribute(tag).ok_or_else(|| {
            BackupError::MalformedKeyBag(format!("missing attribute {}", tag_display(tag)))
        })
    }

    /// Salts and iteration counts for both KDF stages.
    pub fn kdf_params(&self) -> Result<KdfParams, BackupError> {
        Ok(KdfParams {
            passcode_salt: self.required_attribute(ATTR_DPSL)?.to_vec(),
            passcode_iterations: be_u32(self.required_attribute(ATTR_DPIC)?, "DPIC")?,
            salt: self.required_attribute(ATTR_SALT)?.to_vec(),
            iterations: be_u32(self.required_attribute(ATTR_ITER)?, "ITER")?,
        })
    }
}
