//! src/backup/manifest.rs
//! `Manifest.plist`: encryption state, key bag and manifest database key

use crate::consts::MANIFEST_PLIST;
use crate::error::BackupError;
use plist::{Dictionary, Value};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Device identity recorded under `Lockdown`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub product_type: Option<String>,
    pub product_version: Option<String>,
    pub serial_number: Option<String>,
}

impl fmt::Display for DeviceInfo {
    /// `name (type, version) serial`, leaving out what the backup did not record.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.device_name.as_deref().unwrap_or("unknown device"))?;
        let model: Vec<&str> = [&self.product_type, &self.product_version]
            .into_iter()
            .filter_map(Option::as_deref)
            .collect();
        if !model.is_empty() {
            write!(f, " ({})", model.join(", "))?;
        }
        if let Some(serial) = &self.serial_number {
            write!(f, " {serial}")?;
        }
        Ok(())
    }
}

/// The parts of `Manifest.plist` needed to open a backup.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub is_encrypted: bool,
    pub was_passcode_set: Option<bool>,
    pub version: Option<String>,
    /// Raw `BackupKeyBag` blob; present only for encrypted backups.
    pub keybag: Option<Vec<u8>>,
    /// Raw `ManifestKey` (protection class + wrapped key for `Manifest.db`).
    pub manifest_key: Option<Vec<u8>>,
    pub device: DeviceInfo,
}

fn string_of(dict: &Dictionary, key: &str) -> Option<String> {
    dict.get(key).and_then(Value::as_string).map(str::to_owned)
}

impl Manifest {
    /// Read `<backup_root>/Manifest.plist`.
    pub fn load(backup_root: &Path) -> Result<Self, BackupError> {
        let path = backup_root.join(MANIFEST_PLIST);
        let value = Value::from_file(&path)
            .map_err(|e| BackupError::Manifest(format!("{}: {e}", path.display())))?;
        Self::from_value(&value)
    }

    /// Decode an already-parsed `Manifest.plist`.
    pub fn from_value(value: &Value) -> Result<Self, BackupError> {
        let dict = value
            .as_dictionary()
            .ok_or_else(|| BackupError::Manifest("top level is not a dictionary".into()))?;

        let is_encrypted = dict
            .get("IsEncrypted")
            .and_then(Value::as_boolean)
            .unwrap_or(false);

        let keybag = dict.get("BackupKeyBag").and_then(Value::as_data).map(<[u8]>::to_vec);
        if is_encrypted && keybag.is_none() {
            return Err(BackupError::Manifest(
                "encrypted backup has no BackupKeyBag".into(),
            ));
        }

        let device = dict
            .get("Lockdown")
            .and_then(Value::as_dictionary)
            .map(|lockdown| DeviceInfo {
                device_name: string_of(lockdown, "DeviceName"),
                product_type: string_of(lockdown, "ProductType"),
                product_version: string_of(lockdown, "ProductVersion"),
                serial_number: string_of(lockdown, "SerialNumber"),
            })
            .unwrap_or_default();

        let manifest = Self {
            is_encrypted,
            was_passcode_set: dict.get("WasPasscodeSet").and_then(Value::as_boolean),
            version: string_of(dict, "Version"),
            keybag,
            manifest_key: dict.get("ManifestKey").and_then(Value::as_data).map(<[u8]>::to_vec),
            device,
        };
        debug!(encrypted = manifest.is_encrypted, "read manifest");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_value(encrypted: bool, with_bag: bool) -> Value {
        let mut lockdown = Dictionary::new();
        lockdown.insert("DeviceName".into(), Value::String("Test Phone".into()));
        lockdown.insert("ProductVersion".into(), Value::String("17.4".into()));
        let mut dict = Dictionary::new();
        dict.insert("IsEncrypted".into(), Value::Boolean(encrypted));
        dict.insert("Version".into(), Value::String("10.0".into()));
        dict.insert("Lockdown".into(), Value::Dictionary(lockdown));
        if with_bag {
            dict.insert("BackupKeyBag".into(), Value::Data(vec![1, 2, 3]));
            dict.insert("ManifestKey".into(), Value::Data(vec![0u8; 44]));
        }
        Value::Dictionary(dict)
    }

    #[test]
    fn reads_encrypted_manifest() {
        let m = Manifest::from_value(&manifest_value(true, true)).unwrap();
        assert!(m.is_encrypted);
        assert_eq!(m.keybag.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(m.manifest_key.map(|k| k.len()), Some(44));
        assert_eq!(m.device.device_name.as_deref(), Some("Test Phone"));
        assert_eq!(m.device.serial_number, None);
        assert_eq!(m.device.to_string(), "Test Phone (17.4)");
        assert_eq!(m.version.as_deref(), Some("10.0"));
        assert_eq!(m.was_passcode_set, None);
    }

    #[test]
    fn unnamed_device_display() {
        let device = DeviceInfo {
            product_type: Some("iPhone15,2".into()),
            product_version: Some("17.4".into()),
            serial_number: Some("F17XYZ".into()),
            ..DeviceInfo::default()
        };
        assert_eq!(device.to_string(), "unknown device (iPhone15,2, 17.4) F17XYZ");
    }

    #[test]
    fn encrypted_without_keybag_is_an_error() {
        assert!(matches!(
            Manifest::from_value(&manifest_value(true, false)),
            Err(BackupError::Manifest(_))
        ));
    }

    #[test]
    fn plain_backup() {
        let m = Manifest::from_value(&manifest_value(false, false)).unwrap();
        assert!(!m.is_encrypted);
        assert!(m.keybag.is_none());
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        manifest_value(true, true)
            .to_file_binary(dir.path().join(MANIFEST_PLIST))
            .unwrap();
        assert!(Manifest::load(dir.path()).unwrap().is_encrypted);

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            Manifest::load(empty.path()),
            Err(BackupError::Manifest(_))
        ));
    }
}
