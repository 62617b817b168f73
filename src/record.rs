//! # File Encryption Records
//!
//! Each backed-up file carries a small keyed-archive blob (a binary plist with
//! `$objects` / `$top`) in its manifest row. Only two references are ever
//! followed: `$top.root` -> file properties, and `EncryptionKey` -> the wrapped key
//! dictionary. This module is a narrow reader for exactly that walk, not a
//! general archive decoder.

use crate::aliases::WrappedKey40;
use crate::consts::{MANIFEST_KEY_CLASS_LENGTH, NS_DATA_KEY_OFFSET, WRAPPED_FILE_KEY_LENGTH};
use crate::error::BackupError;
use plist::{Dictionary, Value};
use std::io::Cursor;

/// Protection class and wrapped key of one file.
///
/// Transient: resolved per decrypt and dropped afterwards.
#[derive(Debug, Clone)]
pub struct FileEncryptionRecord {
    pub protection_class: u32,
    pub wrapped_key: WrappedKey40,
}

fn malformed(msg: impl Into<String>) -> BackupError {
    BackupError::MalformedFileRecord(msg.into())
}

/// `$objects` of a keyed archive, addressed by reference.
struct ObjectTable<'a> {
    objects: &'a [Value],
}

impl<'a> ObjectTable<'a> {
    fn follow(&self, reference: Option<&Value>, what: &str) -> Result<&'a Value, BackupError> {
        let index = match reference {
            Some(Value::Uid(uid)) => uid.get(),
            Some(_) => return Err(malformed(format!("{what} is not an object reference"))),
            None => return Err(malformed(format!("{what} is missing"))),
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| self.objects.get(i))
            .ok_or_else(|| {
                malformed(format!(
                    "{what} references object {index} of {}",
                    self.objects.len()
                ))
            })
    }

    fn follow_dict(
        &self,
        reference: Option<&Value>,
        what: &str,
    ) -> Result<&'a Dictionary, BackupError> {
        self.follow(reference, what)?
            .as_dictionary()
            .ok_or_else(|| malformed(format!("{what} is not a dictionary")))
    }
}

impl FileEncryptionRecord {
    #[must_use]
    pub const fn new(protection_class: u32, wrapped_key: WrappedKey40) -> Self {
        Self {
            protection_class,
            wrapped_key,
        }
    }

    /// Resolve the record from a file's serialized keyed-archive blob.
    ///
    /// The wrapped key is the 40 bytes after a 4-byte prefix of `NS.data`;
    /// shorter data is an error, longer data is ignored past byte 44.
    pub fn resolve(blob: &[u8]) -> Result<Self, BackupError> {
        let archive = Value::from_reader(Cursor::new(blob))
            .map_err(|e| malformed(format!("not a property list: {e}")))?;
        let archive = archive
            .as_dictionary()
            .ok_or_else(|| malformed("archive is not a dictionary"))?;

        let objects = archive
            .get("$objects")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("$objects is missing or not an array"))?;
        let table = ObjectTable { objects };

        let top = archive
            .get("$top")
            .and_then(Value::as_dictionary)
            .ok_or_else(|| malformed("$top is missing or not a dictionary"))?;
        let properties = table.follow_dict(top.get("root"), "$top.root")?;

        let class = properties
            .get("ProtectionClass")
            .and_then(Value::as_unsigned_integer)
            .ok_or_else(|| malformed("ProtectionClass is missing or not an integer"))?;
        let protection_class = u32::try_from(class)
            .map_err(|_| malformed(format!("ProtectionClass {class} out of range")))?;

        let key_dict = table.follow_dict(properties.get("EncryptionKey"), "EncryptionKey")?;
        let data = key_dict
            .get("NS.data")
            .and_then(Value::as_data)
            .ok_or_else(|| malformed("EncryptionKey has no NS.data"))?;

        let end = NS_DATA_KEY_OFFSET + WRAPPED_FILE_KEY_LENGTH;
        if data.len() < end {
            return Err(malformed(format!(
                "NS.data is {} bytes, need at least {end}",
                data.len()
            )));
        }

        let mut wrapped_key = WrappedKey40::new([0u8; WRAPPED_FILE_KEY_LENGTH]);
        wrapped_key
            .expose_secret_mut()
            .copy_from_slice(&data[NS_DATA_KEY_OFFSET..end]);
        Ok(Self::new(protection_class, wrapped_key))
    }

    /// Record for `Manifest.db` from the `ManifestKey` value of `Manifest.plist`:
    /// a little-endian protection class followed by the 40-byte wrapped key.
    pub fn from_manifest_key(manifest_key: &[u8]) -> Result<Self, BackupError> {
        if manifest_key.len() != MANIFEST_KEY_CLASS_LENGTH + WRAPPED_FILE_KEY_LENGTH {
            return Err(malformed(format!(
                "ManifestKey is {} bytes, expected {}",
                manifest_key.len(),
                MANIFEST_KEY_CLASS_LENGTH + WRAPPED_FILE_KEY_LENGTH
            )));
        }
        let (class, key) = manifest_key.split_at(MANIFEST_KEY_CLASS_LENGTH);
        let mut class_bytes = [0u8; MANIFEST_KEY_CLASS_LENGTH];
        class_bytes.copy_from_slice(class);

        let mut wrapped_key = WrappedKey40::new([0u8; WRAPPED_FILE_KEY_LENGTH]);
        wrapped_key.expose_secret_mut().copy_from_slice(key);
        Ok(Self::new(u32::from_le_bytes(class_bytes), wrapped_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::Uid;

    fn archive(objects: Vec<Value>, root: Value) -> Vec<u8> {
        let mut top = Dictionary::new();
        top.insert("root".into(), root);
        let mut dict = Dictionary::new();
        dict.insert("$archiver".into(), Value::String("NSKeyedArchiver".into()));
        dict.insert("$objects".into(), Value::Array(objects));
        dict.insert("$top".into(), Value::Dictionary(top));
        let mut out = Vec::new();
        Value::Dictionary(dict).to_writer_binary(&mut out).unwrap();
        out
    }

    fn file_objects(class: i64, ns_data: Vec<u8>) -> Vec<Value> {
        let mut props = Dictionary::new();
        props.insert("ProtectionClass".into(), Value::Integer(class.into()));
        props.insert("EncryptionKey".into(), Value::Uid(Uid::new(2)));
        props.insert("Size".into(), Value::Integer(1234i64.into()));
        let mut key = Dictionary::new();
        key.insert("NS.data".into(), Value::Data(ns_data));
        vec![
            Value::String("$null".into()),
            Value::Dictionary(props),
            Value::Dictionary(key),
        ]
    }

    #[test]
    fn resolves_class_and_key() {
        let mut ns_data = 3u32.to_le_bytes().to_vec();
        ns_data.extend((0u8..40).collect::<Vec<_>>());
        let blob = archive(file_objects(3, ns_data), Value::Uid(Uid::new(1)));

        let record = FileEncryptionRecord::resolve(&blob).unwrap();
        assert_eq!(record.protection_class, 3);
        assert_eq!(record.wrapped_key.expose_secret()[0], 0);
        assert_eq!(record.wrapped_key.expose_secret()[39], 39);
    }

    #[test]
    fn short_ns_data_fails_fast() {
        let blob = archive(file_objects(3, vec![0u8; 43]), Value::Uid(Uid::new(1)));
        assert!(matches!(
            FileEncryptionRecord::resolve(&blob),
            Err(BackupError::MalformedFileRecord(_))
        ));
    }

    #[test]
    fn out_of_range_reference() {
        let blob = archive(file_objects(3, vec![0u8; 44]), Value::Uid(Uid::new(9)));
        let err = FileEncryptionRecord::resolve(&blob).unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed file record: $top.root references object 9 of 3"
        );
    }

    #[test]
    fn root_must_be_a_reference() {
        let blob = archive(file_objects(3, vec![0u8; 44]), Value::Integer(1i64.into()));
        assert!(FileEncryptionRecord::resolve(&blob).is_err());
    }

    #[test]
    fn garbage_is_not_a_record() {
        assert!(matches!(
            FileEncryptionRecord::resolve(b"not a plist"),
            Err(BackupError::MalformedFileRecord(_))
        ));
    }

    #[test]
    fn manifest_key_layout() {
        let mut key = 4u32.to_le_bytes().to_vec();
        key.extend([0x5A; 40]);
        let record = FileEncryptionRecord::from_manifest_key(&key).unwrap();
        assert_eq!(record.protection_class, 4);
        assert_eq!(record.wrapped_key.expose_secret(), &[0x5A; 40]);

        assert!(FileEncryptionRecord::from_manifest_key(&key[..43]).is_err());
    }
}
