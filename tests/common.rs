//! tests/common.rs
//! Fixture builders shared across test files: key bags, keyed-archive blobs,
//! in-memory sources and on-disk backup directories

#![allow(dead_code)] // each test file uses a different subset

use mobilebackup_rs::aliases::{Aes256Key32, PasscodeString};
use mobilebackup_rs::backup::BackupSource;
use mobilebackup_rs::crypto::kdf::KdfParams;
use mobilebackup_rs::{encrypt_stream, wrap_key32, BackupError};
use plist::{Dictionary, Uid, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Passcode the fixture bag is wrapped with.
pub const TEST_PASSCODE: &str = "1234";

/// Fast iteration counts for tests - performance testing is in benches/
pub const TEST_PASSCODE_ITERATIONS: u32 = 5;
pub const TEST_ITERATIONS: u32 = 3;

pub const TEST_PASSCODE_SALT: [u8; 20] = [0x33; 20];
pub const TEST_SALT: [u8; 20] = [0x22; 20];

/// Protection class of every fixture file.
pub const TEST_CLASS: u32 = 3;

pub fn passcode(s: &str) -> PasscodeString {
    PasscodeString::new(s.to_string())
}

pub fn class_key() -> Aes256Key32 {
    Aes256Key32::new([0x5C; 32])
}

/// Deterministic per-file key so fixtures are reproducible.
pub fn file_key_for(file_id: &str) -> Aes256Key32 {
    let mut key = [0u8; 32];
    for (i, b) in file_id.bytes().cycle().take(32).enumerate() {
        key[i] = b ^ (i as u8);
    }
    Aes256Key32::new(key)
}

pub fn kdf_params() -> KdfParams {
    KdfParams {
        passcode_salt: TEST_PASSCODE_SALT.to_vec(),
        passcode_iterations: TEST_PASSCODE_ITERATIONS,
        salt: TEST_SALT.to_vec(),
        iterations: TEST_ITERATIONS,
    }
}

pub fn tlv(out: &mut Vec<u8>, tag: &[u8; 4], value: &[u8]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
}

/// KEK of [`TEST_PASSCODE`] under [`kdf_params`], computed outside this crate.
pub const TEST_KEK_HEX: &str = "bba6b4ef02721a0e91d48f6cbe54509832450bb196f298ccc2d775794a270d0d";

/// [`class_key`] wrapped under [`TEST_KEK_HEX`] (RFC 3394), computed outside this crate.
pub const WRAPPED_CLASS_KEY_HEX: &str =
    "9610b903d831b925fe372fa36a46283341dae543caaf953cbe0453775acff59c50ccea0327b64104";

/// A file key of `[0x42; 32]` wrapped under [`class_key`], its ciphertext and plaintext.
pub const KAT_WRAPPED_FILE_KEY_HEX: &str =
    "f968cb7a8add5235e175423b61faafdac500df8afbde2e51d32db39b992315e1a833a396cd2b964d";
pub const KAT_CIPHERTEXT_HEX: &str = "96ac66614f5ce6b3ad186a3c62e47516";
pub const KAT_PLAINTEXT: &[u8] = b"call log row 1\n";

/// Wrapped class key of [`TEST_CLASS`] as stored in the fixture bag.
pub fn wrapped_class_key() -> Vec<u8> {
    hex::decode(WRAPPED_CLASS_KEY_HEX).unwrap()
}

/// A backup key bag: one passcode-wrapped class ([`TEST_CLASS`]) and one
/// device-only class (4).
pub fn keybag_bytes() -> Vec<u8> {
    let mut b = Vec::new();
    tlv(&mut b, b"VERS", &4u32.to_be_bytes());
    tlv(&mut b, b"TYPE", &1u32.to_be_bytes());
    tlv(&mut b, b"UUID", &[0xAA; 16]);
    tlv(&mut b, b"HMCK", &[0x01; 40]);
    tlv(&mut b, b"WRAP", &0u32.to_be_bytes());
    tlv(&mut b, b"SALT", &TEST_SALT);
    tlv(&mut b, b"ITER", &TEST_ITERATIONS.to_be_bytes());
    tlv(&mut b, b"DPWT", &1u32.to_be_bytes());
    tlv(&mut b, b"DPIC", &TEST_PASSCODE_ITERATIONS.to_be_bytes());
    tlv(&mut b, b"DPSL", &TEST_PASSCODE_SALT);

    tlv(&mut b, b"UUID", &[0x03; 16]);
    tlv(&mut b, b"CLAS", &TEST_CLASS.to_be_bytes());
    tlv(&mut b, b"WRAP", &3u32.to_be_bytes());
    tlv(&mut b, b"KTYP", &0u32.to_be_bytes());
    tlv(&mut b, b"WPKY", &wrapped_class_key());

    tlv(&mut b, b"UUID", &[0x04; 16]);
    tlv(&mut b, b"CLAS", &4u32.to_be_bytes());
    tlv(&mut b, b"WRAP", &1u32.to_be_bytes());
    tlv(&mut b, b"KTYP", &0u32.to_be_bytes());
    tlv(&mut b, b"WPKY", &[0x77; 40]);
    b
}

/// Keyed-archive metadata blob for a file of `class` whose key wraps to `wrapped`.
pub fn file_blob(class: u32, wrapped: &[u8]) -> Vec<u8> {
    let mut ns_data = class.to_le_bytes().to_vec();
    ns_data.extend_from_slice(wrapped);

    let mut props = Dictionary::new();
    props.insert("ProtectionClass".into(), Value::Integer(i64::from(class).into()));
    props.insert("EncryptionKey".into(), Value::Uid(Uid::new(2)));
    let mut key = Dictionary::new();
    key.insert("NS.data".into(), Value::Data(ns_data));

    let mut top = Dictionary::new();
    top.insert("root".into(), Value::Uid(Uid::new(1)));
    let mut archive = Dictionary::new();
    archive.insert("$archiver".into(), Value::String("NSKeyedArchiver".into()));
    archive.insert(
        "$objects".into(),
        Value::Array(vec![
            Value::String("$null".into()),
            Value::Dictionary(props),
            Value::Dictionary(key),
        ]),
    );
    archive.insert("$top".into(), Value::Dictionary(top));

    let mut out = Vec::new();
    Value::Dictionary(archive).to_writer_binary(&mut out).unwrap();
    out
}

pub fn encrypt_bytes(plaintext: &[u8], key: &Aes256Key32) -> Vec<u8> {
    let mut out = Vec::new();
    encrypt_stream(plaintext, &mut out, key).unwrap();
    out
}

/// Metadata blob and ciphertext of `plaintext` stored as `file_id`.
pub fn encrypted_file(file_id: &str, plaintext: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let file_key = file_key_for(file_id);
    let wrapped = wrap_key32(class_key().expose_secret(), &file_key).unwrap();
    (
        file_blob(TEST_CLASS, wrapped.expose_secret()),
        encrypt_bytes(plaintext, &file_key),
    )
}

/// Backup held in memory, optionally slow to open files.
#[derive(Default)]
pub struct MemorySource {
    blobs: HashMap<String, Vec<u8>>,
    data: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encrypted(mut self, file_id: &str, plaintext: &[u8]) -> Self {
        let (blob, ciphertext) = encrypted_file(file_id, plaintext);
        self.blobs.insert(file_id.to_string(), blob);
        self.data.insert(file_id.to_string(), ciphertext);
        self
    }

    pub fn with_raw(mut self, file_id: &str, blob: Vec<u8>, data: Vec<u8>) -> Self {
        self.blobs.insert(file_id.to_string(), blob);
        self.data.insert(file_id.to_string(), data);
        self
    }

    pub fn with_delay(mut self, file_id: &str, delay: Duration) -> Self {
        self.delays.insert(file_id.to_string(), delay);
        self
    }
}

impl BackupSource for MemorySource {
    type Reader = Cursor<Vec<u8>>;

    fn locate_file_blob(&self, file_id: &str) -> Result<Vec<u8>, BackupError> {
        self.blobs.get(file_id).cloned().ok_or_else(|| {
            BackupError::MalformedFileRecord(format!("{file_id} is not in the manifest"))
        })
    }

    fn read_source_bytes(&self, file_id: &str) -> Result<Self::Reader, BackupError> {
        if let Some(delay) = self.delays.get(file_id) {
            thread::sleep(*delay);
        }
        self.data
            .get(file_id)
            .cloned()
            .map(Cursor::new)
            .ok_or_else(|| {
                BackupError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{file_id} missing"),
                ))
            })
    }
}

/// Write a complete encrypted backup directory holding `files`
/// (`(file_id, domain, relative_path, plaintext)`).
pub fn write_encrypted_backup(root: &Path, files: &[(&str, &str, &str, &[u8])]) {
    // catalogue in plaintext first
    let db_plain = root.join("Manifest.db.plain");
    {
        let conn = rusqlite::Connection::open(&db_plain).unwrap();
        conn.execute_batch(
            "CREATE TABLE Files (fileID TEXT PRIMARY KEY, domain TEXT, relativePath TEXT,
                                 flags INTEGER, file BLOB);",
        )
        .unwrap();
        for (file_id, domain, relative_path, plaintext) in files {
            let (blob, ciphertext) = encrypted_file(file_id, plaintext);
            conn.execute(
                "INSERT INTO Files VALUES (?1, ?2, ?3, 1, ?4)",
                rusqlite::params![file_id, domain, relative_path, blob],
            )
            .unwrap();
            let dir = root.join(&file_id[..2]);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(file_id), ciphertext).unwrap();
        }
    }

    // Manifest.db is encrypted under its own key, referenced by ManifestKey
    let manifest_file_key = file_key_for("Manifest.db");
    let wrapped = wrap_key32(class_key().expose_secret(), &manifest_file_key).unwrap();
    let db_bytes = std::fs::read(&db_plain).unwrap();
    std::fs::remove_file(&db_plain).unwrap();
    std::fs::write(
        root.join("Manifest.db"),
        encrypt_bytes(&db_bytes, &manifest_file_key),
    )
    .unwrap();

    let mut manifest_key = TEST_CLASS.to_le_bytes().to_vec();
    manifest_key.extend_from_slice(wrapped.expose_secret());

    let mut lockdown = Dictionary::new();
    lockdown.insert("DeviceName".into(), Value::String("Fixture Phone".into()));
    let mut plist = Dictionary::new();
    plist.insert("IsEncrypted".into(), Value::Boolean(true));
    plist.insert("WasPasscodeSet".into(), Value::Boolean(true));
    plist.insert("Version".into(), Value::String("10.0".into()));
    plist.insert("BackupKeyBag".into(), Value::Data(keybag_bytes()));
    plist.insert("ManifestKey".into(), Value::Data(manifest_key));
    plist.insert("Lockdown".into(), Value::Dictionary(lockdown));
    Value::Dictionary(plist)
        .to_file_binary(root.join("Manifest.plist"))
        .unwrap();
}

/// Write an unencrypted backup directory holding `files` verbatim.
pub fn write_plain_backup(root: &Path, files: &[(&str, &[u8])]) {
    let conn = rusqlite::Connection::open(root.join("Manifest.db")).unwrap();
    conn.execute_batch(
        "CREATE TABLE Files (fileID TEXT PRIMARY KEY, domain TEXT, relativePath TEXT,
                             flags INTEGER, file BLOB);",
    )
    .unwrap();
    for (file_id, plaintext) in files {
        conn.execute(
            "INSERT INTO Files VALUES (?1, 'HomeDomain', ?1, 1, NULL)",
            [file_id],
        )
        .unwrap();
        let dir = root.join(&file_id[..2]);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file_id), plaintext).unwrap();
    }

    let mut plist = Dictionary::new();
    plist.insert("IsEncrypted".into(), Value::Boolean(false));
    Value::Dictionary(plist)
        .to_file_binary(root.join("Manifest.plist"))
        .unwrap();
}
