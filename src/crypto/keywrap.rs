//! src/crypto/keywrap.rs
//! RFC 3394 AES Key Wrap: default ICV, no IV parameter
//!
//! Used at two layers: class keys wrapped by the passcode-derived KEK, and
//! per-file keys wrapped by a class key. The KEK may be 128, 192 or 256 bits.

use crate::aliases::{Aes256Key32, Block16, WrappedKey40};
use crate::consts::{KEY_WRAP_ICV, KEY_WRAP_OVERHEAD};
use crate::error::BackupError;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block as AesBlock};
use subtle::ConstantTimeEq;

/// AES keyed with a KEK of any standard size.
enum Kek {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl Kek {
    fn new(kek: &[u8]) -> Result<Self, BackupError> {
        let cipher = match kek.len() {
            16 => Aes128::new_from_slice(kek).map(Kek::Aes128),
            24 => Aes192::new_from_slice(kek).map(Kek::Aes192),
            32 => Aes256::new_from_slice(kek).map(Kek::Aes256),
            n => {
                return Err(BackupError::Crypto(format!(
                    "key wrap KEK must be 16, 24 or 32 bytes, got {n}"
                )))
            }
        };
        cipher.map_err(|e| BackupError::Crypto(format!("invalid KEK: {e}")))
    }

    #[inline(always)]
    fn encrypt(&self, block: &mut AesBlock) {
        match self {
            Kek::Aes128(c) => c.encrypt_block(block),
            Kek::Aes192(c) => c.encrypt_block(block),
            Kek::Aes256(c) => c.encrypt_block(block),
        }
    }

    #[inline(always)]
    fn decrypt(&self, block: &mut AesBlock) {
        match self {
            Kek::Aes128(c) => c.decrypt_block(block),
            Kek::Aes192(c) => c.decrypt_block(block),
            Kek::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// Number of 64-bit key-data blocks, validating the RFC 3394 length rules.
fn semiblocks(key_data_len: usize) -> Result<usize, BackupError> {
    if key_data_len < 16 || key_data_len % 8 != 0 {
        return Err(BackupError::Crypto(format!(
            "key wrap data must be a multiple of 8 bytes and at least 16, got {key_data_len}"
        )));
    }
    Ok(key_data_len / 8)
}

/// Unwrap `wrapped` under `kek` into `out` (`out.len() == wrapped.len() - 8`).
///
/// On integrity failure `out` is zeroed and [`BackupError::IntegrityCheck`] is returned.
pub fn unwrap_into(kek: &[u8], wrapped: &[u8], out: &mut [u8]) -> Result<(), BackupError> {
    if wrapped.len() < KEY_WRAP_OVERHEAD || out.len() != wrapped.len() - KEY_WRAP_OVERHEAD {
        return Err(BackupError::Crypto(format!(
            "unwrap output must be {} bytes for {} wrapped bytes",
            wrapped.len().saturating_sub(KEY_WRAP_OVERHEAD),
            wrapped.len()
        )));
    }
    let n = semiblocks(out.len())?;
    let cipher = Kek::new(kek)?;

    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped[..8]);
    out.copy_from_slice(&wrapped[8..]);

    let mut block = Block16::new([0u8; 16]);
    for j in (0..6u64).rev() {
        for i in (1..=n).rev() {
            let t = (n as u64) * j + i as u64;
            let a_xor_t = u64::from_be_bytes(a) ^ t;

            let buf = block.expose_secret_mut();
            buf[..8].copy_from_slice(&a_xor_t.to_be_bytes());
            buf[8..].copy_from_slice(&out[(i - 1) * 8..i * 8]);

            let mut aes_block = AesBlock::from(*buf);
            cipher.decrypt(&mut aes_block);

            a.copy_from_slice(&aes_block[..8]);
            out[(i - 1) * 8..i * 8].copy_from_slice(&aes_block[8..]);
            aes_block.fill(0);
        }
    }

    if bool::from(a[..].ct_eq(&KEY_WRAP_ICV.to_be_bytes()[..])) {
        Ok(())
    } else {
        out.fill(0);
        Err(BackupError::IntegrityCheck)
    }
}

/// Wrap `key_data` under `kek` into `out` (`out.len() == key_data.len() + 8`).
pub fn wrap_into(kek: &[u8], key_data: &[u8], out: &mut [u8]) -> Result<(), BackupError> {
    if out.len() != key_data.len() + KEY_WRAP_OVERHEAD {
        return Err(BackupError::Crypto(format!(
            "wrap output must be {} bytes for {} key bytes",
            key_data.len() + KEY_WRAP_OVERHEAD,
            key_data.len()
        )));
    }
    let n = semiblocks(key_data.len())?;
    let cipher = Kek::new(kek)?;

    let mut a = KEY_WRAP_ICV.to_be_bytes();
    out[8..].copy_from_slice(key_data);

    let mut block = Block16::new([0u8; 16]);
    for j in 0..6u64 {
        for i in 1..=n {
            let r = &mut out[i * 8..(i + 1) * 8];
            let buf = block.expose_secret_mut();
            buf[..8].copy_from_slice(&a);
            buf[8..].copy_from_slice(r);

            let mut aes_block = AesBlock::from(*buf);
            cipher.encrypt(&mut aes_block);

            let t = (n as u64) * j + i as u64;
            let mut msb = [0u8; 8];
            msb.copy_from_slice(&aes_block[..8]);
            a = (u64::from_be_bytes(msb) ^ t).to_be_bytes();
            r.copy_from_slice(&aes_block[8..]);
            aes_block.fill(0);
        }
    }
    out[..8].copy_from_slice(&a);
    Ok(())
}

/// Unwrap a 40-byte wrapped key into a fresh 32-byte secure key.
#[inline]
pub fn unwrap_key32(kek: &[u8], wrapped: &[u8]) -> Result<Aes256Key32, BackupError> {
    let mut key = Aes256Key32::new([0u8; 32]);
    unwrap_into(kek, wrapped, key.expose_secret_mut())?;
    Ok(key)
}

/// Wrap a 32-byte key into its 40-byte RFC 3394 form.
#[inline]
pub fn wrap_key32(kek: &[u8], key: &Aes256Key32) -> Result<WrappedKey40, BackupError> {
    let mut wrapped = WrappedKey40::new([0u8; 40]);
    wrap_into(kek, key.expose_secret(), wrapped.expose_secret_mut())?;
    Ok(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    // RFC 3394 §4.1: 128-bit key data with a 128-bit KEK
    #[test]
    fn rfc3394_128_bit_kek() {
        let kek = unhex("000102030405060708090A0B0C0D0E0F");
        let data = unhex("00112233445566778899AABBCCDDEEFF");
        let expected = unhex("1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5");

        let mut wrapped = vec![0u8; 24];
        wrap_into(&kek, &data, &mut wrapped).unwrap();
        assert_eq!(wrapped, expected);

        let mut unwrapped = vec![0u8; 16];
        unwrap_into(&kek, &wrapped, &mut unwrapped).unwrap();
        assert_eq!(unwrapped, data);
    }

    // RFC 3394 §4.6: 256-bit key data with a 256-bit KEK
    #[test]
    fn rfc3394_256_bit_kek_256_bit_data() {
        let kek = unhex("000102030405060708090A0B0C0D0E0F101112131415161718191A1B1C1D1E1F");
        let data = unhex("00112233445566778899AABBCCDDEEFF000102030405060708090A0B0C0D0E0F");
        let expected = unhex(
            "28C9F404C4B810F4CBCCB35CFB87F8263F5786E2D80ED326CBC7F0E71A99F43BFB988B9B7A02DD21",
        );

        let mut wrapped = vec![0u8; 40];
        wrap_into(&kek, &data, &mut wrapped).unwrap();
        assert_eq!(wrapped, expected);

        let key = unwrap_key32(&kek, &expected).unwrap();
        assert_eq!(key.expose_secret().as_slice(), data.as_slice());
    }

    #[test]
    fn tampered_wrap_fails_integrity() {
        let kek = [7u8; 32];
        let key = Aes256Key32::new([9u8; 32]);
        let wrapped = wrap_key32(&kek, &key).unwrap();

        let mut bad = *wrapped.expose_secret();
        bad[20] ^= 0x01;
        assert!(matches!(
            unwrap_key32(&kek, &bad),
            Err(BackupError::IntegrityCheck)
        ));

        let wrong_kek = [8u8; 32];
        assert!(matches!(
            unwrap_key32(&wrong_kek, wrapped.expose_secret()),
            Err(BackupError::IntegrityCheck)
        ));
    }

    #[test]
    fn length_preconditions() {
        let kek = [0u8; 32];
        let mut out = [0u8; 32];
        assert!(matches!(
            unwrap_into(&kek, &[0u8; 39], &mut out),
            Err(BackupError::Crypto(_))
        ));
        assert!(matches!(
            unwrap_into(&[0u8; 20], &[0u8; 40], &mut out),
            Err(BackupError::Crypto(_))
        ));
        let mut small = [0u8; 8];
        assert!(matches!(
            unwrap_into(&kek, &[0u8; 16], &mut small),
            Err(BackupError::Crypto(_))
        ));
    }
}
