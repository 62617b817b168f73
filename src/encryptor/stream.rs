//! src/encryptor/stream.rs
//! AES-256-CBC file encryption: zero IV, final partial block zero-filled

use crate::aliases::{Aes256Key32, Block16, Iv16};
use crate::consts::AES_BLOCK_SIZE;
use crate::error::BackupError;
use crate::utils::{read_full, xor_blocks};
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256Enc, Block as AesBlock};
use std::io::{Read, Write};

/// Encrypt `source` into `destination` under `file_key`.
///
/// No padding block is added: a plaintext that is already block aligned
/// produces ciphertext of the same length. The true length must be recorded
/// separately and passed back as the declared size on decrypt.
///
/// Returns the number of plaintext bytes consumed.
#[inline(always)]
pub fn encrypt_stream<R, W>(
    mut source: R,
    mut destination: W,
    file_key: &Aes256Key32,
) -> Result<u64, BackupError>
where
    R: Read,
    W: Write,
{
    let cipher = Aes256Enc::new(file_key.expose_secret().into());

    // previous ciphertext block, starting from the all-zero IV
    let mut prev_block: [u8; AES_BLOCK_SIZE] = *Iv16::new([0u8; AES_BLOCK_SIZE]).expose_secret();

    let mut plaintext_block = Block16::new([0u8; AES_BLOCK_SIZE]);
    let mut xor_output = Block16::new([0u8; AES_BLOCK_SIZE]);
    let mut consumed: u64 = 0;

    loop {
        let n = read_full(&mut source, plaintext_block.expose_secret_mut())?;
        if n == 0 {
            break;
        }
        consumed += n as u64;
        plaintext_block.expose_secret_mut()[n..].fill(0);

        xor_blocks(
            plaintext_block.expose_secret(),
            &prev_block,
            xor_output.expose_secret_mut(),
        );

        let mut aes_block = AesBlock::from(*xor_output.expose_secret());
        cipher.encrypt_block(&mut aes_block);
        prev_block.copy_from_slice(aes_block.as_slice());
        destination.write_all(&prev_block)?;

        if n < AES_BLOCK_SIZE {
            break;
        }
    }

    destination.flush()?;
    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_input_adds_no_block() {
        let key = Aes256Key32::new([0x01; 32]);
        let mut out = Vec::new();
        assert_eq!(encrypt_stream(&[0u8; 48][..], &mut out, &key).unwrap(), 48);
        assert_eq!(out.len(), 48);
    }

    #[test]
    fn partial_block_rounds_up() {
        let key = Aes256Key32::new([0x01; 32]);
        let mut out = Vec::new();
        assert_eq!(encrypt_stream(&[7u8; 33][..], &mut out, &key).unwrap(), 33);
        assert_eq!(out.len(), 48);
    }

    #[test]
    fn chaining_hides_repeated_blocks() {
        let key = Aes256Key32::new([0x01; 32]);
        let mut out = Vec::new();
        encrypt_stream(&[0x55u8; 32][..], &mut out, &key).unwrap();
        assert_ne!(out[..16], out[16..]);
    }
}
