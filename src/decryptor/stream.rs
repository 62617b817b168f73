//! src/decryptor/stream.rs
//! AES-256-CBC file decryption: zero IV, no padding scheme, exact-length output

use crate::aliases::{Aes256Key32, Block16, Iv16};
use crate::consts::{AES_BLOCK_SIZE, MAX_ZERO_FILL};
use crate::error::BackupError;
use crate::utils::{read_full, xor_blocks};
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes256Dec, Block as AesBlock};
use std::io::{self, BufReader, Read, Write};
use tracing::debug;

/// Decrypt one file's ciphertext from `input` into `output`.
///
/// The ciphertext is consumed one block at a time and must be block aligned.
/// With `declared_size` the output is exactly that long: block filler and any
/// stale bytes past it are dropped, and a size beyond the decrypted length is
/// zero-filled. A size more than [`MAX_ZERO_FILL`] bytes beyond it is a
/// [`BackupError::Crypto`] error. Without it every decrypted byte is written.
///
/// Returns the number of bytes written.
#[inline(always)]
pub fn decrypt_stream<R, W>(
    input: R,
    mut output: W,
    file_key: &Aes256Key32,
    declared_size: Option<u64>,
) -> Result<u64, BackupError>
where
    R: Read,
    W: Write,
{
    let cipher = Aes256Dec::new(file_key.expose_secret().into());
    let mut input = BufReader::new(input);

    // previous ciphertext block, starting from the all-zero IV
    let mut prev_block: [u8; AES_BLOCK_SIZE] = *Iv16::new([0u8; AES_BLOCK_SIZE]).expose_secret();

    let mut ciphertext_block = Block16::new([0u8; AES_BLOCK_SIZE]);
    let mut plaintext_block = Block16::new([0u8; AES_BLOCK_SIZE]);
    let mut decrypted: u64 = 0;
    let mut written: u64 = 0;

    loop {
        let n = read_full(&mut input, ciphertext_block.expose_secret_mut())?;
        if n == 0 {
            break;
        }
        if n < AES_BLOCK_SIZE {
            return Err(BackupError::Crypto(format!(
                "ciphertext ends with a partial block of {n} bytes after {decrypted} bytes"
            )));
        }

        let mut aes_block = AesBlock::from(*ciphertext_block.expose_secret());
        cipher.decrypt_block(&mut aes_block);
        xor_blocks(
            aes_block.as_slice(),
            &prev_block,
            plaintext_block.expose_secret_mut(),
        );
        aes_block.fill(0);
        prev_block = *ciphertext_block.expose_secret();
        decrypted += AES_BLOCK_SIZE as u64;

        let take = match declared_size {
            Some(limit) => limit.saturating_sub(written).min(AES_BLOCK_SIZE as u64) as usize,
            None => AES_BLOCK_SIZE,
        };
        if take > 0 {
            output.write_all(&plaintext_block.expose_secret()[..take])?;
            written += take as u64;
        }
    }

    if let Some(limit) = declared_size {
        if limit - written > MAX_ZERO_FILL {
            return Err(BackupError::Crypto(format!(
                "declared size {limit} is far beyond the {decrypted} decrypted bytes"
            )));
        }
        if written < limit {
            debug!(decrypted, declared = limit, "zero-filling past decrypted length");
            written += io::copy(&mut io::repeat(0).take(limit - written), &mut output)?;
        }
    }
    output.flush()?;

    debug!(decrypted, written, "file decrypted");
    Ok(written)
}
