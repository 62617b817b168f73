//! src/crypto/kdf/pbkdf2.rs
//! Two-stage PBKDF2 chain: out-param, zero-exposure, secure-gate throughout

use crate::aliases::{Aes256Key32, HmacSha1, HmacSha256, PasscodeString};
use crate::consts::KDF_OUTPUT_LENGTH;
use crate::error::BackupError;

use pbkdf2::pbkdf2;
use tracing::debug;

/// Salts and iteration counts for both KDF stages, copied verbatim from the key bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Stage-1 salt (`DPSL`).
    pub passcode_salt: Vec<u8>,
    /// Stage-1 iteration count (`DPIC`).
    pub passcode_iterations: u32,
    /// Stage-2 salt (`SALT`).
    pub salt: Vec<u8>,
    /// Stage-2 iteration count (`ITER`).
    pub iterations: u32,
}

/// Stage 1: PBKDF2-HMAC-SHA256 over the UTF-8 passcode into `out_key`.
#[inline]
pub fn derive_intermediate_key(
    passcode: &PasscodeString,
    salt: &[u8],
    iterations: u32,
    out_key: &mut Aes256Key32,
) -> Result<(), BackupError> {
    pbkdf2_into::<HmacSha256>(
        passcode.expose_secret().as_bytes(),
        salt,
        iterations,
        out_key.expose_secret_mut(),
    )
}

/// Stage 2: PBKDF2-HMAC-SHA1 keyed by the stage-1 output into `out_key`.
#[inline]
pub fn derive_kek_from_intermediate(
    intermediate: &Aes256Key32,
    salt: &[u8],
    iterations: u32,
    out_key: &mut Aes256Key32,
) -> Result<(), BackupError> {
    pbkdf2_into::<HmacSha1>(
        intermediate.expose_secret(),
        salt,
        iterations,
        out_key.expose_secret_mut(),
    )
}

/// Run both stages and return the key-encryption key.
///
/// The intermediate key lives in a secure buffer and is wiped when this returns.
pub fn derive_key_encryption_key(
    passcode: &PasscodeString,
    params: &KdfParams,
) -> Result<Aes256Key32, BackupError> {
    debug!(
        passcode_iterations = params.passcode_iterations,
        iterations = params.iterations,
        "deriving key-encryption key"
    );

    let mut intermediate = Aes256Key32::new([0u8; KDF_OUTPUT_LENGTH]);
    derive_intermediate_key(
        passcode,
        &params.passcode_salt,
        params.passcode_iterations,
        &mut intermediate,
    )?;

    let mut kek = Aes256Key32::new([0u8; KDF_OUTPUT_LENGTH]);
    derive_kek_from_intermediate(&intermediate, &params.salt, params.iterations, &mut kek)?;
    Ok(kek)
}

fn pbkdf2_into<PRF>(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    out: &mut [u8],
) -> Result<(), BackupError>
where
    PRF: hmac::digest::KeyInit
        + hmac::digest::Update
        + hmac::digest::FixedOutput
        + Clone
        + Sync,
{
    if iterations == 0 {
        return Err(BackupError::Crypto("PBKDF2 iterations must be at least 1".into()));
    }

    pbkdf2::<PRF>(password, salt, iterations, out)
        .map_err(|e| BackupError::Crypto(format!("PBKDF2 failed: {e}")))
}
