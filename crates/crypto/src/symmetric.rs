//! Per-message symmetric key generation.
//!
//! Every outgoing message gets its own 256-bit key drawn from the OS CSPRNG.
//! Keys are wiped from memory on drop and have no persistence path.

use rand::rngs::OsRng;
use rand::TryRngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Strength of every message key, in bits.
pub const SYMMETRIC_KEY_BITS: usize = 256;
/// Length of every message key, in bytes.
pub const SYMMETRIC_KEY_LEN: usize = SYMMETRIC_KEY_BITS / 8;

/// A 32-byte AES-256 key that is securely zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; SYMMETRIC_KEY_LEN],
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SymmetricKey {
    /// Rebuild a key from raw bytes recovered by the key wrapper.
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; SYMMETRIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::Unwrap(format!(
                "recovered key is {} bytes, expected {SYMMETRIC_KEY_LEN}",
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    pub(crate) fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.key
    }
}

/// Generate a fresh random key of the requested strength.
///
/// Only [`SYMMETRIC_KEY_BITS`] is supported. An unavailable system RNG is
/// reported as `KeyGeneration` and never retried.
pub fn generate_key(bits: usize) -> Result<SymmetricKey, CryptoError> {
    if bits != SYMMETRIC_KEY_BITS {
        return Err(CryptoError::KeyGeneration(format!(
            "unsupported symmetric key strength {bits}, only {SYMMETRIC_KEY_BITS} is allowed"
        )));
    }
    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    fill_random(&mut key)?;
    Ok(SymmetricKey { key })
}

/// Fill `buf` from the OS CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::KeyGeneration(format!("system RNG unavailable: {e}")))
}
