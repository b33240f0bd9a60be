//! Safety number (fingerprint) generation for out-of-band identity verification.
//!
//! Each party's half is an iterated SHA-256 over their SPKI public key and
//! user id, truncated to 30 bytes and rendered as 30 digits. The two halves
//! are ordered before joining so both users see the same 60-digit number.

use firechat_shared::ids::UserId;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;
use crate::wrap::PublicKey;

const FINGERPRINT_VERSION: u16 = 1;
const FINGERPRINT_ITERATIONS: u32 = 5200;
/// Bytes of each party's digest that feed the display and scannable forms.
const HALF_LEN: usize = 30;
const CHUNK_LEN: usize = 5;
const CHUNK_MODULUS: u64 = 100_000;

/// A safety number in human-readable and machine-comparable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// 60 digits as 12 space-separated groups of 5.
    pub display: String,
    /// Both truncated digests, ordered, for QR encoding. Compare with
    /// [`compare_fingerprints`].
    pub scannable: Vec<u8>,
}

/// Generate the safety number shared by `local` and `remote`. Swapping the
/// arguments yields the same result.
pub fn generate_fingerprint(
    local_key: &PublicKey,
    local_user: UserId,
    remote_key: &PublicKey,
    remote_user: UserId,
) -> Result<Fingerprint, CryptoError> {
    let local = half_digest(local_key, local_user)?;
    let remote = half_digest(remote_key, remote_user)?;
    let (first, second) = if local <= remote {
        (local, remote)
    } else {
        (remote, local)
    };

    let groups: Vec<String> = first
        .chunks(CHUNK_LEN)
        .chain(second.chunks(CHUNK_LEN))
        .map(encode_chunk)
        .collect();

    let mut scannable = Vec::with_capacity(HALF_LEN * 2);
    scannable.extend_from_slice(&first);
    scannable.extend_from_slice(&second);

    Ok(Fingerprint {
        display: groups.join(" "),
        scannable,
    })
}

/// Compare a local fingerprint against scanned QR data in constant time.
pub fn compare_fingerprints(local: &Fingerprint, scanned: &[u8]) -> bool {
    local.scannable.len() == scanned.len() && bool::from(local.scannable.ct_eq(scanned))
}

fn half_digest(key: &PublicKey, user: UserId) -> Result<[u8; HALF_LEN], CryptoError> {
    let spki = key.to_spki_der()?;

    let mut hash = Sha256::new()
        .chain_update(FINGERPRINT_VERSION.to_be_bytes())
        .chain_update(&spki)
        .chain_update(user.0.as_bytes())
        .finalize();
    for _ in 1..FINGERPRINT_ITERATIONS {
        hash = Sha256::new().chain_update(hash).chain_update(&spki).finalize();
    }

    let mut half = [0u8; HALF_LEN];
    half.copy_from_slice(&hash[..HALF_LEN]);
    Ok(half)
}

fn encode_chunk(chunk: &[u8]) -> String {
    let value = chunk
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
    format!("{:05}", value % CHUNK_MODULUS)
}
