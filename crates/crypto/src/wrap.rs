//! Asymmetric wrapping of message keys with RSA-OAEP (SHA-256).
//!
//! The identity key pair lives behind [`PrivateKeyHandle`], an opaque
//! capability shared with the key store that owns it. Unwrapping holds the
//! handle's read lock for the whole RSA operation; deleting the key pair
//! takes the write lock and clears the slot, so a deletion never races an
//! in-flight decrypt and later decrypts see `KeyUnavailable`.

use std::sync::{Arc, PoisonError, RwLock};

use base64::Engine;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::{MAX_RSA_KEY_BITS, MIN_RSA_KEY_BITS};
use crate::error::CryptoError;
use crate::symmetric::SymmetricKey;

const OAEP_HASH_LEN: usize = 32; // SHA-256 output

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

/// A peer's (or our own) public key, shareable as X.509 SubjectPublicKeyInfo.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .finish()
    }
}

impl PublicKey {
    fn new(inner: RsaPublicKey) -> Result<Self, CryptoError> {
        let bits = inner.n().bits();
        if bits < MIN_RSA_KEY_BITS {
            return Err(CryptoError::InvalidKey(format!(
                "{bits}-bit public key is below the {MIN_RSA_KEY_BITS}-bit minimum"
            )));
        }
        Ok(Self { inner })
    }

    /// Decode a DER SubjectPublicKeyInfo, as fetched from the user directory.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        let inner = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::InvalidKey(format!("malformed public key: {e}")))?;
        Self::new(inner)
    }

    /// Decode a base64 DER SubjectPublicKeyInfo.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let der = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidKey(format!("public key is not base64: {e}")))?;
        Self::from_spki_der(&der)
    }

    /// Encode as DER SubjectPublicKeyInfo.
    pub fn to_spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        let doc = self
            .inner
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// Encode as base64 DER SubjectPublicKeyInfo, the form uploaded for peers.
    pub fn to_base64(&self) -> Result<String, CryptoError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_spki_der()?))
    }

    /// Significant bits of the modulus.
    pub fn bits(&self) -> usize {
        self.inner.n().bits()
    }

    /// Largest payload OAEP-SHA-256 can wrap under this key.
    pub fn max_wrap_payload(&self) -> usize {
        self.inner.size() - 2 * OAEP_HASH_LEN - 2
    }
}

struct KeySlot {
    key: RwLock<Option<RsaPrivateKey>>,
    public: PublicKey,
}

/// Opaque capability to decrypt with the local identity's private key.
///
/// Clones share one slot. There is no accessor for the key bytes; the only
/// operation is [`unwrap`].
#[derive(Clone)]
pub struct PrivateKeyHandle {
    slot: Arc<KeySlot>,
}

impl std::fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyHandle")
            .field("key", &"[REDACTED]")
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

impl PrivateKeyHandle {
    pub(crate) fn new(key: RsaPrivateKey) -> Result<Self, CryptoError> {
        let public = PublicKey::new(key.to_public_key())?;
        Ok(Self {
            slot: Arc::new(KeySlot {
                key: RwLock::new(Some(key)),
                public,
            }),
        })
    }

    pub(crate) fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::InvalidKey(format!("malformed private key: {e}")))?;
        Self::new(key)
    }

    pub(crate) fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.with_key(|key| {
            let doc = key
                .to_pkcs8_der()
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            Ok(Zeroizing::new(doc.as_bytes().to_vec()))
        })
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> &PublicKey {
        &self.slot.public
    }

    /// Whether the owning key pair has been deleted.
    pub fn is_revoked(&self) -> bool {
        self.slot
            .key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Drop the private key for every clone of this handle. Waits for
    /// in-flight operations holding the read lock.
    pub(crate) fn revoke(&self) {
        self.slot
            .key
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn with_key<T>(
        &self,
        op: impl FnOnce(&RsaPrivateKey) -> Result<T, CryptoError>,
    ) -> Result<T, CryptoError> {
        let guard = self.slot.key.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(key) => op(key),
            None => Err(CryptoError::KeyUnavailable(
                "private key was deleted".into(),
            )),
        }
    }
}

/// Generate a fresh RSA identity key pair of `bits` modulus size.
pub fn generate_key_pair(bits: usize) -> Result<PrivateKeyHandle, CryptoError> {
    if !(MIN_RSA_KEY_BITS..=MAX_RSA_KEY_BITS).contains(&bits) {
        return Err(CryptoError::KeyGeneration(format!(
            "unsupported RSA key size {bits}"
        )));
    }
    let key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    PrivateKeyHandle::new(key)
}

/// Encrypt raw symmetric key bytes for `recipient`.
pub fn wrap(symmetric_key: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    if symmetric_key.is_empty() {
        return Err(CryptoError::Wrap("refusing to wrap an empty key".into()));
    }
    let limit = recipient.max_wrap_payload();
    if symmetric_key.len() > limit {
        return Err(CryptoError::Wrap(format!(
            "payload of {} bytes exceeds the {limit}-byte OAEP limit",
            symmetric_key.len()
        )));
    }
    recipient
        .inner
        .encrypt(&mut OsRng, oaep(), symmetric_key)
        .map_err(|e| CryptoError::Wrap(e.to_string()))
}

/// Recover a symmetric key wrapped for the holder of `own_key`.
pub fn unwrap(wrapped: &[u8], own_key: &PrivateKeyHandle) -> Result<SymmetricKey, CryptoError> {
    own_key.with_key(|key| {
        if wrapped.len() != key.size() {
            return Err(CryptoError::Unwrap(format!(
                "wrapped key is {} bytes, expected {}",
                wrapped.len(),
                key.size()
            )));
        }
        // Padding failures carry no detail about their cause.
        let bytes = Zeroizing::new(
            key.decrypt(oaep(), wrapped)
                .map_err(|_| CryptoError::Unwrap("OAEP decoding failed".into()))?,
        );
        SymmetricKey::from_slice(&bytes)
    })
}
