//! Error types for the firechat-crypto crate.

use std::fmt;

use thiserror::Error;

/// Which part of an envelope failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeField {
    WrappedKey,
    Ciphertext,
    Nonce,
    /// The decrypted plaintext (UTF-8 validation).
    Body,
}

impl fmt::Display for EnvelopeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvelopeField::WrappedKey => "wrapped key",
            EnvelopeField::Ciphertext => "ciphertext",
            EnvelopeField::Nonce => "nonce",
            EnvelopeField::Body => "message body",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The RNG or the key store could not produce key material.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// A key pair is missing or was deleted (local private key or a
    /// recipient's public key).
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// Wrapping the symmetric key for a recipient failed.
    #[error("key wrap failed: {0}")]
    Wrap(String),

    /// Recovering the symmetric key failed (wrong key, padding, tampering).
    #[error("key unwrap failed: {0}")]
    Unwrap(String),

    /// Symmetric encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The authentication tag did not verify. The ciphertext was tampered
    /// with, corrupted, or encrypted under a different key or nonce.
    #[error("authentication failure: ciphertext rejected")]
    AuthenticationFailure,

    /// An envelope field was not valid base64, had the wrong length, or the
    /// decrypted body was not UTF-8.
    #[error("decoding failed for {field}: {detail}")]
    Decoding { field: EnvelopeField, detail: String },

    /// The provided key material is invalid (wrong encoding, too small, etc.).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Key database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// OS keychain operation failed.
    #[error("keychain error: {0}")]
    Keychain(String),

    /// No credential found in OS keychain for the requested entry.
    #[error("keychain entry not found")]
    KeychainEntryNotFound,

    /// OS keychain is not available on this platform.
    #[error("keychain unavailable")]
    KeychainUnavailable,

    /// Configuration could not be parsed or is out of range.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CryptoError {
    pub(crate) fn decoding(field: EnvelopeField, detail: impl fmt::Display) -> Self {
        CryptoError::Decoding {
            field,
            detail: detail.to_string(),
        }
    }
}

impl From<rusqlite::Error> for CryptoError {
    fn from(err: rusqlite::Error) -> Self {
        CryptoError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for CryptoError {
    fn from(err: toml::de::Error) -> Self {
        CryptoError::Config(err.to_string())
    }
}

impl From<CryptoError> for firechat_shared::error::FireChatError {
    fn from(err: CryptoError) -> Self {
        firechat_shared::error::FireChatError::Crypto(err.to_string())
    }
}

impl From<keyring::Error> for CryptoError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => CryptoError::KeychainEntryNotFound,
            keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
                CryptoError::KeychainUnavailable
            }
            other => CryptoError::Keychain(other.to_string()),
        }
    }
}
