//! firechat-crypto: hybrid message encryption for FireChat.
//!
//! Each message body is sealed with a fresh AES-256-GCM key, and that key is
//! wrapped with the recipient's RSA-OAEP (SHA-256) public key. Identity key
//! pairs live in an injected [`keystore::KeyStore`], either in memory or in
//! an encrypted SQLite (SQLCipher) database.

pub mod chat;
pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod keystore;
pub mod master_key;
pub mod storage;
pub mod symmetric;
pub mod transport;
pub mod wrap;

#[cfg(test)]
mod test_support;

pub use envelope::{decrypt_message, encrypt_message, Envelope};
pub use error::CryptoError;
pub use wrap::{PrivateKeyHandle, PublicKey};
