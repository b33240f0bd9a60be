//! Identity key pair storage.
//!
//! The codec never reaches for a global key store: callers inject a
//! [`KeyStore`] and pass the handles it returns into `decrypt_message`.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryKeyStore;
pub use sqlite::SqliteKeyStore;

use crate::error::CryptoError;
use crate::wrap::{PrivateKeyHandle, PublicKey};

/// Outcome of [`KeyStore::generate_key_pair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPairStatus {
    /// No key pair existed; a new one was generated and stored.
    Created,
    /// A key pair already existed and was left untouched.
    AlreadyPresent,
}

/// Holds one identity's long-lived key pair under a fixed alias.
pub trait KeyStore: Send + Sync {
    /// Alias the key pair lives under.
    fn alias(&self) -> &str;

    /// Ensure a key pair exists. An existing pair is never overwritten; it
    /// has to be removed with [`KeyStore::delete_key_pair`] first.
    fn generate_key_pair(&self) -> Result<KeyPairStatus, CryptoError>;

    /// Public half, for publishing to peers.
    fn public_key(&self) -> Result<Option<PublicKey>, CryptoError>;

    /// Handle to the private half, usable only for unwrapping.
    fn private_key(&self) -> Result<Option<PrivateKeyHandle>, CryptoError>;

    /// Irreversibly remove the key pair and revoke every handle handed out
    /// for it. Removing an absent key pair is a no-op.
    fn delete_key_pair(&self) -> Result<(), CryptoError>;

    /// Like [`KeyStore::private_key`] but missing keys are an error.
    fn require_private_key(&self) -> Result<PrivateKeyHandle, CryptoError> {
        self.private_key()?.ok_or_else(|| {
            CryptoError::KeyUnavailable(format!("no key pair under alias {}", self.alias()))
        })
    }

    /// Like [`KeyStore::public_key`] but missing keys are an error.
    fn require_public_key(&self) -> Result<PublicKey, CryptoError> {
        self.public_key()?.ok_or_else(|| {
            CryptoError::KeyUnavailable(format!("no key pair under alias {}", self.alias()))
        })
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share.

    use super::*;
    use crate::envelope::{decrypt_message, encrypt_message};

    pub(crate) fn generate_is_idempotent(store: &dyn KeyStore) {
        assert_eq!(store.generate_key_pair().unwrap(), KeyPairStatus::Created);
        let public = store.require_public_key().unwrap();
        let envelope = encrypt_message("before regeneration", &public).unwrap();

        assert_eq!(
            store.generate_key_pair().unwrap(),
            KeyPairStatus::AlreadyPresent
        );
        assert_eq!(store.require_public_key().unwrap(), public);
        let handle = store.require_private_key().unwrap();
        assert_eq!(
            decrypt_message(&envelope, &handle).unwrap(),
            "before regeneration"
        );
    }

    pub(crate) fn empty_store_has_no_keys(store: &dyn KeyStore) {
        assert!(store.public_key().unwrap().is_none());
        assert!(store.private_key().unwrap().is_none());
        assert!(matches!(
            store.require_private_key(),
            Err(CryptoError::KeyUnavailable(_))
        ));
        store.delete_key_pair().unwrap();
    }

    pub(crate) fn delete_revokes_handles(store: &dyn KeyStore) {
        store.generate_key_pair().unwrap();
        let public = store.require_public_key().unwrap();
        let envelope = encrypt_message("gone soon", &public).unwrap();
        let handle = store.require_private_key().unwrap();

        store.delete_key_pair().unwrap();

        assert!(handle.is_revoked());
        assert!(matches!(
            decrypt_message(&envelope, &handle),
            Err(CryptoError::KeyUnavailable(_))
        ));
        assert!(store.private_key().unwrap().is_none());
        assert!(store.public_key().unwrap().is_none());
    }

    pub(crate) fn regenerate_after_delete_gives_new_pair(store: &dyn KeyStore) {
        store.generate_key_pair().unwrap();
        let first = store.require_public_key().unwrap();
        store.delete_key_pair().unwrap();
        assert_eq!(store.generate_key_pair().unwrap(), KeyPairStatus::Created);
        assert_ne!(store.require_public_key().unwrap(), first);
    }
}
