use std::sync::{Mutex, PoisonError};

use crate::config::CryptoConfig;
use crate::error::CryptoError;
use crate::keystore::{KeyPairStatus, KeyStore};
use crate::wrap::{generate_key_pair, PrivateKeyHandle, PublicKey};

/// Process-local key store. The key pair lives only as long as the store.
pub struct MemoryKeyStore {
    config: CryptoConfig,
    slot: Mutex<Option<PrivateKeyHandle>>,
}

impl MemoryKeyStore {
    pub fn new(config: CryptoConfig) -> Result<Self, CryptoError> {
        config.validate()?;
        Ok(Self {
            config,
            slot: Mutex::new(None),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_handle(handle: PrivateKeyHandle) -> Self {
        Self {
            config: CryptoConfig::default(),
            slot: Mutex::new(Some(handle)),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn alias(&self) -> &str {
        &self.config.key_alias
    }

    fn generate_key_pair(&self) -> Result<KeyPairStatus, CryptoError> {
        // Held across generation so concurrent callers cannot both create.
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            tracing::debug!(alias = %self.config.key_alias, "key pair already present");
            return Ok(KeyPairStatus::AlreadyPresent);
        }
        *slot = Some(generate_key_pair(self.config.rsa_key_bits)?);
        tracing::info!(
            alias = %self.config.key_alias,
            bits = self.config.rsa_key_bits,
            "generated identity key pair"
        );
        Ok(KeyPairStatus::Created)
    }

    fn public_key(&self) -> Result<Option<PublicKey>, CryptoError> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.as_ref().map(|handle| handle.public_key().clone()))
    }

    fn private_key(&self) -> Result<Option<PrivateKeyHandle>, CryptoError> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.clone())
    }

    fn delete_key_pair(&self) -> Result<(), CryptoError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.revoke();
            tracing::info!(alias = %self.config.key_alias, "deleted identity key pair");
        }
        Ok(())
    }
}
