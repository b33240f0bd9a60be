use serde::Deserialize;

use crate::error::CryptoError;

/// Smallest RSA modulus accepted for identity keys, in bits.
pub const MIN_RSA_KEY_BITS: usize = 2048;
/// Largest RSA modulus accepted for identity keys, in bits.
pub const MAX_RSA_KEY_BITS: usize = 8192;

/// Key management settings for one installed identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CryptoConfig {
    /// Identity-scoped alias the key pair is stored under. Default: "chat_app_key"
    #[serde(default = "default_key_alias")]
    pub key_alias: String,
    /// RSA modulus size for newly generated key pairs. Default: 2048
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,
    /// OS keychain service holding the key database master key.
    /// Default: "com.firechat.keystore"
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,
    /// OS keychain account holding the key database master key.
    /// Default: "master_key"
    #[serde(default = "default_keychain_account")]
    pub keychain_account: String,
}

fn default_key_alias() -> String {
    "chat_app_key".to_string()
}
fn default_rsa_key_bits() -> usize {
    MIN_RSA_KEY_BITS
}
fn default_keychain_service() -> String {
    "com.firechat.keystore".to_string()
}
fn default_keychain_account() -> String {
    "master_key".to_string()
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_alias: default_key_alias(),
            rsa_key_bits: default_rsa_key_bits(),
            keychain_service: default_keychain_service(),
            keychain_account: default_keychain_account(),
        }
    }
}

impl CryptoConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, CryptoError> {
        let config: CryptoConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Same settings with a different key alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = alias.into();
        self
    }

    /// Reject settings that would weaken or break key management.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.key_alias.trim().is_empty() {
            return Err(CryptoError::Config("key_alias must not be empty".into()));
        }
        if self.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(CryptoError::Config(format!(
                "rsa_key_bits must be at least {MIN_RSA_KEY_BITS}, got {}",
                self.rsa_key_bits
            )));
        }
        if self.rsa_key_bits > MAX_RSA_KEY_BITS || self.rsa_key_bits % 8 != 0 {
            return Err(CryptoError::Config(format!(
                "rsa_key_bits must be a multiple of 8 no larger than {MAX_RSA_KEY_BITS}, got {}",
                self.rsa_key_bits
            )));
        }
        if self.keychain_service.is_empty() || self.keychain_account.is_empty() {
            return Err(CryptoError::Config(
                "keychain service and account must not be empty".into(),
            ));
        }
        Ok(())
    }
}
