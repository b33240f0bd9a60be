//! Master key for the encrypted key database.
//!
//! A 32-byte master key comes from the OS keychain (generated on first use)
//! or from a user passphrase via Argon2id. The SQLCipher key is derived from
//! it with HKDF-SHA256, so the master key itself never reaches SQLite.

use base64::Engine;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::CryptoConfig;
use crate::error::CryptoError;
use crate::symmetric::fill_random;

const DB_KEY_INFO: &[u8] = b"firechat-keystore-db-v1";
const MASTER_KEY_LEN: usize = 32;
/// Minimum passphrase salt length in bytes.
pub const MIN_SALT_LEN: usize = 16;

/// A 32-byte master key, securely wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_LEN],
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl MasterKey {
    /// Retrieve the master key from the OS keychain entry named in `config`,
    /// generating and storing a random one on first use.
    pub fn from_keychain(config: &CryptoConfig) -> Result<Self, CryptoError> {
        let entry = keyring::Entry::new(&config.keychain_service, &config.keychain_account)
            .map_err(|_| CryptoError::KeychainUnavailable)?;
        let master = Self::from_entry(&entry)?;
        tracing::debug!(service = %config.keychain_service, "loaded key database master key");
        Ok(master)
    }

    fn from_entry(entry: &keyring::Entry) -> Result<Self, CryptoError> {
        match entry.get_password() {
            Ok(stored) => {
                let stored = Zeroizing::new(stored);
                let bytes = Zeroizing::new(
                    base64::engine::general_purpose::STANDARD
                        .decode(stored.as_bytes())
                        .map_err(|_| malformed_entry())?,
                );
                let key: [u8; MASTER_KEY_LEN] =
                    bytes.as_slice().try_into().map_err(|_| malformed_entry())?;
                Ok(Self { key })
            }
            Err(keyring::Error::NoEntry) => {
                let master = Self::generate()?;
                let encoded =
                    Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(master.key));
                entry.set_password(&encoded)?;
                tracing::info!("stored new key database master key in keychain");
                Ok(master)
            }
            Err(e) => Err(CryptoError::from(e)),
        }
    }

    /// Derive a master key from a user passphrase and salt via Argon2id.
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        if salt.len() < MIN_SALT_LEN {
            return Err(CryptoError::InvalidKey("salt too short".into()));
        }

        let params = argon2::Params::new(65536, 3, 4, Some(MASTER_KEY_LEN))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let argon2 =
            argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; MASTER_KEY_LEN];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// A random master key for databases that live only as long as the process.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut key = [0u8; MASTER_KEY_LEN];
        fill_random(&mut key)?;
        Ok(Self { key })
    }

    /// Derive the SQLCipher raw key for this master key.
    pub fn derive_db_key(&self) -> Result<DbEncryptionKey, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, &self.key);
        let mut okm = Zeroizing::new([0u8; 32]);
        hk.expand(DB_KEY_INFO, &mut okm[..])
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let mut pragma = String::with_capacity(3 + okm.len() * 2);
        pragma.push_str("x'");
        for byte in okm.iter() {
            pragma.push(hex_digit(byte >> 4));
            pragma.push(hex_digit(byte & 0x0F));
        }
        pragma.push('\'');
        Ok(DbEncryptionKey { pragma })
    }
}

fn malformed_entry() -> CryptoError {
    CryptoError::Keychain("malformed master key in keychain".into())
}

fn hex_digit(nibble: u8) -> char {
    char::from_digit(u32::from(nibble), 16).unwrap_or('0')
}

/// Generate a random salt for passphrase derivation.
pub fn generate_salt() -> Result<[u8; MIN_SALT_LEN], CryptoError> {
    let mut salt = [0u8; MIN_SALT_LEN];
    fill_random(&mut salt)?;
    Ok(salt)
}

/// SQLCipher raw key literal (`x'<64 hex>'`) for `PRAGMA key`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DbEncryptionKey {
    pragma: String,
}

impl std::fmt::Debug for DbEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbEncryptionKey")
            .field("pragma", &"[REDACTED]")
            .finish()
    }
}

impl DbEncryptionKey {
    pub fn as_pragma_value(&self) -> &str {
        &self.pragma
    }
}

/// Key a fresh connection and check that it can read the database.
///
/// The raw-key literal is embedded in SQL rather than bound: SQLCipher treats
/// a bound value as a passphrase and runs PBKDF2 over it.
pub fn apply_encryption_key(
    conn: &rusqlite::Connection,
    db_key: &DbEncryptionKey,
) -> Result<(), CryptoError> {
    let statement = Zeroizing::new(format!("PRAGMA key = \"{}\";", db_key.as_pragma_value()));
    conn.execute_batch(&statement)?;

    let cipher_version: String = conn
        .pragma_query_value(None, "cipher_version", |row| row.get(0))
        .map_err(|_| CryptoError::Storage("SQLCipher not available".into()))?;
    if cipher_version.is_empty() {
        return Err(CryptoError::Storage("SQLCipher not available".into()));
    }

    // First read fails here if the key does not match the file.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(|_| CryptoError::Storage("key database could not be unlocked".into()))?;
    Ok(())
}
