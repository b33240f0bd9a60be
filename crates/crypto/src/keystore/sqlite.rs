//! Key store persisted in a SQLCipher database keyed from a [`MasterKey`].

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::Connection;

use crate::config::CryptoConfig;
use crate::error::CryptoError;
use crate::keystore::{KeyPairStatus, KeyStore};
use crate::master_key::{apply_encryption_key, MasterKey};
use crate::storage::{migrations, with_transaction, KeyDb, StoredKeyPair};
use crate::wrap::{generate_key_pair, PrivateKeyHandle, PublicKey};

struct State {
    conn: Connection,
    /// Every handle this store hands out is a clone of this one, so revoking
    /// it on delete reaches all of them.
    loaded: Option<PrivateKeyHandle>,
}

pub struct SqliteKeyStore {
    config: CryptoConfig,
    state: Mutex<State>,
}

impl SqliteKeyStore {
    /// Open (or create) the key database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        master_key: &MasterKey,
        config: CryptoConfig,
    ) -> Result<Self, CryptoError> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn, master_key, config)
    }

    /// Open a key database that lives only as long as the store.
    pub fn open_in_memory(master_key: &MasterKey, config: CryptoConfig) -> Result<Self, CryptoError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, master_key, config)
    }

    fn from_connection(
        conn: Connection,
        master_key: &MasterKey,
        config: CryptoConfig,
    ) -> Result<Self, CryptoError> {
        config.validate()?;
        let db_key = master_key.derive_db_key()?;
        apply_encryption_key(&conn, &db_key)?;
        migrations::run_keystore_migrations(&conn)?;
        Ok(Self {
            config,
            state: Mutex::new(State { conn, loaded: None }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyStore for SqliteKeyStore {
    fn alias(&self) -> &str {
        &self.config.key_alias
    }

    fn generate_key_pair(&self) -> Result<KeyPairStatus, CryptoError> {
        let mut state = self.lock();
        let alias = self.config.key_alias.as_str();

        if KeyDb::new(&state.conn).get_public_key(alias)?.is_some() {
            tracing::debug!(alias, "key pair already present");
            return Ok(KeyPairStatus::AlreadyPresent);
        }

        let handle = generate_key_pair(self.config.rsa_key_bits)?;
        let stored = StoredKeyPair {
            public_key: handle.public_key().to_spki_der()?,
            private_key: handle.to_pkcs8_der()?,
            key_bits: self.config.rsa_key_bits as u32,
            created_at: chrono::Utc::now().timestamp(),
        };
        with_transaction(&state.conn, |db| db.insert_key_pair(alias, &stored))?;
        state.loaded = Some(handle);

        tracing::info!(alias, bits = self.config.rsa_key_bits, "generated identity key pair");
        Ok(KeyPairStatus::Created)
    }

    fn public_key(&self) -> Result<Option<PublicKey>, CryptoError> {
        let state = self.lock();
        KeyDb::new(&state.conn)
            .get_public_key(&self.config.key_alias)?
            .map(|der| PublicKey::from_spki_der(&der))
            .transpose()
    }

    fn private_key(&self) -> Result<Option<PrivateKeyHandle>, CryptoError> {
        let mut state = self.lock();
        if let Some(handle) = &state.loaded {
            return Ok(Some(handle.clone()));
        }

        let Some(stored) = KeyDb::new(&state.conn).get_key_pair(&self.config.key_alias)? else {
            return Ok(None);
        };
        let handle = PrivateKeyHandle::from_pkcs8_der(&stored.private_key)?;
        state.loaded = Some(handle.clone());
        Ok(Some(handle))
    }

    fn delete_key_pair(&self) -> Result<(), CryptoError> {
        let mut state = self.lock();
        if let Some(handle) = state.loaded.take() {
            handle.revoke();
        }
        let removed = KeyDb::new(&state.conn).delete_key_pair(&self.config.key_alias)?;
        if removed {
            tracing::info!(alias = %self.config.key_alias, "deleted identity key pair");
        }
        Ok(())
    }
}
