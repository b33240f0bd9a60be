//! Encrypted key database (SQLCipher) backing `SqliteKeyStore`.

pub mod migrations;

use rusqlite::{Connection, OptionalExtension};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Stored form of one identity key pair.
pub struct StoredKeyPair {
    /// DER SubjectPublicKeyInfo.
    pub public_key: Vec<u8>,
    /// DER PKCS#8, wiped on drop.
    pub private_key: Zeroizing<Vec<u8>>,
    pub key_bits: u32,
    pub created_at: i64,
}

/// Typed queries over a connection that already has its key applied and
/// migrations run.
pub struct KeyDb<'a> {
    conn: &'a Connection,
}

impl<'a> KeyDb<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a key pair under `alias`. Fails if the alias is taken; key
    /// pairs are never overwritten in place.
    pub fn insert_key_pair(&self, alias: &str, pair: &StoredKeyPair) -> Result<(), CryptoError> {
        self.conn.execute(
            "INSERT INTO identity_key_pairs (alias, public_key, private_key, key_bits, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                alias,
                pair.public_key,
                pair.private_key.as_slice(),
                pair.key_bits,
                pair.created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_key_pair(&self, alias: &str) -> Result<Option<StoredKeyPair>, CryptoError> {
        let row = self
            .conn
            .query_row(
                "SELECT public_key, private_key, key_bits, created_at
                 FROM identity_key_pairs WHERE alias = ?1",
                [alias],
                |row| {
                    Ok(StoredKeyPair {
                        public_key: row.get(0)?,
                        private_key: Zeroizing::new(row.get(1)?),
                        key_bits: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_public_key(&self, alias: &str) -> Result<Option<Vec<u8>>, CryptoError> {
        let row = self
            .conn
            .query_row(
                "SELECT public_key FROM identity_key_pairs WHERE alias = ?1",
                [alias],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    /// Returns whether a row was removed.
    pub fn delete_key_pair(&self, alias: &str) -> Result<bool, CryptoError> {
        let removed = self
            .conn
            .execute("DELETE FROM identity_key_pairs WHERE alias = ?1", [alias])?;
        Ok(removed > 0)
    }
}

/// Run `f` inside a transaction, committing only if it succeeds.
pub fn with_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&KeyDb<'_>) -> Result<T, CryptoError>,
) -> Result<T, CryptoError> {
    let tx = conn.unchecked_transaction()?;
    let result = f(&KeyDb::new(conn))?;
    tx.commit()?;
    Ok(result)
}

/// Create an in-memory SQLCipher database with migrations applied.
#[cfg(test)]
pub(crate) fn init_test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "PRAGMA key = \"x'0000000000000000000000000000000000000000000000000000000000000000'\";",
    )
    .unwrap();
    migrations::run_keystore_migrations(&conn).unwrap();
    conn
}
