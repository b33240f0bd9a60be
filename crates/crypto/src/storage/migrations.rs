//! Key database migration runner, tracked in its own `_keystore_migrations`
//! table so it can share a file with application tables.

use crate::error::CryptoError;
use rusqlite::Connection;

const MIGRATIONS: &[(i32, &str)] = &[(1, MIGRATION_001)];

const MIGRATION_001: &str = "
CREATE TABLE IF NOT EXISTS identity_key_pairs (
    alias       TEXT PRIMARY KEY CHECK (length(alias) > 0),
    public_key  BLOB NOT NULL,
    private_key BLOB NOT NULL,
    key_bits    INTEGER NOT NULL CHECK (key_bits >= 2048),
    created_at  INTEGER NOT NULL
);
";

pub fn run_keystore_migrations(conn: &Connection) -> Result<(), CryptoError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _keystore_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _keystore_migrations",
        [],
        |row| row.get(0),
    )?;

    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO _keystore_migrations (version) VALUES (?1)",
                [version],
            )?;
            tx.commit()?;
            tracing::debug!(version, "applied key database migration");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    fn table_exists(conn: &Connection, table: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn run_migrations_creates_key_pair_table() {
        let conn = init_test_db();
        assert!(table_exists(&conn, "identity_key_pairs"));
        assert!(table_exists(&conn, "_keystore_migrations"));
    }

    #[test]
    fn run_migrations_is_idempotent() {
        let conn = init_test_db();
        run_keystore_migrations(&conn).unwrap();
        let applied: i32 = conn
            .query_row("SELECT COUNT(*) FROM _keystore_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i32);
    }

    #[test]
    fn migrations_table_records_applied_at() {
        let conn = init_test_db();
        let applied_at: String = conn
            .query_row(
                "SELECT applied_at FROM _keystore_migrations WHERE version = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!applied_at.is_empty());
    }

    #[test]
    fn key_bits_check_rejects_weak_keys() {
        let conn = init_test_db();
        let result = conn.execute(
            "INSERT INTO identity_key_pairs (alias, public_key, private_key, key_bits, created_at)
             VALUES ('weak', X'AA', X'BB', 1024, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn alias_is_unique() {
        let conn = init_test_db();
        conn.execute(
            "INSERT INTO identity_key_pairs (alias, public_key, private_key, key_bits, created_at)
             VALUES ('me', X'AA', X'BB', 2048, 0)",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO identity_key_pairs (alias, public_key, private_key, key_bits, created_at)
             VALUES ('me', X'CC', X'DD', 2048, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
