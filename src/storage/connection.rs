//! Database connection management with WAL mode support

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;
use crate::types::StorageConfig;

/// Storage engine wrapping SQLite
///
/// Cloning is cheap; clones share the same underlying connection. All reads
/// and writes serialize through the connection mutex, which gives every
/// closure passed to `with_connection`/`with_transaction` a consistent
/// snapshot of the database.
#[derive(Clone)]
pub struct Storage {
    config: StorageConfig,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create a database with the given configuration
    pub fn open(config: StorageConfig) -> Result<Self> {
        let conn = Self::create_connection(&config)?;
        run_migrations(&conn)?;

        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StorageConfig {
            db_path: ":memory:".to_string(),
        })
    }

    fn create_connection(config: &StorageConfig) -> Result<Connection> {
        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(&config.db_path, flags)?
        };

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA cache_size=-64000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        Ok(conn)
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Get database path
    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mnemo.db").to_string_lossy().to_string();

        {
            let storage = Storage::open(StorageConfig {
                db_path: db_path.clone(),
            })
            .unwrap();
            storage
                .with_transaction(|conn| {
                    conn.execute(
                        "INSERT INTO id_counters (workspace_id, prefix, next_seq) VALUES ('w', 'S', 5)",
                        [],
                    )?;
                    Ok(())
                })
                .unwrap();
        }

        let reopened = Storage::open(StorageConfig { db_path }).unwrap();
        let next: i64 = reopened
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT next_seq FROM id_counters WHERE workspace_id = 'w' AND prefix = 'S'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(next, 5);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let storage = Storage::open_in_memory().unwrap();

        let result: Result<()> = storage.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO id_counters (workspace_id, prefix, next_seq) VALUES ('w', 'S', 1)",
                [],
            )?;
            Err(crate::error::MnemoError::Internal("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = storage
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM id_counters", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
