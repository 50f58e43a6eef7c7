//! Database layer for onclinic.
//!
//! Every caller opens its own [`Database`] handle on the shared SQLite file.
//! All cross-caller coordination happens through SQLite locking: write paths
//! take the write lock up front with [`Database::begin_immediate`], read-only
//! scans use [`Database::begin_read`] for a consistent snapshot.

mod schema;
mod patients;
mod bills;
mod prescriptions;
mod inventory;
mod ledger;
mod sequences;

pub use schema::*;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl DbError {
    /// True when the store rejected a write because a UNIQUE or PRIMARY KEY
    /// column already holds the value.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        }
    }

    /// True for connectivity/locking failures the caller may retry as a whole.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::SystemIoFailure
                        | ErrorCode::CannotOpen
                )
            ),
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with_timeout(path, DatabaseConfig::default().busy_timeout())
    }

    /// Open the database described by `config`.
    pub fn open_with_config(config: &DatabaseConfig) -> DbResult<Self> {
        Self::open_with_timeout(&config.path, config.busy_timeout())
    }

    fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // WAL lets scans run while another handle holds the write lock.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction, taking the database write lock immediately.
    ///
    /// Statements issued through `self` until the returned guard is committed
    /// run inside the transaction. Dropping the guard rolls back.
    pub fn begin_immediate(&self) -> DbResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Begin a read transaction so several queries observe one snapshot.
    pub fn begin_read(&self) -> DbResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Deferred,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"patients".to_string()));
        assert!(tables.contains(&"bills".to_string()));
        assert!(tables.contains(&"prescriptions".to_string()));
        assert!(tables.contains(&"inventory_items".to_string()));
        assert!(tables.contains(&"stock_ledger".to_string()));
        assert!(tables.contains(&"sequence_counters".to_string()));
    }

    #[test]
    fn test_open_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.db");

        let first = Database::open(&path).unwrap();
        let second = Database::open(&path).unwrap();

        first
            .conn()
            .execute(
                "INSERT INTO sequence_counters (scope_prefix, category, last_serial) VALUES ('ON-2405-', 'clinic_bill', 3)",
                [],
            )
            .unwrap();

        let seen: i64 = second
            .conn()
            .query_row(
                "SELECT last_serial FROM sequence_counters WHERE scope_prefix = 'ON-2405-'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_unique_violation_classified() {
        let db = Database::open_in_memory().unwrap();
        let insert = "INSERT INTO sequence_counters (scope_prefix, category, last_serial) VALUES ('2024/', 'patient', 1)";
        db.conn().execute(insert, []).unwrap();

        let err: DbError = db.conn().execute(insert, []).unwrap_err().into();
        assert!(err.is_unique_violation());
        assert!(!err.is_transient());
        assert!(!DbError::NotFound("x".into()).is_unique_violation());
    }

    #[test]
    fn test_dropped_immediate_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        {
            let _tx = db.begin_immediate().unwrap();
            db.conn()
                .execute(
                    "INSERT INTO sequence_counters (scope_prefix, category, last_serial) VALUES ('2024/', 'patient', 1)",
                    [],
                )
                .unwrap();
        }
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM sequence_counters", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
