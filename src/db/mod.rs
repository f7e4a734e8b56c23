//! SQLite-backed store for companies, customers, interactions and sync state.
//!
//! The database lives at `~/.successdesk/successdesk.db` unless
//! `SUCCESSDESK_DB_PATH` points elsewhere. Every business row carries the
//! owning `user_id`; every query in this module filters on it.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::Connection;

pub mod blocklist;
pub mod companies;
pub mod customers;
pub mod emails;
pub mod feature_requests;
pub mod meetings;
pub mod next_steps;
pub mod profiles;
pub mod sync_jobs;
pub mod threads;
pub mod types;
pub use types::*;

pub struct Db {
    conn: Connection,
}

/// The single connection shared by handlers, sync jobs and the analysis
/// worker. Never hold the guard across an `.await`.
pub type SharedDb = std::sync::Arc<parking_lot::Mutex<Db>>;

pub fn shared(db: Db) -> SharedDb {
    std::sync::Arc::new(parking_lot::Mutex::new(db))
}

impl Db {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(DbError::from)?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT").map_err(DbError::from)?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default path and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL keeps readers (API handlers) off the writer's back (sync jobs)
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Resolve the default database path.
    fn db_path() -> Result<PathBuf, DbError> {
        if let Ok(explicit) = std::env::var("SUCCESSDESK_DB_PATH") {
            if !explicit.trim().is_empty() {
                return Ok(PathBuf::from(explicit));
            }
        }
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".successdesk").join("successdesk.db"))
    }
}

/// Fresh row identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// True when a SQLite error is a UNIQUE / PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Build `?N, ?N+1, ...` placeholders for an `IN (...)` clause.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Shared test utilities
// =============================================================================


#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let db = test_db();
        for table in ["companies", "customers", "threads", "meetings", "sync_jobs"] {
            let count: i64 = db
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .expect("table should exist");
            assert_eq!(count, 0, "{table} should start empty");
        }
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = test_db();
        let result: Result<(), DbError> = db.with_transaction(|tx| {
            tx.conn_ref().execute(
                "INSERT INTO domain_blocklist (entry_id, user_id, domain, created_at)
                 VALUES ('e1', 'user-1', 'spam.io', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Err(DbError::Conflict("forced".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM domain_blocklist", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(2, 3), "?2, ?3, ?4");
        assert_eq!(placeholders(1, 0), "");
    }
}
