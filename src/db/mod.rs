use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

use crate::error::AppResult;

pub mod migrations;

pub mod repositories;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a fresh SQLite connection per call against one database file.
///
/// The schema is brought up to date once, when the pool is created.
#[derive(Clone, Debug)]
pub struct DbPool {
    path: PathBuf,
}

impl DbPool {
    pub fn new<P: Into<PathBuf>>(path: P) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let pool = Self { path };
        let conn = pool.open()?;
        migrations::run(&conn)?;
        let version = migrations::current_version(&conn)?;
        info!(target: "app::db", db_path = %pool.path.display(), version, "planner database ready");

        Ok(pool)
    }

    pub fn with_connection<F, T>(&self, callback: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let conn = self.open()?;
        callback(&conn)
    }

    /// Runs `callback` inside one transaction, committing only when it returns `Ok`.
    pub fn with_transaction<F, T>(&self, callback: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<T>,
    {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let value = callback(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn open(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", 1)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!(target: "app::db", db_path = %self.path.display(), "connection opened");
        Ok(conn)
    }
}
