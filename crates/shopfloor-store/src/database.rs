use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::schema;

/// Connection tuning applied when a database is opened.
#[derive(Clone, Debug)]
pub struct DatabaseOptions {
    pub busy_timeout: Duration,
    /// Extra attempts a transaction gets after a busy/locked failure.
    pub max_tx_retries: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            max_tx_retries: 3,
        }
    }
}

/// Errors that can flow out of a transaction body. Busy errors make the
/// transaction boundary start over with a fresh transaction.
pub trait TxError: From<StoreError> {
    fn is_busy(&self) -> bool;
}

impl TxError for StoreError {
    fn is_busy(&self) -> bool {
        StoreError::is_busy(self)
    }
}

/// Thread-safe SQLite connection wrapper.
/// Uses parking_lot::Mutex for synchronous access (rusqlite is not Sync).
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    max_tx_retries: u32,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, &DatabaseOptions::default())
    }

    pub fn open_with(path: &Path, options: &DatabaseOptions) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        let db = Self::init(conn, path.to_owned(), options)?;
        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::init(conn, PathBuf::from(":memory:"), &DatabaseOptions::default())
    }

    fn init(conn: Connection, path: PathBuf, options: &DatabaseOptions) -> Result<Self, StoreError> {
        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;
        conn.busy_timeout(options.busy_timeout)
            .map_err(|e| StoreError::Database(format!("busy timeout: {e}")))?;

        conn.execute_batch(schema::CREATE_TABLES)
            .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

        let version: Option<u32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        if version.is_none() {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [schema::SCHEMA_VERSION],
            )
            .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            max_tx_retries: options.max_tx_retries,
        })
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside a single transaction. Commits when `f` succeeds, rolls
    /// back otherwise. A busy/locked failure anywhere in the attempt rolls
    /// back and re-runs `f` from scratch, up to `max_tx_retries` times.
    pub fn transaction<F, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(&Connection) -> Result<T, E>,
        E: TxError,
    {
        let conn = self.conn.lock();
        let mut attempt = 0u32;
        loop {
            let outcome = conn
                .unchecked_transaction()
                .map_err(|e| E::from(StoreError::from(e)))
                .and_then(|tx| {
                    let value = f(&*tx)?;
                    tx.commit().map_err(|e| E::from(StoreError::from(e)))?;
                    Ok(value)
                });

            match outcome {
                Err(e) if e.is_busy() && attempt < self.max_tx_retries => {
                    attempt += 1;
                    warn!(attempt, "transaction hit a write conflict, retrying");
                    std::thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
                }
                other => return other,
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
            max_tx_retries: self.max_tx_retries,
        }
    }
}
