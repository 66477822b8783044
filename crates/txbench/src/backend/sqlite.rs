//! Embedded relational backend (SQLite).
//!
//! Uses the same table layout and upsert statement as the PostgreSQL backend
//! so the two relational engines can be compared directly.

use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension};

use super::{as_text, check_identifier, Backend};
use crate::diagnostics::SharedSink;
use crate::error::BackendError;

/// Default table name for the relational backends.
pub const DEFAULT_TABLE: &str = "txbench";

/// SQLite backend configuration.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file, or `None` for a private in-memory database.
    pub path: Option<PathBuf>,

    /// Table the benchmark upserts into.
    pub table: String,
}

impl SqliteConfig {
    /// File-backed database.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// In-memory database.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

/// Marker for an open `BEGIN` on the connection.
pub struct SqliteTxn {
    _open: (),
}

/// rusqlite-backed relational store.
pub struct SqliteBackend {
    conn: Option<Connection>,
    upsert_sql: String,
    table: String,
    sink: SharedSink,
}

impl SqliteBackend {
    fn conn(&self) -> Result<&Connection, BackendError> {
        self.conn.as_ref().ok_or(BackendError::Closed)
    }

    /// Committed value for `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let key = as_text(key, "key")?;
        let sql = format!("SELECT val FROM {} WHERE key = ?1", self.table);
        let value: Option<String> = self
            .conn()?
            .query_row(&sql, params![key], |row| row.get(0))
            .optional()?;
        Ok(value.map(String::into_bytes))
    }

    /// Number of rows in the table.
    pub fn len(&self) -> Result<u64, BackendError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = self.conn()?.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }
}

impl Backend for SqliteBackend {
    const NAME: &'static str = "sqlite";

    type Config = SqliteConfig;
    type Txn = SqliteTxn;

    fn open(config: &SqliteConfig, sink: SharedSink) -> Result<Self, BackendError> {
        check_identifier(&config.table)?;

        let conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key VARCHAR(20) PRIMARY KEY, val VARCHAR(20))",
            config.table
        ))?;

        match &config.path {
            Some(path) => sink.info(&format!("opened {}", path.display())),
            None => sink.info("opened in-memory database"),
        }

        Ok(Self {
            conn: Some(conn),
            upsert_sql: format!(
                "INSERT INTO {} (key, val) VALUES (?1, ?2) \
                 ON CONFLICT (key) DO UPDATE SET val = excluded.val",
                config.table
            ),
            table: config.table.clone(),
            sink,
        })
    }

    fn begin(&mut self) -> Result<SqliteTxn, BackendError> {
        self.conn()?.execute_batch("BEGIN")?;
        Ok(SqliteTxn { _open: () })
    }

    fn write(
        &mut self,
        _txn: &mut SqliteTxn,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), BackendError> {
        let key = as_text(key, "key")?;
        let value = as_text(value, "value")?;
        let mut stmt = self.conn()?.prepare_cached(&self.upsert_sql)?;
        stmt.execute(params![key, value])?;
        Ok(())
    }

    fn commit(&mut self, _txn: SqliteTxn) -> Result<(), BackendError> {
        let conn = self.conn()?;
        if let Err(e) = conn.execute_batch("COMMIT") {
            // A failed COMMIT can leave the transaction open.
            if !conn.is_autocommit() {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    self.sink
                        .warn(&format!("rollback after failed commit: {}", rollback));
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn abort(&mut self, _txn: SqliteTxn) {
        let result = match self.conn() {
            Ok(conn) => conn.execute_batch("ROLLBACK").map_err(BackendError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.sink.warn(&format!("abort failed: {}", e));
        }
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                self.sink.warn(&format!("close failed: {}", e));
            }
        }
    }
}
