//! PostgreSQL backend.
//!
//! Requires a running PostgreSQL instance. Enable with `--features postgres`.
//! The adapter stays synchronous: it owns a current-thread runtime and blocks
//! on every call, so it is confined to the thread that drives it.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool, Postgres, Transaction};
use tokio::runtime::Runtime;

use super::sqlite::DEFAULT_TABLE;
use super::{as_text, check_identifier, Backend};
use crate::diagnostics::SharedSink;
use crate::error::BackendError;
use crate::workload::WorkloadItem;

pub use sqlx::postgres::PgSslMode;

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5432;

/// Default user, password and database name.
pub const DEFAULT_CREDENTIAL: &str = "postgres";

/// Default table for `UNLOGGED` runs.
pub const DEFAULT_UNLOGGED_TABLE: &str = "txbench_unlogged";

const PERSISTENCE_SQL: &str =
    "SELECT relpersistence::text FROM pg_class WHERE oid = to_regclass($1)";

/// PostgreSQL backend configuration.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,

    /// TLS negotiation mode.
    pub ssl_mode: PgSslMode,

    /// Table the benchmark upserts into. `None` picks a default that depends
    /// on `unlogged`, so logged and unlogged runs never share a table.
    pub table: Option<String>,

    /// Create the table `UNLOGGED` (no WAL).
    pub unlogged: bool,
}

impl PostgresConfig {
    /// Connect to `host:port/database` with the default credentials.
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: DEFAULT_CREDENTIAL.to_string(),
            password: DEFAULT_CREDENTIAL.to_string(),
            database: database.into(),
            ssl_mode: PgSslMode::Disable,
            table: None,
            unlogged: false,
        }
    }

    /// Set the credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the SSL mode.
    pub fn with_ssl_mode(mut self, mode: PgSslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// The table the benchmark writes to.
    pub fn table_name(&self) -> &str {
        match &self.table {
            Some(table) => table,
            None if self.unlogged => DEFAULT_UNLOGGED_TABLE,
            None => DEFAULT_TABLE,
        }
    }

    /// Create the table without write-ahead logging.
    pub fn with_unlogged(mut self, unlogged: bool) -> Self {
        self.unlogged = unlogged;
        self
    }

    /// sqlx connect options, with per-statement logging turned off.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(self.ssl_mode)
            .disable_statement_logging()
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE {}TABLE IF NOT EXISTS {} (key VARCHAR(20) PRIMARY KEY, val VARCHAR(20))",
            if self.unlogged { "UNLOGGED " } else { "" },
            self.table_name()
        )
    }
}

/// `CREATE TABLE IF NOT EXISTS` keeps a pre-existing table as it is, so make
/// sure its persistence is the one that was asked for.
fn check_persistence(
    table: &str,
    unlogged: bool,
    persistence: Option<&str>,
) -> Result<(), BackendError> {
    let expected = if unlogged { "u" } else { "p" };
    match persistence {
        Some(found) if found == expected => Ok(()),
        Some(found) => Err(BackendError::InvalidData(format!(
            "table {} exists with persistence '{}', expected '{}'; use another table name",
            table, found, expected
        ))),
        None => Err(BackendError::InvalidData(format!(
            "table {} not found after create",
            table
        ))),
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_CREDENTIAL)
    }
}

/// Open SQL transaction.
pub struct PostgresTxn {
    inner: Transaction<'static, Postgres>,
}

/// PostgreSQL backend for benchmarks.
pub struct PostgresBackend {
    pool: Option<PgPool>,
    rt: Runtime,
    upsert_sql: String,
    batch_sql: String,
    sink: SharedSink,
}

impl PostgresBackend {
    fn pool(&self) -> Result<&PgPool, BackendError> {
        self.pool.as_ref().ok_or(BackendError::Closed)
    }

    /// Number of rows in the table.
    pub fn count_rows(&self, table: &str) -> Result<i64, BackendError> {
        check_identifier(table)?;
        let pool = self.pool()?;
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = self
            .rt
            .block_on(sqlx::query_scalar(&sql).fetch_one(pool))?;
        Ok(count)
    }
}

impl Backend for PostgresBackend {
    const NAME: &'static str = "postgres";

    type Config = PostgresConfig;
    type Txn = PostgresTxn;

    fn open(config: &PostgresConfig, sink: SharedSink) -> Result<Self, BackendError> {
        let table = config.table_name();
        check_identifier(table)?;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // One connection: the runner never overlaps transactions.
        let pool = rt.block_on(
            PgPoolOptions::new()
                .max_connections(1)
                .connect_with(config.connect_options()),
        )?;
        rt.block_on(sqlx::query(&config.create_table_sql()).execute(&pool))?;

        let persistence: Option<String> = rt.block_on(
            sqlx::query_scalar(PERSISTENCE_SQL)
                .bind(table)
                .fetch_optional(&pool),
        )?;
        if let Err(e) = check_persistence(table, config.unlogged, persistence.as_deref()) {
            rt.block_on(pool.close());
            return Err(e);
        }

        sink.info(&format!(
            "connected to {}:{}/{}",
            config.host, config.port, config.database
        ));

        Ok(Self {
            pool: Some(pool),
            rt,
            upsert_sql: format!(
                "INSERT INTO {} VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET val = excluded.val",
                table
            ),
            batch_sql: format!(
                "INSERT INTO {} SELECT key, val FROM unnest($1::text[], $2::text[]) v(key, val) \
                 ON CONFLICT (key) DO UPDATE SET val = excluded.val",
                table
            ),
            sink,
        })
    }

    fn begin(&mut self) -> Result<PostgresTxn, BackendError> {
        let pool = self.pool()?;
        let inner = self.rt.block_on(pool.begin())?;
        Ok(PostgresTxn { inner })
    }

    fn write(
        &mut self,
        txn: &mut PostgresTxn,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), BackendError> {
        let key = as_text(key, "key")?;
        let value = as_text(value, "value")?;
        self.rt.block_on(
            sqlx::query(&self.upsert_sql)
                .bind(key)
                .bind(value)
                .execute(&mut *txn.inner),
        )?;
        Ok(())
    }

    fn write_batch(
        &mut self,
        txn: &mut PostgresTxn,
        items: &[WorkloadItem],
    ) -> Result<(), BackendError> {
        let mut keys = Vec::with_capacity(items.len());
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            keys.push(as_text(&item.key, "key")?.to_string());
            values.push(as_text(&item.value, "value")?.to_string());
        }

        self.rt.block_on(
            sqlx::query(&self.batch_sql)
                .bind(keys)
                .bind(values)
                .execute(&mut *txn.inner),
        )?;
        Ok(())
    }

    fn commit(&mut self, txn: PostgresTxn) -> Result<(), BackendError> {
        // On error sqlx rolls the transaction back when it is dropped.
        self.rt.block_on(txn.inner.commit())?;
        Ok(())
    }

    fn abort(&mut self, txn: PostgresTxn) {
        if let Err(e) = self.rt.block_on(txn.inner.rollback()) {
            self.sink.warn(&format!("rollback failed: {}", e));
        }
    }

    fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.rt.block_on(pool.close());
            self.sink.info("disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PostgresConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "postgres");
        assert_eq!(config.database, "postgres");
        assert!(matches!(config.ssl_mode, PgSslMode::Disable));
        assert!(!config.unlogged);
    }

    #[test]
    fn test_create_table_sql() {
        let config = PostgresConfig::default().with_table("test2");
        assert_eq!(
            config.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS test2 (key VARCHAR(20) PRIMARY KEY, val VARCHAR(20))"
        );

        let unlogged = config.with_unlogged(true);
        assert!(unlogged
            .create_table_sql()
            .starts_with("CREATE UNLOGGED TABLE IF NOT EXISTS test2"));
    }

    #[test]
    fn test_unlogged_runs_get_their_own_table() {
        let logged = PostgresConfig::default();
        let unlogged = PostgresConfig::default().with_unlogged(true);

        assert_eq!(logged.table_name(), "txbench");
        assert_eq!(unlogged.table_name(), "txbench_unlogged");
        assert!(unlogged
            .create_table_sql()
            .starts_with("CREATE UNLOGGED TABLE IF NOT EXISTS txbench_unlogged "));

        let named = PostgresConfig::default().with_table("kv").with_unlogged(true);
        assert_eq!(named.table_name(), "kv");
    }

    #[test]
    fn test_existing_table_persistence_must_match() {
        assert!(check_persistence("t", false, Some("p")).is_ok());
        assert!(check_persistence("t", true, Some("u")).is_ok());

        // A logged table left behind by an earlier run.
        assert!(matches!(
            check_persistence("t", true, Some("p")),
            Err(BackendError::InvalidData(_))
        ));
        assert!(matches!(
            check_persistence("t", false, Some("u")),
            Err(BackendError::InvalidData(_))
        ));
        assert!(check_persistence("t", false, None).is_err());
    }

    /// Needs a PostgreSQL server on localhost:5432.
    #[test]
    #[ignore]
    fn test_live_upsert() {
        let config = PostgresConfig::default().with_table("txbench_live");
        let mut backend = PostgresBackend::open(&config, crate::diagnostics::noop()).unwrap();

        let mut txn = backend.begin().unwrap();
        backend.write(&mut txn, b"answer0", b"42").unwrap();
        backend.write(&mut txn, b"answer0", b"43").unwrap();
        backend.commit(txn).unwrap();

        assert!(backend.count_rows("txbench_live").unwrap() >= 1);
        backend.close();
    }
}
