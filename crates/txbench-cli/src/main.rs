//! txbench command-line driver
//!
//! Runs the write benchmark against each selected backend in turn and prints
//! one summary row per backend.

mod formatter;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use formatter::OutputFormat;
use tracing_subscriber::EnvFilter;
use txbench::backend::{
    BtreeBackend, BtreeConfig, LsmBackend, LsmConfig, MemoryBackend, MemoryConfig, SqliteBackend,
    SqliteConfig, DEFAULT_BUCKET,
};
#[cfg(feature = "postgres")]
use txbench::backend::{PgSslMode, PostgresBackend, PostgresConfig};
use txbench::config::{DEFAULT_BATCH_SIZE, DEFAULT_ITERATION_COUNT};
use txbench::diagnostics::{self, SharedSink, TracingSink};
use txbench::{
    BackendKind, BatchSpec, Error, KeyPrefixPolicy, Report, RunOutcome, Runner, WriteMode,
};

/// Transactional write benchmark
#[derive(Parser, Debug)]
#[command(name = "txbench")]
#[command(version, about = "Compare write transaction cost across storage engines")]
pub struct Args {
    /// Backend to run (repeatable)
    #[arg(short = 'b', long = "backend", value_enum, default_values_t = [BackendArg::Btree, BackendArg::Lsm])]
    pub backends: Vec<BackendArg>,

    /// Timed iterations per backend
    #[arg(short = 'n', long, default_value_t = DEFAULT_ITERATION_COUNT)]
    pub iterations: usize,

    /// Key/value pairs written per transaction
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Whether keys embed the iteration index
    #[arg(long, value_enum, default_value_t = KeyPrefixArg::PerIteration)]
    pub key_prefix: KeyPrefixArg,

    /// One write call per item, or one batch call per transaction
    #[arg(long, value_enum, default_value_t = WriteModeArg::PerItem)]
    pub write_mode: WriteModeArg,

    /// Directory for the embedded stores
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Permission mode of the B-tree file, in octal
    #[arg(long, default_value = "600", value_parser = parse_mode)]
    pub file_mode: u32,

    /// Bucket (table / tree) name for the embedded key/value stores
    #[arg(long, default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Skip the flush after each log-structured commit
    #[arg(long)]
    pub no_sync: bool,

    /// Keep the SQLite database in memory
    #[arg(long)]
    pub sqlite_in_memory: bool,

    #[command(flatten)]
    pub postgres: PostgresArgs,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Forward backend diagnostics to the log
    #[arg(long)]
    pub backend_logs: bool,
}

/// PostgreSQL connection parameters.
#[derive(clap::Args, Debug, Clone)]
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
pub struct PostgresArgs {
    /// Server host
    #[arg(long = "pg-host", default_value = "localhost")]
    pub host: String,

    /// Server port
    #[arg(long = "pg-port", default_value_t = 5432)]
    pub port: u16,

    /// User name
    #[arg(long = "pg-user", default_value = "postgres")]
    pub user: String,

    /// Password
    #[arg(long = "pg-password", default_value = "postgres")]
    pub password: String,

    /// Database name
    #[arg(long = "pg-database", default_value = "postgres")]
    pub database: String,

    /// TLS negotiation
    #[arg(long = "pg-ssl-mode", value_enum, default_value_t = SslMode::Disable)]
    pub ssl_mode: SslMode,

    /// Table the benchmark upserts into [default: txbench, or
    /// txbench_unlogged with --pg-unlogged]
    #[arg(long = "pg-table")]
    pub table: Option<String>,

    /// Create the table as UNLOGGED
    #[arg(long = "pg-unlogged")]
    pub unlogged: bool,
}

/// Storage engine selectable with `-b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Embedded B-tree store (redb)
    Btree,
    /// Embedded log-structured store (sled)
    Lsm,
    /// Embedded relational store (SQLite)
    Sqlite,
    /// PostgreSQL over the network
    Postgres,
    /// In-memory map, measures harness overhead
    Memory,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Btree => BackendKind::Btree,
            BackendArg::Lsm => BackendKind::Lsm,
            BackendArg::Sqlite => BackendKind::Sqlite,
            BackendArg::Postgres => BackendKind::Postgres,
            BackendArg::Memory => BackendKind::Memory,
        }
    }
}

/// Whether keys embed the iteration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyPrefixArg {
    /// Fresh keys every iteration
    PerIteration,
    /// The same keys every iteration
    Shared,
}

impl From<KeyPrefixArg> for KeyPrefixPolicy {
    fn from(arg: KeyPrefixArg) -> Self {
        match arg {
            KeyPrefixArg::PerIteration => KeyPrefixPolicy::PerIteration,
            KeyPrefixArg::Shared => KeyPrefixPolicy::Shared,
        }
    }
}

/// How a batch is staged in its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WriteModeArg {
    /// One write call per item
    PerItem,
    /// One batch call per transaction
    Batch,
}

impl From<WriteModeArg> for WriteMode {
    fn from(arg: WriteModeArg) -> Self {
        match arg {
            WriteModeArg::PerItem => WriteMode::PerItem,
            WriteModeArg::Batch => WriteMode::Batch,
        }
    }
}

/// TLS negotiation with the PostgreSQL server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
}

#[cfg(feature = "postgres")]
impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
        }
    }
}

#[cfg(feature = "postgres")]
impl PostgresArgs {
    fn into_config(self) -> PostgresConfig {
        let config = PostgresConfig::new(self.host, self.port, self.database)
            .with_credentials(self.user, self.password)
            .with_ssl_mode(self.ssl_mode.into())
            .with_unlogged(self.unlogged);
        match self.table {
            Some(table) => config.with_table(table),
            None => config,
        }
    }
}

fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode '{}': {}", s, e))
}

/// Everything a benchmark session needs, resolved from the command line.
#[derive(Debug)]
pub struct Plan {
    pub spec: BatchSpec,
    pub backends: Vec<BackendKind>,
    pub btree: BtreeConfig,
    pub lsm: LsmConfig,
    pub sqlite: SqliteConfig,
    pub memory: MemoryConfig,
    #[cfg(feature = "postgres")]
    pub postgres: PostgresConfig,
    pub backend_logs: bool,
}

impl Args {
    /// Resolve the arguments into backend configurations.
    pub fn into_plan(self) -> Result<Plan, Error> {
        let mut backends = Vec::with_capacity(self.backends.len());
        for kind in self.backends.into_iter().map(BackendKind::from) {
            if !backends.contains(&kind) {
                backends.push(kind);
            }
        }

        if cfg!(not(feature = "postgres")) && backends.contains(&BackendKind::Postgres) {
            return Err(Error::Config(
                "postgres support is not compiled in; rebuild with --features postgres".into(),
            ));
        }

        let data_dir = self
            .data_dir
            .unwrap_or_else(|| std::env::temp_dir().join("txbench"));

        let spec = BatchSpec::new(self.iterations)
            .with_batch_size(self.batch_size)
            .with_key_prefix_policy(self.key_prefix.into())
            .with_write_mode(self.write_mode.into());

        let sqlite = if self.sqlite_in_memory {
            SqliteConfig::in_memory()
        } else {
            SqliteConfig::new(data_dir.join("sqlite.db"))
        };

        Ok(Plan {
            spec,
            backends,
            btree: BtreeConfig::new(data_dir.join("btree.redb"))
                .with_mode(self.file_mode)
                .with_bucket(self.bucket.clone()),
            lsm: LsmConfig::new(data_dir.join("lsm"))
                .with_bucket(self.bucket)
                .with_flush_on_commit(!self.no_sync),
            sqlite,
            memory: MemoryConfig::new(),
            #[cfg(feature = "postgres")]
            postgres: self.postgres.into_config(),
            backend_logs: self.backend_logs,
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("txbench=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let format = args.format;
    let plan = args.into_plan()?;

    let mut report = Report::new();
    let mut first_error = None;

    for &kind in &plan.backends {
        match run_kind(kind, &plan) {
            Ok(outcome) => {
                if let Err(e) = report.record(outcome) {
                    first_error.get_or_insert(e);
                }
            }
            Err(e) => {
                tracing::error!(backend = %kind, error = %e, "backend did not open");
                report.record_failure(kind.as_str(), plan.spec, &e);
                first_error.get_or_insert(e);
            }
        }
    }

    let formatter = formatter::create_formatter(format);
    println!("{}", formatter.format_report(&report));

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn sink_for(kind: BackendKind, enabled: bool) -> SharedSink {
    if enabled {
        std::sync::Arc::new(TracingSink::new(kind.as_str()))
    } else {
        diagnostics::noop()
    }
}

/// Open, run and close one backend.
fn run_kind(kind: BackendKind, plan: &Plan) -> Result<RunOutcome, Error> {
    let runner = Runner::new(plan.spec).with_sink(sink_for(kind, plan.backend_logs));

    match kind {
        BackendKind::Btree => runner.run_backend::<BtreeBackend>(&plan.btree),
        BackendKind::Lsm => runner.run_backend::<LsmBackend>(&plan.lsm),
        BackendKind::Sqlite => runner.run_backend::<SqliteBackend>(&plan.sqlite),
        BackendKind::Memory => runner.run_backend::<MemoryBackend>(&plan.memory),
        #[cfg(feature = "postgres")]
        BackendKind::Postgres => runner.run_backend::<PostgresBackend>(&plan.postgres),
        #[cfg(not(feature = "postgres"))]
        BackendKind::Postgres => Err(Error::Config(
            "postgres support is not compiled in".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["txbench"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.backends, vec![BackendArg::Btree, BackendArg::Lsm]);
        assert_eq!(args.format, OutputFormat::Table);

        let plan = args.into_plan().unwrap();
        assert_eq!(plan.spec, BatchSpec::default());
        assert_eq!(plan.btree.mode, 0o600);
        assert_eq!(plan.btree.bucket, "MyBucket");
        assert_eq!(plan.lsm.bucket, "MyBucket");
        assert!(plan.lsm.flush_on_commit);
        assert!(!plan.backend_logs);
    }

    #[test]
    fn test_batch_spec_from_flags() {
        let plan = parse(&[
            "-n",
            "5",
            "--batch-size",
            "10",
            "--key-prefix",
            "shared",
            "--write-mode",
            "batch",
        ])
        .into_plan()
        .unwrap();

        assert_eq!(plan.spec.iteration_count, 5);
        assert_eq!(plan.spec.batch_size, 10);
        assert_eq!(plan.spec.key_prefix_policy, KeyPrefixPolicy::Shared);
        assert_eq!(plan.spec.write_mode, WriteMode::Batch);
    }

    #[test]
    fn test_paths_under_data_dir() {
        let plan = parse(&["--data-dir", "/tmp/bench", "--bucket", "kv", "--no-sync"])
            .into_plan()
            .unwrap();

        assert_eq!(plan.btree.path, PathBuf::from("/tmp/bench/btree.redb"));
        assert_eq!(plan.lsm.path, PathBuf::from("/tmp/bench/lsm"));
        assert_eq!(plan.sqlite.path, Some(PathBuf::from("/tmp/bench/sqlite.db")));
        assert_eq!(plan.btree.bucket, "kv");
        assert!(!plan.lsm.flush_on_commit);
    }

    #[test]
    fn test_sqlite_in_memory() {
        let plan = parse(&["--sqlite-in-memory"]).into_plan().unwrap();
        assert!(plan.sqlite.path.is_none());
    }

    #[test]
    fn test_file_mode_is_octal() {
        assert_eq!(parse(&["--file-mode", "644"]).file_mode, 0o644);
        assert_eq!(parse(&["--file-mode", "0o640"]).file_mode, 0o640);
        assert!(Args::try_parse_from(["txbench", "--file-mode", "999"]).is_err());
    }

    #[test]
    fn test_repeated_backends_dedup() {
        let plan = parse(&["-b", "memory", "-b", "sqlite", "-b", "memory"])
            .into_plan()
            .unwrap();
        assert_eq!(plan.backends, vec![BackendKind::Memory, BackendKind::Sqlite]);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Args::try_parse_from(["txbench", "-b", "rocksdb"]).is_err());
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn test_postgres_requires_feature() {
        let err = parse(&["-b", "postgres"]).into_plan().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_postgres_config_from_flags() {
        let plan = parse(&[
            "-b",
            "postgres",
            "--pg-host",
            "db.internal",
            "--pg-port",
            "6543",
            "--pg-table",
            "bench",
            "--pg-unlogged",
        ])
        .into_plan()
        .unwrap();

        assert_eq!(plan.postgres.host, "db.internal");
        assert_eq!(plan.postgres.port, 6543);
        assert_eq!(plan.postgres.table_name(), "bench");
        assert!(plan.postgres.unlogged);
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_unlogged_default_table() {
        let logged = parse(&["-b", "postgres"]).into_plan().unwrap();
        let unlogged = parse(&["-b", "postgres", "--pg-unlogged"])
            .into_plan()
            .unwrap();

        assert_eq!(logged.postgres.table_name(), "txbench");
        assert_eq!(unlogged.postgres.table_name(), "txbench_unlogged");
    }

    #[test]
    fn test_memory_run_prints_report() {
        let plan = parse(&["-b", "memory", "-n", "3", "--batch-size", "10"])
            .into_plan()
            .unwrap();

        let outcome = run_kind(BackendKind::Memory, &plan).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.samples.len(), 3);
        assert_eq!(plan.memory.probe.stats().writes, 30);
    }
}
