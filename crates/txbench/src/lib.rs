//! Transactional write benchmark harness.
//!
//! Compares the cost of small write transactions across storage engines that
//! share nothing but a key/value upsert interface.
//!
//! # Components
//!
//! - **Backend**: adapter trait over redb, sled, SQLite, PostgreSQL and an
//!   in-memory fake
//! - **Workload**: deterministic key/value batches
//! - **Runner**: serial timed loop, one transaction per iteration
//! - **Report**: summary statistics over the recorded samples

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod report;
pub mod runner;
pub mod workload;

pub use backend::{Backend, BtreeBackend, LsmBackend, MemoryBackend, SqliteBackend};
#[cfg(feature = "postgres")]
pub use backend::PostgresBackend;
pub use config::{BackendKind, BatchSpec, KeyPrefixPolicy, WriteMode};
pub use diagnostics::{DiagnosticSink, NoopSink, SharedSink, TracingSink};
pub use error::{BackendError, Error, Phase};
pub use report::{summarize, Report, Stats, Summary};
pub use runner::{RunOutcome, Runner, Sample, Session};
pub use workload::{generate, WorkloadItem};
