//! Benchmark configuration.

use serde::Serialize;

/// Default number of timed iterations per run.
pub const DEFAULT_ITERATION_COUNT: usize = 100;

/// Default number of key/value pairs written per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Whether generated keys embed the iteration index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPrefixPolicy {
    /// Keys are prefixed with the iteration index, so every iteration inserts
    /// fresh keys.
    #[default]
    PerIteration,
    /// Every iteration writes the same key set, so later iterations overwrite.
    Shared,
}

/// How a batch is staged inside its transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// One `write` call per item.
    #[default]
    PerItem,
    /// One `write_batch` call per iteration.
    Batch,
}

/// Storage engines the harness knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Embedded B-tree store (redb).
    Btree,
    /// Embedded log-structured store (sled).
    Lsm,
    /// Embedded relational store (SQLite).
    Sqlite,
    /// Relational store over the network (PostgreSQL).
    Postgres,
    /// In-memory map, measures harness overhead.
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Btree => "btree",
            BackendKind::Lsm => "lsm",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Postgres => "postgres",
            BackendKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of one run. Copied into the runner, so it cannot change mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSpec {
    /// Number of timed iterations.
    pub iteration_count: usize,

    /// Items written per iteration.
    pub batch_size: usize,

    /// Key collision policy across iterations.
    pub key_prefix_policy: KeyPrefixPolicy,

    /// Per-item or whole-batch staging.
    pub write_mode: WriteMode,
}

impl BatchSpec {
    /// `iteration_count` iterations of the default batch shape.
    pub fn new(iteration_count: usize) -> Self {
        Self {
            iteration_count,
            batch_size: DEFAULT_BATCH_SIZE,
            key_prefix_policy: KeyPrefixPolicy::default(),
            write_mode: WriteMode::default(),
        }
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the key prefix policy.
    pub fn with_key_prefix_policy(mut self, policy: KeyPrefixPolicy) -> Self {
        self.key_prefix_policy = policy;
        self
    }

    /// Set the write mode.
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }
}

impl Default for BatchSpec {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATION_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec() {
        let spec = BatchSpec::default();
        assert_eq!(spec.iteration_count, DEFAULT_ITERATION_COUNT);
        assert_eq!(spec.batch_size, 100);
        assert_eq!(spec.key_prefix_policy, KeyPrefixPolicy::PerIteration);
        assert_eq!(spec.write_mode, WriteMode::PerItem);
    }

    #[test]
    fn test_spec_builder() {
        let spec = BatchSpec::new(3)
            .with_batch_size(7)
            .with_key_prefix_policy(KeyPrefixPolicy::Shared)
            .with_write_mode(WriteMode::Batch);

        assert_eq!(spec.iteration_count, 3);
        assert_eq!(spec.batch_size, 7);
        assert_eq!(spec.key_prefix_policy, KeyPrefixPolicy::Shared);
        assert_eq!(spec.write_mode, WriteMode::Batch);
    }

    #[test]
    fn test_backend_kind_names() {
        assert_eq!(BackendKind::Btree.to_string(), "btree");
        assert_eq!(BackendKind::Lsm.to_string(), "lsm");
        assert_eq!(BackendKind::Postgres.as_str(), "postgres");
    }
}
