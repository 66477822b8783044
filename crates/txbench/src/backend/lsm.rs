//! Embedded log-structured backend (sled).
//!
//! A transaction is a `sled::Batch`: writes are staged in memory and applied
//! atomically to the tree on commit, optionally followed by a flush to disk.

use std::path::PathBuf;

use super::{Backend, DEFAULT_BUCKET};
use crate::diagnostics::SharedSink;
use crate::error::BackendError;
use crate::workload::WorkloadItem;

/// Log-structured backend configuration.
#[derive(Debug, Clone)]
pub struct LsmConfig {
    /// Database directory. Created if absent.
    pub path: PathBuf,

    /// Tree the benchmark writes into.
    pub bucket: String,

    /// Flush the log after every commit.
    pub flush_on_commit: bool,
}

impl LsmConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bucket: DEFAULT_BUCKET.to_string(),
            flush_on_commit: true,
        }
    }

    /// Set the tree name.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Enable or disable the per-commit flush.
    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }
}

/// Staged writes of one transaction.
#[derive(Default)]
pub struct LsmTxn {
    batch: sled::Batch,
}

struct Handle {
    db: sled::Db,
    tree: sled::Tree,
}

/// sled-backed log-structured store.
pub struct LsmBackend {
    handle: Option<Handle>,
    flush_on_commit: bool,
    sink: SharedSink,
}

impl LsmBackend {
    fn tree(&self) -> Result<&sled::Tree, BackendError> {
        self.handle
            .as_ref()
            .map(|h| &h.tree)
            .ok_or(BackendError::Closed)
    }

    /// Committed value for `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.tree()?.get(key)?.map(|v| v.to_vec()))
    }

    /// Number of committed keys in the tree.
    pub fn len(&self) -> Result<usize, BackendError> {
        Ok(self.tree()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.tree()?.is_empty())
    }
}

impl Backend for LsmBackend {
    const NAME: &'static str = "lsm";

    type Config = LsmConfig;
    type Txn = LsmTxn;

    fn open(config: &LsmConfig, sink: SharedSink) -> Result<Self, BackendError> {
        let db = sled::Config::new().path(&config.path).open()?;
        let tree = db.open_tree(config.bucket.as_bytes())?;

        sink.info(&format!("opened {}", config.path.display()));

        Ok(Self {
            handle: Some(Handle { db, tree }),
            flush_on_commit: config.flush_on_commit,
            sink,
        })
    }

    fn begin(&mut self) -> Result<LsmTxn, BackendError> {
        self.tree()?;
        Ok(LsmTxn::default())
    }

    fn write(&mut self, txn: &mut LsmTxn, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        txn.batch.insert(key, value);
        Ok(())
    }

    fn write_batch(&mut self, txn: &mut LsmTxn, items: &[WorkloadItem]) -> Result<(), BackendError> {
        for item in items {
            txn.batch.insert(item.key.as_slice(), item.value.as_slice());
        }
        Ok(())
    }

    fn commit(&mut self, txn: LsmTxn) -> Result<(), BackendError> {
        let tree = self.tree()?;
        tree.apply_batch(txn.batch)?;
        if self.flush_on_commit {
            tree.flush()?;
        }
        Ok(())
    }

    fn abort(&mut self, txn: LsmTxn) {
        // Nothing reached the tree yet.
        drop(txn);
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.db.flush() {
                self.sink.warn(&format!("flush on close failed: {}", e));
            }
            self.sink.info("closed");
        }
    }
}
