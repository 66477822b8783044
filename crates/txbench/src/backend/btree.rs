//! Embedded B-tree backend (redb).

use std::path::{Path, PathBuf};

use redb::{ReadableTableMetadata, TableDefinition, TableError};

use super::{Backend, DEFAULT_BUCKET};
use crate::diagnostics::SharedSink;
use crate::error::BackendError;
use crate::workload::WorkloadItem;

/// Default permission bits for a newly created database file.
pub const DEFAULT_FILE_MODE: u32 = 0o600;

/// B-tree backend configuration.
#[derive(Debug, Clone)]
pub struct BtreeConfig {
    /// Database file. Created if absent.
    pub path: PathBuf,

    /// Permission bits for a newly created file (unix only).
    pub mode: u32,

    /// Table the benchmark writes into.
    pub bucket: String,
}

impl BtreeConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: DEFAULT_FILE_MODE,
            bucket: DEFAULT_BUCKET.to_string(),
        }
    }

    /// Set the file mode.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Set the table name.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }
}

/// Open write transaction.
pub struct BtreeTxn {
    inner: redb::WriteTransaction,
}

/// redb-backed B-tree store.
pub struct BtreeBackend {
    db: Option<redb::Database>,
    bucket: String,
    sink: SharedSink,
}

fn table(bucket: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(bucket)
}

/// Create `path` with `mode` if it does not exist yet.
fn create_file(path: &Path, mode: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    options.open(path).map(|_| ())
}

impl BtreeBackend {
    fn db(&self) -> Result<&redb::Database, BackendError> {
        self.db.as_ref().ok_or(BackendError::Closed)
    }

    /// Committed value for `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let txn = self.db()?.begin_read().map_err(redb::Error::from)?;
        let table = match txn.open_table(table(&self.bucket)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(redb::Error::from(e).into()),
        };
        let value = table.get(key).map_err(redb::Error::from)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    /// Number of committed keys in the bucket.
    pub fn len(&self) -> Result<u64, BackendError> {
        let txn = self.db()?.begin_read().map_err(redb::Error::from)?;
        match txn.open_table(table(&self.bucket)) {
            Ok(table) => Ok(table.len().map_err(redb::Error::from)?),
            Err(TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(redb::Error::from(e).into()),
        }
    }

    pub fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }
}

impl Backend for BtreeBackend {
    const NAME: &'static str = "btree";

    type Config = BtreeConfig;
    type Txn = BtreeTxn;

    fn open(config: &BtreeConfig, sink: SharedSink) -> Result<Self, BackendError> {
        create_file(&config.path, config.mode)?;
        let db = redb::Database::create(&config.path).map_err(redb::Error::from)?;

        // Create the table up front so the first timed transaction does not pay for it.
        let setup = db.begin_write().map_err(redb::Error::from)?;
        setup
            .open_table(table(&config.bucket))
            .map_err(redb::Error::from)?;
        setup.commit().map_err(redb::Error::from)?;

        sink.info(&format!("opened {}", config.path.display()));

        Ok(Self {
            db: Some(db),
            bucket: config.bucket.clone(),
            sink,
        })
    }

    fn begin(&mut self) -> Result<BtreeTxn, BackendError> {
        let inner = self.db()?.begin_write().map_err(redb::Error::from)?;
        Ok(BtreeTxn { inner })
    }

    fn write(
        &mut self,
        txn: &mut BtreeTxn,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), BackendError> {
        let mut table = txn
            .inner
            .open_table(table(&self.bucket))
            .map_err(redb::Error::from)?;
        table.insert(key, value).map_err(redb::Error::from)?;
        Ok(())
    }

    fn write_batch(
        &mut self,
        txn: &mut BtreeTxn,
        items: &[WorkloadItem],
    ) -> Result<(), BackendError> {
        let mut table = txn
            .inner
            .open_table(table(&self.bucket))
            .map_err(redb::Error::from)?;
        for item in items {
            table
                .insert(item.key.as_slice(), item.value.as_slice())
                .map_err(redb::Error::from)?;
        }
        Ok(())
    }

    fn commit(&mut self, txn: BtreeTxn) -> Result<(), BackendError> {
        txn.inner.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn abort(&mut self, txn: BtreeTxn) {
        if let Err(e) = txn.inner.abort() {
            self.sink.warn(&format!("abort failed: {}", e));
        }
    }

    fn close(&mut self) {
        if self.db.take().is_some() {
            self.sink.info("closed");
        }
    }
}
