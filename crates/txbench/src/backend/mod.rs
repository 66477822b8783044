//! Storage backends driven by the runner.
//!
//! Every engine is reduced to the same transactional write contract so one
//! runner can time all of them without engine-specific branches.

pub mod btree;
pub mod lsm;
pub mod memory;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use btree::{BtreeBackend, BtreeConfig};
pub use lsm::{LsmBackend, LsmConfig};
pub use memory::{Fault, MemoryBackend, MemoryConfig, MemoryProbe, MemoryStats};
pub use sqlite::{SqliteBackend, SqliteConfig};

#[cfg(feature = "postgres")]
pub use postgres::{PgSslMode, PostgresBackend, PostgresConfig};

use crate::diagnostics::SharedSink;
use crate::error::BackendError;
use crate::workload::WorkloadItem;

/// Default bucket / table / tree name for the embedded stores.
pub const DEFAULT_BUCKET: &str = "MyBucket";

/// Transactional key/value write contract.
///
/// Lifecycle: `open` → (`begin` → `write`* → `commit` | `abort`)* → `close`.
/// Transactions never overlap on one handle. Implementations are not required
/// to be `Sync`; confine each handle to one thread.
pub trait Backend: Send {
    /// Short name used in reports and diagnostics.
    const NAME: &'static str;

    /// Connection parameters.
    type Config;

    /// An open unit of work. Consumed by `commit` or `abort`.
    type Txn;

    /// Open the store and prepare the bucket or table writes go to.
    fn open(config: &Self::Config, sink: SharedSink) -> Result<Self, BackendError>
    where
        Self: Sized;

    fn name(&self) -> &str {
        Self::NAME
    }

    /// Start a write transaction.
    fn begin(&mut self) -> Result<Self::Txn, BackendError>;

    /// Stage one upsert. Not durable until `commit`.
    fn write(&mut self, txn: &mut Self::Txn, key: &[u8], value: &[u8])
        -> Result<(), BackendError>;

    /// Stage a whole batch in one call.
    fn write_batch(
        &mut self,
        txn: &mut Self::Txn,
        items: &[WorkloadItem],
    ) -> Result<(), BackendError> {
        for item in items {
            self.write(txn, &item.key, &item.value)?;
        }
        Ok(())
    }

    /// Atomically apply everything staged in `txn`.
    fn commit(&mut self, txn: Self::Txn) -> Result<(), BackendError>;

    /// Discard `txn`. Cleanup failures go to the diagnostic sink.
    fn abort(&mut self, txn: Self::Txn);

    /// Release the store. Calling it again does nothing.
    fn close(&mut self);
}

/// Borrow a UTF-8 view of a key or value for engines with text columns.
pub(crate) fn as_text<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str, BackendError> {
    std::str::from_utf8(bytes)
        .map_err(|e| BackendError::InvalidData(format!("{} is not valid UTF-8: {}", what, e)))
}

/// Validate a table or bucket name before it is spliced into SQL.
pub(crate) fn check_identifier(name: &str) -> Result<(), BackendError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidData(format!(
            "invalid table name: {:?}",
            name
        )))
    }
}
