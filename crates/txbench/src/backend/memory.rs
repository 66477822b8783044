//! In-memory backend.
//!
//! Doubles as a baseline (the cost of the harness itself) and as the test
//! double for runner behavior: it counts every call and can fail on demand.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Backend;
use crate::diagnostics::SharedSink;
use crate::error::BackendError;

/// A failure to inject, addressed by transaction number.
///
/// Transactions are numbered by `begin` call, starting at zero, which matches
/// the runner's iteration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail the open call.
    Open,
    /// Fail `begin` of transaction `n`.
    Begin(usize),
    /// Fail the `item`-th staged write of transaction `iteration`.
    Write { iteration: usize, item: usize },
    /// Fail `commit` of transaction `n`.
    Commit(usize),
    /// Fail the cleanup inside `abort` of transaction `n`.
    Abort(usize),
}

/// Call counters observed by a [`MemoryProbe`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub opens: usize,
    pub begins: usize,
    pub writes: usize,
    pub batch_writes: usize,
    pub commits: usize,
    pub aborts: usize,
    pub closes: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    stats: MemoryStats,
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Shared view into a memory backend's state that outlives the handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryProbe {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProbe {
    /// Snapshot of the call counters.
    pub fn stats(&self) -> MemoryStats {
        self.state.lock().stats.clone()
    }

    /// Committed value for `key`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.lock().data.get(key).cloned()
    }

    /// Number of committed keys.
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memory backend configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    /// Faults to inject.
    pub faults: Vec<Fault>,

    /// Where counters and committed data are published.
    pub probe: MemoryProbe,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fault.
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }
}

/// Pending writes of one memory transaction.
#[derive(Debug)]
pub struct MemoryTxn {
    number: usize,
    staged: Vec<(Vec<u8>, Vec<u8>)>,
}

/// In-memory backend.
pub struct MemoryBackend {
    faults: Vec<Fault>,
    probe: MemoryProbe,
    sink: SharedSink,
    next_txn: usize,
    open: bool,
}

impl MemoryBackend {
    fn has_fault(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.open {
            Ok(())
        } else {
            Err(BackendError::Closed)
        }
    }
}

impl Backend for MemoryBackend {
    const NAME: &'static str = "memory";

    type Config = MemoryConfig;
    type Txn = MemoryTxn;

    fn open(config: &MemoryConfig, sink: SharedSink) -> Result<Self, BackendError> {
        if config.faults.contains(&Fault::Open) {
            return Err(BackendError::Injected("open".into()));
        }
        config.probe.state.lock().stats.opens += 1;

        Ok(Self {
            faults: config.faults.clone(),
            probe: config.probe.clone(),
            sink,
            next_txn: 0,
            open: true,
        })
    }

    fn begin(&mut self) -> Result<MemoryTxn, BackendError> {
        self.ensure_open()?;
        let number = self.next_txn;
        self.next_txn += 1;
        self.probe.state.lock().stats.begins += 1;

        if self.has_fault(Fault::Begin(number)) {
            return Err(BackendError::Injected(format!("begin {}", number)));
        }

        Ok(MemoryTxn {
            number,
            staged: Vec::new(),
        })
    }

    fn write(
        &mut self,
        txn: &mut MemoryTxn,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.probe.state.lock().stats.writes += 1;

        let item = txn.staged.len();
        if self.has_fault(Fault::Write {
            iteration: txn.number,
            item,
        }) {
            return Err(BackendError::Injected(format!(
                "write {} of txn {}",
                item, txn.number
            )));
        }

        txn.staged.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn write_batch(
        &mut self,
        txn: &mut MemoryTxn,
        items: &[crate::workload::WorkloadItem],
    ) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.probe.state.lock().stats.batch_writes += 1;

        for offset in 0..items.len() {
            let index = txn.staged.len() + offset;
            if self.has_fault(Fault::Write {
                iteration: txn.number,
                item: index,
            }) {
                return Err(BackendError::Injected(format!(
                    "batch item {} of txn {}",
                    index, txn.number
                )));
            }
        }

        txn.staged
            .extend(items.iter().map(|i| (i.key.clone(), i.value.clone())));
        Ok(())
    }

    fn commit(&mut self, txn: MemoryTxn) -> Result<(), BackendError> {
        self.ensure_open()?;
        let mut state = self.probe.state.lock();
        state.stats.commits += 1;

        if self.faults.contains(&Fault::Commit(txn.number)) {
            return Err(BackendError::Injected(format!("commit {}", txn.number)));
        }

        state.data.extend(txn.staged);
        Ok(())
    }

    fn abort(&mut self, txn: MemoryTxn) {
        self.probe.state.lock().stats.aborts += 1;
        if self.has_fault(Fault::Abort(txn.number)) {
            self.sink
                .warn(&format!("discarding txn {} failed (injected)", txn.number));
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.probe.state.lock().stats.closes += 1;
        }
    }
}
