//! Benchmark runner.
//!
//! Drives one backend through a strictly serial loop of write transactions and
//! times each of them. Nothing is retried: a failed iteration ends the run.

use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use crate::backend::Backend;
use crate::config::{BatchSpec, KeyPrefixPolicy, WriteMode};
use crate::diagnostics::{self, SharedSink};
use crate::error::{BackendError, Error};
use crate::report::{summarize, Summary};
use crate::workload::{generate, WorkloadItem};

/// One timed iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Iteration index, starting at zero.
    pub iteration: usize,
    /// Wall-clock time from workload generation through `commit`.
    pub duration: Duration,
    /// Items committed in the iteration.
    pub items: usize,
}

/// Result of one run: every sample recorded before the run stopped, and the
/// error that stopped it, if any.
#[derive(Debug)]
pub struct RunOutcome {
    pub backend: String,
    pub spec: BatchSpec,
    pub samples: Vec<Sample>,
    pub error: Option<Error>,
    /// Wall-clock time of the whole loop, open latency excluded.
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Whether every iteration committed.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Summary statistics over the recorded samples.
    pub fn summary(&self) -> Summary {
        summarize(&self.samples, self.spec.batch_size)
    }

    /// Samples on success, the fatal error otherwise.
    pub fn into_result(self) -> Result<Vec<Sample>, Error> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.samples),
        }
    }
}

/// An open backend that is closed exactly once when the session ends.
pub struct Session<B: Backend> {
    backend: B,
}

impl<B: Backend> Session<B> {
    /// Open a backend for the lifetime of the session.
    pub fn open(config: &B::Config, sink: SharedSink) -> Result<Self, BackendError> {
        Ok(Self {
            backend: B::open(config, sink)?,
        })
    }
}

impl<B: Backend> Deref for Session<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.backend
    }
}

impl<B: Backend> DerefMut for Session<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        self.backend.close();
    }
}

/// Builds the batch of one iteration.
type Generator = fn(usize, usize, KeyPrefixPolicy) -> Vec<WorkloadItem>;

/// Serial benchmark runner.
pub struct Runner {
    spec: BatchSpec,
    sink: SharedSink,
    generator: Generator,
}

impl Runner {
    /// Create a runner. Backends it opens get a silent diagnostic sink.
    pub fn new(spec: BatchSpec) -> Self {
        Self {
            spec,
            sink: diagnostics::noop(),
            generator: generate,
        }
    }

    #[cfg(test)]
    fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = generator;
        self
    }

    /// Set the diagnostic sink handed to backends opened by `run_backend`.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Open a backend, run the benchmark against it, and close it.
    ///
    /// The handle is closed on every path, including a failed run.
    pub fn run_backend<B: Backend>(&self, config: &B::Config) -> Result<RunOutcome, Error> {
        let mut session = Session::<B>::open(config, self.sink.clone()).map_err(|source| {
            Error::Connection {
                backend: B::NAME.to_string(),
                source,
            }
        })?;

        Ok(self.run(&mut *session))
    }

    /// Run every iteration against an already open backend.
    pub fn run<B: Backend>(&self, backend: &mut B) -> RunOutcome {
        let name = backend.name().to_string();
        tracing::info!(
            backend = %name,
            iterations = self.spec.iteration_count,
            batch_size = self.spec.batch_size,
            key_prefix = ?self.spec.key_prefix_policy,
            write_mode = ?self.spec.write_mode,
            "run started"
        );

        let mut samples = Vec::with_capacity(self.spec.iteration_count);
        let mut error = None;
        let started = Instant::now();

        for iteration in 0..self.spec.iteration_count {
            match self.run_iteration(backend, iteration) {
                Ok(sample) => {
                    tracing::debug!(
                        backend = %name,
                        iteration,
                        duration_us = sample.duration.as_micros() as u64,
                        "iteration committed"
                    );
                    samples.push(sample);
                }
                Err(e) => {
                    tracing::error!(backend = %name, phase = %e.phase(), error = %e, "run aborted");
                    error = Some(e);
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        tracing::info!(
            backend = %name,
            completed = samples.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "run finished"
        );

        RunOutcome {
            backend: name,
            spec: self.spec,
            samples,
            error,
            elapsed,
        }
    }

    /// Run and time a single iteration: generate the batch, begin, stage it,
    /// commit. Generation is part of the timed window.
    pub fn run_iteration<B: Backend>(
        &self,
        backend: &mut B,
        iteration: usize,
    ) -> Result<Sample, Error> {
        let start = Instant::now();
        let items = (self.generator)(
            iteration,
            self.spec.batch_size,
            self.spec.key_prefix_policy,
        );

        let mut txn = backend
            .begin()
            .map_err(|source| Error::Transaction { iteration, source })?;

        if let Err((item, source)) = self.stage(backend, &mut txn, &items) {
            backend.abort(txn);
            return Err(Error::Write {
                iteration,
                item,
                source,
            });
        }

        backend
            .commit(txn)
            .map_err(|source| Error::Commit { iteration, source })?;

        Ok(Sample {
            iteration,
            duration: start.elapsed(),
            items: items.len(),
        })
    }

    /// Stage `items` according to the write mode. On failure, returns the
    /// failing item index when it is known.
    fn stage<B: Backend>(
        &self,
        backend: &mut B,
        txn: &mut B::Txn,
        items: &[WorkloadItem],
    ) -> Result<(), (Option<usize>, BackendError)> {
        match self.spec.write_mode {
            WriteMode::PerItem => {
                for (index, item) in items.iter().enumerate() {
                    backend
                        .write(txn, &item.key, &item.value)
                        .map_err(|e| (Some(index), e))?;
                }
                Ok(())
            }
            WriteMode::Batch => backend.write_batch(txn, items).map_err(|e| (None, e)),
        }
    }
}
