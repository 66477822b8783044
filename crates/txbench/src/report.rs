//! Summary statistics over recorded samples.
//!
//! Rendering is left to the caller; this module only computes numbers.

use std::time::Duration;

use crate::config::BatchSpec;
use crate::error::Error;
use crate::runner::{RunOutcome, Sample};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Aggregate statistics for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    /// Sample standard deviation; zero for a single sample.
    pub stdev: Duration,
    /// `batch_size / mean`. Zero when the mean rounds to zero.
    pub throughput_items_per_sec: f64,
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
    /// No iteration completed.
    NoSamples,
    Measured(Stats),
}

impl Summary {
    pub fn stats(&self) -> Option<&Stats> {
        match self {
            Summary::NoSamples => None,
            Summary::Measured(stats) => Some(stats),
        }
    }
}

/// Nearest-rank percentile over sorted durations.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// `Duration::from_nanos` for a `u128`, saturating at `Duration::MAX`.
fn duration_from_nanos(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}

/// Summarize `samples`, each of which wrote `batch_size` items.
pub fn summarize(samples: &[Sample], batch_size: usize) -> Summary {
    if samples.is_empty() {
        return Summary::NoSamples;
    }

    let count = samples.len();
    let mut sorted: Vec<Duration> = samples.iter().map(|s| s.duration).collect();
    sorted.sort_unstable();

    let total_nanos: u128 = sorted.iter().map(|d| d.as_nanos()).sum();
    let mean = duration_from_nanos(total_nanos / count as u128);

    let stdev = if count > 1 {
        let mean_f = total_nanos as f64 / count as f64;
        let sum_sq: f64 = sorted
            .iter()
            .map(|d| {
                let delta = d.as_nanos() as f64 - mean_f;
                delta * delta
            })
            .sum();
        Duration::from_nanos((sum_sq / (count - 1) as f64).sqrt() as u64)
    } else {
        Duration::ZERO
    };

    let throughput_items_per_sec = if mean.is_zero() {
        0.0
    } else {
        batch_size as f64 / mean.as_secs_f64()
    };

    Summary::Measured(Stats {
        count,
        mean,
        min: sorted[0],
        max: sorted[count - 1],
        p50: percentile(&sorted, 0.50),
        p95: percentile(&sorted, 0.95),
        stdev,
        throughput_items_per_sec,
    })
}

/// One line of a report.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub backend: String,
    pub spec: BatchSpec,
    pub summary: Summary,
    /// Iterations that committed.
    pub completed: usize,
    pub elapsed: Duration,
    /// Message of the error that stopped the run.
    pub error: Option<String>,
}

/// Summaries of several runs, in the order they ran.
#[derive(Debug, Clone, Default)]
pub struct Report {
    rows: Vec<ReportRow>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summarize `outcome` into a new row. A failed run still gets a row for
    /// the samples it recorded; its error is handed back to the caller.
    pub fn record(&mut self, outcome: RunOutcome) -> Result<(), Error> {
        let summary = outcome.summary();
        self.rows.push(ReportRow {
            backend: outcome.backend,
            spec: outcome.spec,
            summary,
            completed: outcome.samples.len(),
            elapsed: outcome.elapsed,
            error: outcome.error.as_ref().map(|e| e.to_string()),
        });

        match outcome.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Add a row for a backend that never opened.
    pub fn record_failure(&mut self, backend: impl Into<String>, spec: BatchSpec, error: &Error) {
        self.rows.push(ReportRow {
            backend: backend.into(),
            spec,
            summary: Summary::NoSamples,
            completed: 0,
            elapsed: Duration::ZERO,
            error: Some(error.to_string()),
        });
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    fn sample(iteration: usize, micros: u64) -> Sample {
        Sample {
            iteration,
            duration: Duration::from_micros(micros),
            items: 100,
        }
    }

    #[test]
    fn test_empty_has_no_samples() {
        assert_eq!(summarize(&[], 100), Summary::NoSamples);
        assert!(summarize(&[], 0).stats().is_none());
    }

    #[test]
    fn test_equal_durations() {
        let samples: Vec<_> = (0..5).map(|i| sample(i, 2_000)).collect();
        let summary = summarize(&samples, 100);
        let stats = summary.stats().unwrap();

        let d = Duration::from_micros(2_000);
        assert_eq!(stats.count, 5);
        assert_eq!(stats.mean, d);
        assert_eq!(stats.min, d);
        assert_eq!(stats.max, d);
        assert_eq!(stats.p50, d);
        assert_eq!(stats.p95, d);
        assert_eq!(stats.stdev, Duration::ZERO);
        assert_eq!(stats.throughput_items_per_sec, 100.0 / d.as_secs_f64());
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        let samples: Vec<_> = (1..=20).map(|i| sample(i as usize, i * 10)).collect();
        let stats = summarize(&samples, 1).stats().cloned().unwrap();

        assert_eq!(stats.min, Duration::from_micros(10));
        assert_eq!(stats.max, Duration::from_micros(200));
        assert_eq!(stats.p50, Duration::from_micros(100));
        assert_eq!(stats.p95, Duration::from_micros(190));
        assert_eq!(stats.mean, Duration::from_nanos(105_000));
    }

    #[test]
    fn test_stdev() {
        // 2, 4, 4, 4, 5, 5, 7, 9 ms: sample variance 32/7.
        let samples: Vec<_> = [2u64, 4, 4, 4, 5, 5, 7, 9]
            .iter()
            .enumerate()
            .map(|(i, ms)| sample(i, ms * 1_000))
            .collect();
        let stats = summarize(&samples, 100).stats().cloned().unwrap();

        let expected = (32.0f64 / 7.0).sqrt() * 1_000_000.0;
        let actual = stats.stdev.as_nanos() as f64;
        assert!((actual - expected).abs() < 2.0, "stdev {}", actual);
        assert_eq!(stats.mean, Duration::from_millis(5));
    }

    #[test]
    fn test_mean_of_long_durations() {
        let long = Duration::from_secs(u64::MAX / 2);
        let samples = [
            Sample {
                iteration: 0,
                duration: long,
                items: 1,
            },
            Sample {
                iteration: 1,
                duration: long,
                items: 1,
            },
        ];
        let stats = summarize(&samples, 1).stats().cloned().unwrap();

        assert_eq!(stats.mean, long);
        assert_eq!(stats.min, long);
        assert_eq!(stats.max, long);
        assert!(stats.min <= stats.mean && stats.mean <= stats.max);
    }

    #[test]
    fn test_duration_from_nanos_saturates() {
        assert_eq!(duration_from_nanos(1_500_000_000), Duration::from_millis(1_500));
        assert_eq!(duration_from_nanos(u128::MAX).as_secs(), u64::MAX);
    }

    #[test]
    fn test_zero_mean_throughput() {
        let samples = [Sample {
            iteration: 0,
            duration: Duration::ZERO,
            items: 0,
        }];
        let stats = summarize(&samples, 100).stats().cloned().unwrap();
        assert_eq!(stats.throughput_items_per_sec, 0.0);
    }

    #[test]
    fn test_report_keeps_failed_run() {
        let mut report = Report::new();
        let outcome = RunOutcome {
            backend: "memory".into(),
            spec: BatchSpec::new(5),
            samples: vec![sample(0, 10), sample(1, 10)],
            error: Some(Error::Commit {
                iteration: 2,
                source: BackendError::Injected("commit 2".into()),
            }),
            elapsed: Duration::from_micros(25),
        };

        let err = report.record(outcome).unwrap_err();
        assert!(matches!(err, Error::Commit { iteration: 2, .. }));

        let row = &report.rows()[0];
        assert_eq!(row.completed, 2);
        assert!(row.summary.stats().is_some());
        assert!(row.error.as_deref().unwrap().contains("iteration 2"));
    }
}
