//! Latency recording with coordinated-omission correction
//!
//! [`LatencyRecorder`] accumulates microsecond samples from many workers into HDR histograms,
//! one per runtime thread slot. [`LatencyRecorder::snapshot`] swaps each of them for an empty one
//! under its own short lock and hands back the merged interval as an immutable
//! [`LatencySnapshot`], so workers keep recording while the caller reads.
//!
//! # Coordinated omission
//!
//! A stalled response keeps a closed-loop or paced generator from issuing the requests that should
//! have happened during the stall. [`LatencyRecorder::record_with_expected_interval`] backfills
//! those missing samples (`value - k * interval` for every whole interval the observed value
//! exceeds the expected one), which is why a snapshot's count can exceed the number of real
//! operations.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use akibench_core::{BenchError, BenchResult, RecorderConfig};

/// Lowest value the recorder tracks, in microseconds.
pub const LOWEST_TRACKABLE_MICROS: u64 = 1;

/// Highest value the recorder tracks: 60 seconds in microseconds.
pub const HIGHEST_TRACKABLE_MICROS: u64 = 60_000_000;

/// Default histogram precision.
pub const DEFAULT_SIGNIFICANT_DIGITS: u8 = 3;

/// Upper bound on independently locked accumulators per recorder.
const MAX_SHARDS: usize = 16;

static NEXT_SHARD_HINT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Accumulator index for the current thread, assigned round-robin on first use.
    static SHARD_HINT: usize = NEXT_SHARD_HINT.fetch_add(1, Ordering::Relaxed);
}

/// Concurrent latency accumulator with interval snapshots.
///
/// Samples go to one of several accumulators, picked by the recording thread, each behind its own
/// lock. Writers on different runtime threads never contend, and a snapshot holds each lock only
/// for the swap.
pub struct LatencyRecorder {
    /// Empty when recording is disabled.
    shards: Vec<Mutex<Histogram<u64>>>,
    /// Empty histogram carrying the bounds; cloned into each new interval.
    template: Option<Histogram<u64>>,
}

impl LatencyRecorder {
    /// Create a recorder with the default precision (3 significant digits).
    pub fn new() -> BenchResult<Self> {
        Self::with_significant_digits(DEFAULT_SIGNIFICANT_DIGITS)
    }

    /// Create a recorder tracking 1us..=60s at the given precision.
    pub fn with_significant_digits(significant_digits: u8) -> BenchResult<Self> {
        if !(3..=5).contains(&significant_digits) {
            return Err(BenchError::invalid_config(format!(
                "recorder precision must be 3..=5 significant digits, got {significant_digits}"
            )));
        }

        let template = Histogram::<u64>::new_with_bounds(
            LOWEST_TRACKABLE_MICROS,
            HIGHEST_TRACKABLE_MICROS,
            significant_digits,
        )
        .map_err(|e| BenchError::Histogram(format!("{e:?}")))?;

        let shard_count = std::thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(MAX_SHARDS);
        Ok(Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(Histogram::new_from(&template)))
                .collect(),
            template: Some(template),
        })
    }

    /// Build a recorder from configuration; disabled configs yield [`LatencyRecorder::disabled`].
    pub fn from_config(config: &RecorderConfig) -> BenchResult<Self> {
        if config.enabled {
            Self::with_significant_digits(config.significant_digits)
        } else {
            Ok(Self::disabled())
        }
    }

    /// Recorder that drops every sample and always reports empty snapshots.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            shards: Vec::new(),
            template: None,
        }
    }

    /// Returns true unless the recorder was built with [`LatencyRecorder::disabled`].
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.template.is_some()
    }

    fn shard(&self) -> Option<&Mutex<Histogram<u64>>> {
        if self.shards.is_empty() {
            return None;
        }
        let hint = SHARD_HINT.with(|hint| *hint);
        self.shards.get(hint % self.shards.len())
    }

    /// Record one sample.
    ///
    /// Fails with [`BenchError::LatencyOutOfRange`] above 60s: that means the range is
    /// misconfigured for the target, and truncating would hide it.
    pub fn record(&self, micros: u64) -> BenchResult<()> {
        let Some(shard) = self.shard() else {
            return Ok(());
        };
        let value = Self::checked(micros)?;
        shard
            .lock()
            .record(value)
            .map_err(|_| BenchError::LatencyOutOfRange {
                value,
                max: HIGHEST_TRACKABLE_MICROS,
            })
    }

    /// Record one sample and backfill the samples a stall suppressed.
    ///
    /// With `micros <= expected_interval_micros` this is exactly one count. A zero interval
    /// disables the correction.
    pub fn record_with_expected_interval(
        &self,
        micros: u64,
        expected_interval_micros: u64,
    ) -> BenchResult<()> {
        let Some(shard) = self.shard() else {
            return Ok(());
        };
        let value = Self::checked(micros)?;
        let mut histogram = shard.lock();
        let result = if expected_interval_micros == 0 {
            histogram.record(value)
        } else {
            histogram.record_correct(value, expected_interval_micros)
        };
        result.map_err(|_| BenchError::LatencyOutOfRange {
            value,
            max: HIGHEST_TRACKABLE_MICROS,
        })
    }

    /// Close the current interval and return it.
    ///
    /// Each accumulator is swapped for an empty one under its own lock and the closed ones are
    /// merged outside any lock. A record racing with this call lands either in the returned
    /// snapshot or in the next one, never in both, because it touches exactly one accumulator.
    #[must_use]
    pub fn snapshot(&self) -> LatencySnapshot {
        let Some(template) = &self.template else {
            return LatencySnapshot::empty();
        };

        let mut merged = Histogram::new_from(template);
        for shard in &self.shards {
            let fresh = Histogram::new_from(template);
            let closed = std::mem::replace(&mut *shard.lock(), fresh);
            if closed.is_empty() {
                continue;
            }
            // Same bounds on both sides, so the merge cannot run out of range
            if let Err(e) = merged.add(&closed) {
                tracing::warn!(
                    error = ?e,
                    samples = closed.len(),
                    "Dropped samples while merging snapshot"
                );
            }
        }
        LatencySnapshot {
            histogram: Some(merged),
        }
    }

    fn checked(micros: u64) -> BenchResult<u64> {
        if micros > HIGHEST_TRACKABLE_MICROS {
            return Err(BenchError::LatencyOutOfRange {
                value: micros,
                max: HIGHEST_TRACKABLE_MICROS,
            });
        }
        Ok(micros.max(LOWEST_TRACKABLE_MICROS))
    }
}

impl std::fmt::Debug for LatencyRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyRecorder")
            .field("enabled", &self.is_enabled())
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// Immutable view of one closed recording interval. All values are microseconds.
#[derive(Debug, Clone)]
pub struct LatencySnapshot {
    histogram: Option<Histogram<u64>>,
}

impl LatencySnapshot {
    /// Snapshot with no samples.
    #[must_use]
    pub const fn empty() -> Self {
        Self { histogram: None }
    }

    fn populated(&self) -> Option<&Histogram<u64>> {
        self.histogram.as_ref().filter(|h| !h.is_empty())
    }

    /// Value at `percentile` (0-100, clamped). Empty snapshots report 0.
    #[must_use]
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        let percentile = if percentile.is_nan() {
            0.0
        } else {
            percentile.clamp(0.0, 100.0)
        };
        self.populated()
            .map_or(0, |h| h.value_at_percentile(percentile))
    }

    /// Largest recorded value (0 when empty).
    #[must_use]
    pub fn max(&self) -> u64 {
        self.populated().map_or(0, Histogram::max)
    }

    /// Smallest recorded value (0 when empty).
    #[must_use]
    pub fn min(&self) -> u64 {
        self.populated().map_or(0, Histogram::min)
    }

    /// Mean of recorded values (0 when empty).
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.populated().map_or(0.0, Histogram::mean)
    }

    /// Number of samples, including synthetic ones added by correction.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.populated().map_or(0, Histogram::len)
    }

    /// Returns true when no samples were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.populated().is_none()
    }

    /// Standard percentile set used by reports and ramp steps.
    #[must_use]
    pub fn percentiles(&self) -> LatencyPercentiles {
        LatencyPercentiles {
            p50: self.value_at_percentile(50.0),
            p90: self.value_at_percentile(90.0),
            p95: self.value_at_percentile(95.0),
            p99: self.value_at_percentile(99.0),
            p999: self.value_at_percentile(99.9),
            max: self.max(),
            mean: self.mean(),
            count: self.total_count(),
        }
    }

    /// Underlying histogram, for collaborators exporting histogram logs.
    #[must_use]
    pub fn histogram(&self) -> Option<&Histogram<u64>> {
        self.histogram.as_ref()
    }
}

/// Common percentiles of one snapshot, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
    pub max: u64,
    pub mean: f64,
    pub count: u64,
}
