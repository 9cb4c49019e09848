//! Per-level ramp results

use std::fmt;

use serde::{Deserialize, Serialize};

use akibench_core::{GeneratorConfig, GeneratorMode};
use akibench_engine::{LatencyPercentiles, LatencySnapshot, LoadGeneratorMetrics};

/// Load applied during one ramp step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    /// Closed-loop run with this many workers
    Concurrency(usize),

    /// Rate-paced run at this many operations per second
    TargetRate(f64),
}

impl LoadLevel {
    /// Apply this level to a generator configuration.
    ///
    /// A target rate also switches the generator to rate-paced mode; the worker count is kept.
    pub fn apply(&self, config: &mut GeneratorConfig) {
        match *self {
            Self::Concurrency(concurrency) => {
                config.mode = GeneratorMode::ClosedLoop;
                config.concurrency = concurrency;
            }
            Self::TargetRate(rps) => {
                config.mode = GeneratorMode::RatePaced;
                config.target_rps = rps;
            }
        }
    }

    /// Numeric value of the level, for logging and sorting.
    pub fn value(&self) -> f64 {
        match *self {
            Self::Concurrency(concurrency) => concurrency as f64,
            Self::TargetRate(rps) => rps,
        }
    }
}

impl fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concurrency(concurrency) => write!(f, "c={concurrency}"),
            Self::TargetRate(rps) => write!(f, "rps={rps}"),
        }
    }
}

/// Percentiles of one step. Units depend on the field holding the set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileSet {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
    pub max: f64,
}

impl PercentileSet {
    /// Convert microsecond percentiles to milliseconds.
    pub fn from_micros(percentiles: &LatencyPercentiles) -> Self {
        Self::scaled(percentiles, 1_000.0)
    }

    /// Express percentiles as multiples of `baseline_micros`; all zero without a baseline.
    pub fn normalized(percentiles: &LatencyPercentiles, baseline_micros: u64) -> Self {
        if baseline_micros == 0 {
            return Self::default();
        }
        Self::scaled(percentiles, baseline_micros as f64)
    }

    fn scaled(p: &LatencyPercentiles, divisor: f64) -> Self {
        Self {
            p50: p.p50 as f64 / divisor,
            p90: p.p90 as f64 / divisor,
            p95: p.p95 as f64 / divisor,
            p99: p.p99 as f64 / divisor,
            p999: p.p999 as f64 / divisor,
            max: p.max as f64 / divisor,
        }
    }
}

/// One point of a concurrency or rate ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub level: LoadLevel,

    /// Completed operations per second
    pub throughput: f64,

    /// errors / completed
    pub error_rate: f64,

    /// Latency percentiles in milliseconds
    pub latency_ms: PercentileSet,

    /// Latency percentiles as multiples of the warmup baseline
    pub normalized: PercentileSet,

    pub bytes_out: u64,
    pub bytes_in: u64,
    pub scheduled: u64,
    pub completed: u64,
}

impl StepResult {
    /// Assemble a step from one measurement phase.
    pub fn from_measurement(
        level: LoadLevel,
        metrics: &LoadGeneratorMetrics,
        snapshot: &LatencySnapshot,
        baseline_micros: u64,
    ) -> Self {
        let percentiles = snapshot.percentiles();
        Self {
            level,
            throughput: metrics.throughput,
            error_rate: metrics.error_rate,
            latency_ms: PercentileSet::from_micros(&percentiles),
            normalized: PercentileSet::normalized(&percentiles, baseline_micros),
            bytes_out: metrics.bytes_out,
            bytes_in: metrics.bytes_in,
            scheduled: metrics.scheduled,
            completed: metrics.completed,
        }
    }

    /// Minimal step for tests and synthetic series.
    pub fn synthetic(level: LoadLevel, throughput: f64, p95_ms: f64, error_rate: f64) -> Self {
        Self {
            level,
            throughput,
            error_rate,
            latency_ms: PercentileSet {
                p95: p95_ms,
                ..Default::default()
            },
            normalized: PercentileSet::default(),
            bytes_out: 0,
            bytes_in: 0,
            scheduled: 0,
            completed: 0,
        }
    }
}
