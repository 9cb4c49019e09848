//! Load generation and latency measurement for akibench.
//!
//! A phase is driven by a [`LoadGenerator`] (closed-loop or rate-paced), which executes
//! operations through [`execute_operation`] and records successful latencies in a
//! [`LatencyRecorder`]. [`WarmupRunner`] repeats warmup phases until latency settles and the
//! learnt baseline is used for coordinated-omission correction during measurement.

pub mod counters;
pub mod execution;
pub mod generator;
pub mod metrics;
pub mod recorder;
pub mod telemetry;
pub mod warmup;

pub use counters::{CounterSnapshot, LoadGeneratorCounters};
pub use execution::{execute_operation, WorkItemResult};
pub use generator::{
    build_generator, ClosedLoopGenerator, LoadGenerator, Measurement, RatePacedGenerator,
};
pub use metrics::{LoadGeneratorMetrics, RollingRateSample, RollingRateSampler};
pub use recorder::{LatencyPercentiles, LatencyRecorder, LatencySnapshot};
pub use telemetry::init_logging;
pub use warmup::{
    evaluate_convergence, p95_drift, WarmupDiagnostics, WarmupFailureReason, WarmupPolicy,
    WarmupRunner, WarmupSummary,
};
