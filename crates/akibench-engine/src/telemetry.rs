//! Logging setup and Prometheus metrics for load runs
//!
//! Metrics are registered lazily on first access using `once_cell::sync::Lazy`, in the default
//! Prometheus registry, so an embedding service can expose them next to its own.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use tracing_subscriber::EnvFilter;

use akibench_core::LoggingConfig;

/// Operations executed, by operation kind and outcome (`ok` / `error`).
pub static OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akibench_operations_total",
        "Total number of operations executed against the target",
        &["kind", "outcome"]
    )
    .expect("Failed to register operations counter")
});

/// Operation latency histogram
pub static OPERATION_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "akibench_operation_latency_seconds",
        "Operation latency in seconds",
        &["kind"],
        // Buckets: 100us, 500us, 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 30s
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0]
    )
    .expect("Failed to register operation latency histogram")
});

/// Phases run, by generator and phase (`warmup` / `measurement`).
pub static PHASES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akibench_phases_total",
        "Total number of load phases run",
        &["generator", "phase"]
    )
    .expect("Failed to register phases counter")
});

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns false if a subscriber was already
/// installed (for example by an earlier test), which is not an error.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %config.level, "Logging initialized");
    }
    installed
}
