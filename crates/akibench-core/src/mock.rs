//! Simulated transport for tests and dry runs
//!
//! `MockTransport` answers every operation after a fixed delay and can inject failures and a
//! service stall, so generator behaviour can be exercised without a running target.
//!
//! # Features
//!
//! - **Latency Simulation**: fixed per-call delay
//! - **Deterministic Failures**: every n-th call reports an error
//! - **Random Failures**: seeded failure ratio (e.g. 30% fail)
//! - **Stall Window**: calls arriving inside a time window are held until it closes
//! - **Cancellation**: a call woken early by cancellation reports an error, never a short success
//! - **Call Counters**: total and failed calls for assertions
//!
//! # Example
//!
//! ```rust
//! use akibench_core::{CancellationSignal, MockTransport, MockTransportConfig, Operation, Transport};
//! use std::time::Duration;
//!
//! # async fn example() -> akibench_core::BenchResult<()> {
//! let mock = MockTransport::new(MockTransportConfig {
//!     latency: Duration::from_millis(1),
//!     error_every: Some(2),
//!     ..Default::default()
//! });
//! let cancel = CancellationSignal::new();
//!
//! assert!(!mock.execute(&Operation::Read { id: 1 }, &cancel).await?.is_error());
//! assert!(mock.execute(&Operation::Read { id: 2 }, &cancel).await?.is_error());
//! assert_eq!(mock.calls(), 2);
//! assert_eq!(mock.failed_calls(), 1);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::cancel::CancellationSignal;
use crate::error::BenchResult;
use crate::operation::Operation;
use crate::transport::{Transport, TransportOutcome};

/// Time window during which the simulated service stops answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockStall {
    /// Offset from the first call at which the stall begins.
    pub after: Duration,

    /// Length of the stall.
    pub length: Duration,
}

/// Mock transport configuration.
#[derive(Debug, Clone)]
pub struct MockTransportConfig {
    /// Simulated service time per call.
    pub latency: Duration,

    /// Every n-th call (1-based) fails.
    pub error_every: Option<u64>,

    /// Share of calls (0.0-1.0) that fail at random.
    pub error_ratio: f64,

    /// Seed for random failures.
    pub seed: u64,

    /// Optional stall window.
    pub stall: Option<MockStall>,

    /// Bytes returned by every successful call.
    pub response_bytes: u64,
}

impl Default for MockTransportConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(1),
            error_every: None,
            error_ratio: 0.0,
            seed: 0,
            stall: None,
            response_bytes: 256,
        }
    }
}

/// In-process transport with configurable latency and failure patterns.
pub struct MockTransport {
    config: MockTransportConfig,
    rng: Mutex<StdRng>,
    first_call: OnceLock<Instant>,
    calls: AtomicU64,
    failed: AtomicU64,
}

impl MockTransport {
    /// Create a mock with the given configuration.
    #[must_use]
    pub fn new(config: MockTransportConfig) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            config,
            first_call: OnceLock::new(),
            calls: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Create a mock that always succeeds after `latency`.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self::new(MockTransportConfig {
            latency,
            ..Default::default()
        })
    }

    /// Total calls received.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Calls that reported an error.
    #[must_use]
    pub fn failed_calls(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn should_fail(&self, call: u64) -> bool {
        if let Some(every) = self.config.error_every {
            if every > 0 && call % every == 0 {
                return true;
            }
        }
        self.config.error_ratio > 0.0 && self.rng.lock().gen::<f64>() < self.config.error_ratio
    }

    /// Remaining stall time for a call arriving now, if it lands inside the window.
    fn stall_remaining(&self, now: Instant) -> Option<Duration> {
        let stall = self.config.stall?;
        let origin = *self.first_call.get_or_init(|| now);
        let start = origin + stall.after;
        let end = start + stall.length;
        (now >= start && now < end).then(|| end - now)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        operation: &Operation,
        cancel: &CancellationSignal,
    ) -> BenchResult<TransportOutcome> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Instant::now();
        self.first_call.get_or_init(|| now);

        let delay = self.config.latency + self.stall_remaining(now).unwrap_or_default();
        let bytes_out = operation.payload_len();
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = cancel.cancelled() => !delay.is_zero(),
        };
        if interrupted {
            self.failed.fetch_add(1, Ordering::Relaxed);
            return Ok(TransportOutcome::failure(
                bytes_out,
                format!("call {call} cancelled before its response"),
            ));
        }

        if self.should_fail(call) {
            self.failed.fetch_add(1, Ordering::Relaxed);
            return Ok(TransportOutcome::failure(
                bytes_out,
                format!("simulated failure on call {call}"),
            ));
        }

        Ok(TransportOutcome::success(bytes_out, self.config.response_bytes))
    }
}
