//! Single-operation execution: timing, error classification and recording.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::time::Instant;

use akibench_core::{BenchResult, CancellationSignal, Operation, Transport, TransportOutcome};

use crate::recorder::LatencyRecorder;
use crate::telemetry::{OPERATIONS_TOTAL, OPERATION_LATENCY};

/// Outcome of one executed operation, folded into the phase counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItemResult {
    pub is_error: bool,
    pub bytes_out: u64,
    pub bytes_in: u64,
    /// Wall time of the call, rounded, at least 1us.
    pub latency_micros: u64,
}

impl WorkItemResult {
    /// Error result for an operation whose latency the recorder refused.
    #[must_use]
    pub const fn unrecorded(latency_micros: u64) -> Self {
        Self {
            is_error: true,
            bytes_out: 0,
            bytes_in: 0,
            latency_micros,
        }
    }
}

/// Run `operation` against `transport` and record its latency.
///
/// Transport failures are data: an `Err` from the transport, a populated
/// [`TransportOutcome::error`] and a panic inside the transport future all produce an error
/// result and never propagate. Only successful latencies reach the recorder, corrected for
/// coordinated omission when `baseline_micros > 0`.
///
/// The only error returned is a recorder range violation, which is a configuration mistake.
pub async fn execute_operation(
    transport: &dyn Transport,
    operation: &Operation,
    recorder: &LatencyRecorder,
    baseline_micros: u64,
    cancel: &CancellationSignal,
) -> BenchResult<WorkItemResult> {
    let started = Instant::now();
    let outcome = AssertUnwindSafe(transport.execute(operation, cancel))
        .catch_unwind()
        .await;
    let latency_micros = elapsed_micros(started);

    let outcome = match outcome {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            tracing::debug!(kind = %operation.kind(), error = %err, "transport returned an error");
            TransportOutcome::failure(0, err.to_string())
        }
        Err(_) => {
            tracing::warn!(kind = %operation.kind(), "transport panicked; counting as error");
            TransportOutcome::failure(0, "transport panicked")
        }
    };

    let is_error = outcome.is_error();
    let kind = operation.kind().as_str();
    OPERATIONS_TOTAL
        .with_label_values(&[kind, if is_error { "error" } else { "ok" }])
        .inc();

    if !is_error {
        OPERATION_LATENCY
            .with_label_values(&[kind])
            .observe(latency_micros as f64 / 1_000_000.0);
        if baseline_micros > 0 {
            recorder.record_with_expected_interval(latency_micros, baseline_micros)?;
        } else {
            recorder.record(latency_micros)?;
        }
    }

    Ok(WorkItemResult {
        is_error,
        bytes_out: outcome.bytes_out,
        bytes_in: outcome.bytes_in,
        latency_micros,
    })
}

fn elapsed_micros(started: Instant) -> u64 {
    let micros = (started.elapsed().as_nanos() as f64 / 1_000.0).round();
    (micros as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use akibench_core::{BenchError, MockTransport, MockTransportConfig};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn execute(
            &self,
            _operation: &Operation,
            _cancel: &CancellationSignal,
        ) -> BenchResult<TransportOutcome> {
            Err(BenchError::transport("connection refused"))
        }
    }

    struct PanickingTransport;

    #[async_trait]
    impl Transport for PanickingTransport {
        async fn execute(
            &self,
            _operation: &Operation,
            _cancel: &CancellationSignal,
        ) -> BenchResult<TransportOutcome> {
            panic!("driver bug");
        }
    }

    struct SlowTransport(Duration);

    #[async_trait]
    impl Transport for SlowTransport {
        async fn execute(
            &self,
            _operation: &Operation,
            _cancel: &CancellationSignal,
        ) -> BenchResult<TransportOutcome> {
            tokio::time::sleep(self.0).await;
            Ok(TransportOutcome::success(1, 1))
        }
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let transport = MockTransport::new(MockTransportConfig {
            latency: Duration::from_millis(2),
            response_bytes: 32,
            ..Default::default()
        });
        let recorder = LatencyRecorder::new().unwrap();
        let cancel = CancellationSignal::new();

        let result = execute_operation(&transport, &Operation::Read { id: 7 }, &recorder, 0, &cancel)
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.bytes_in, 32);
        assert!(result.latency_micros >= 2_000);
        assert_eq!(recorder.snapshot().total_count(), 1);
    }

    #[tokio::test]
    async fn test_reported_error_not_recorded() {
        let transport = MockTransport::new(MockTransportConfig {
            latency: Duration::ZERO,
            error_every: Some(1),
            ..Default::default()
        });
        let recorder = LatencyRecorder::new().unwrap();
        let cancel = CancellationSignal::new();

        let result = execute_operation(&transport, &Operation::Read { id: 1 }, &recorder, 0, &cancel)
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(result.bytes_in, 0);
        assert!(result.latency_micros >= 1);
        assert_eq!(recorder.snapshot().total_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_err_absorbed() {
        let recorder = LatencyRecorder::new().unwrap();
        let result = execute_operation(
            &FailingTransport,
            &Operation::Read { id: 1 },
            &recorder,
            0,
            &CancellationSignal::new(),
        )
        .await
        .unwrap();

        assert!(result.is_error);
        assert_eq!(result.bytes_out, 0);
        assert_eq!(recorder.snapshot().total_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_panic_absorbed() {
        let recorder = LatencyRecorder::new().unwrap();
        let result = execute_operation(
            &PanickingTransport,
            &Operation::Read { id: 1 },
            &recorder,
            0,
            &CancellationSignal::new(),
        )
        .await
        .unwrap();

        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_baseline_enables_correction() {
        let recorder = LatencyRecorder::new().unwrap();
        let transport = SlowTransport(Duration::from_millis(20));

        execute_operation(
            &transport,
            &Operation::Read { id: 1 },
            &recorder,
            1_000,
            &CancellationSignal::new(),
        )
        .await
        .unwrap();

        // One real sample plus ~19 backfilled ones
        let count = recorder.snapshot().total_count();
        assert!(count >= 19, "expected corrected samples, got {count}");
    }

    #[tokio::test]
    async fn test_disabled_recorder_still_counts() {
        let recorder = LatencyRecorder::disabled();
        let transport = MockTransport::with_latency(Duration::ZERO);
        let result = execute_operation(
            &transport,
            &Operation::Read { id: 1 },
            &recorder,
            0,
            &CancellationSignal::new(),
        )
        .await
        .unwrap();

        assert!(!result.is_error);
        assert_eq!(recorder.snapshot().total_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_beyond_range_is_returned() {
        let recorder = LatencyRecorder::new().unwrap();
        let err = execute_operation(
            &SlowTransport(Duration::from_secs(61)),
            &Operation::Read { id: 1 },
            &recorder,
            0,
            &CancellationSignal::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            BenchError::LatencyOutOfRange { value, .. } if value >= 61_000_000
        ));
        assert!(err.is_configuration());
        assert_eq!(recorder.snapshot().total_count(), 0);
    }
}
