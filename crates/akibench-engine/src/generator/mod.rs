//! Load generators
//!
//! Both disciplines share one shape per phase: a single scheduling task feeds a bounded queue of
//! capacity `concurrency`, and `concurrency` workers drain it through the execution helper.
//!
//! - [`ClosedLoopGenerator`] enqueues as fast as the queue accepts, so the queue's backpressure
//!   bounds the work in flight.
//! - [`RatePacedGenerator`] releases operations on a fixed schedule and never bursts to catch up
//!   after falling behind.
//!
//! Every phase builds fresh counters and a fresh recorder. Closing the queue ends a phase;
//! workers drain what is queued before exiting, including after cancellation.
//!
//! A worker that hits a configuration error raises the phase's own stop signal. The scheduler
//! stops producing at once, the queue is drained and the error is returned to the caller.

mod closed_loop;
mod rate_paced;

pub use closed_loop::ClosedLoopGenerator;
pub use rate_paced::RatePacedGenerator;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use akibench_core::{
    BenchError, BenchResult, CancellationSignal, GeneratorConfig, GeneratorMode, Operation,
    RecorderConfig, Transport, Workload,
};

use crate::counters::LoadGeneratorCounters;
use crate::execution::{execute_operation, WorkItemResult};
use crate::metrics::{LoadGeneratorMetrics, RollingRateSample};
use crate::recorder::{LatencyRecorder, HIGHEST_TRACKABLE_MICROS, LOWEST_TRACKABLE_MICROS};
use crate::telemetry::PHASES_TOTAL;
use crate::warmup::WarmupDiagnostics;

/// Output of a measurement phase.
#[derive(Debug)]
pub struct Measurement {
    /// Recorder holding the measurement window; call `snapshot()` to read it.
    pub recorder: Arc<LatencyRecorder>,
    pub metrics: LoadGeneratorMetrics,
}

/// Contract shared by every scheduling discipline.
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    /// Short label for logs and metrics.
    fn name(&self) -> &'static str;

    /// Run one warmup iteration and adopt its median as the baseline latency.
    async fn execute_warmup(&self, duration: Duration) -> BenchResult<WarmupDiagnostics>;

    /// Run the measurement window.
    async fn execute_measurement(&self, duration: Duration) -> BenchResult<Measurement>;

    /// Override the baseline used for coordinated-omission correction (0 disables it).
    fn set_baseline_latency(&self, micros: u64);

    /// Current baseline latency in microseconds (0 when unset).
    fn baseline_latency(&self) -> u64;
}

/// Build the generator selected by `config.mode`.
pub fn build_generator(
    config: &GeneratorConfig,
    recorder: &RecorderConfig,
    transport: Arc<dyn Transport>,
    workload: Arc<dyn Workload>,
    cancel: CancellationSignal,
) -> BenchResult<Box<dyn LoadGenerator>> {
    let core = GeneratorCore::new(
        transport,
        workload,
        config.concurrency,
        recorder.clone(),
        cancel,
        config.seed,
    )?;
    Ok(match config.mode {
        GeneratorMode::ClosedLoop => Box::new(ClosedLoopGenerator::from_core(core)),
        GeneratorMode::RatePaced => {
            Box::new(RatePacedGenerator::from_core(core, config.target_rps)?)
        }
    })
}

/// Phase kind, used for labels and to decide whether a baseline is learnt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhaseKind {
    Warmup,
    Measurement,
}

impl PhaseKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Measurement => "measurement",
        }
    }
}

/// Per-phase state shared with the workers.
pub(crate) struct Phase {
    pub kind: PhaseKind,
    pub recorder: Arc<LatencyRecorder>,
    pub counters: Arc<LoadGeneratorCounters>,
    /// Successful latencies only, warmup only; its median becomes the baseline.
    baseline_histogram: Option<Arc<Mutex<Histogram<u64>>>>,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
    /// Raised by the first worker error; scoped to this phase, unlike the run-wide cancel.
    pub stop: CancellationSignal,
}

/// State common to both generators.
pub(crate) struct GeneratorCore {
    transport: Arc<dyn Transport>,
    workload: Arc<dyn Workload>,
    concurrency: usize,
    recorder: RecorderConfig,
    cancel: CancellationSignal,
    seed: Option<u64>,
    baseline_micros: AtomicU64,
}

impl GeneratorCore {
    pub fn new(
        transport: Arc<dyn Transport>,
        workload: Arc<dyn Workload>,
        concurrency: usize,
        recorder: RecorderConfig,
        cancel: CancellationSignal,
        seed: Option<u64>,
    ) -> BenchResult<Self> {
        if concurrency == 0 {
            return Err(BenchError::invalid_config("concurrency must be > 0"));
        }
        Ok(Self {
            transport,
            workload,
            concurrency,
            recorder,
            cancel,
            seed,
            baseline_micros: AtomicU64::new(0),
        })
    }

    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancel(&self) -> &CancellationSignal {
        &self.cancel
    }

    pub fn baseline(&self) -> u64 {
        self.baseline_micros.load(Ordering::Acquire)
    }

    pub fn set_baseline(&self, micros: u64) {
        self.baseline_micros.store(micros, Ordering::Release);
    }

    pub fn next_operation(&self, rng: &mut StdRng) -> Operation {
        self.workload.next_operation(rng)
    }

    /// Workload random source; a fixed seed gives every phase the same sequence.
    pub fn rng(&self) -> StdRng {
        self.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
    }

    pub fn begin_phase(&self, kind: PhaseKind) -> BenchResult<Phase> {
        let baseline_histogram = match kind {
            PhaseKind::Warmup => Some(Arc::new(Mutex::new(
                Histogram::<u64>::new_with_bounds(
                    LOWEST_TRACKABLE_MICROS,
                    HIGHEST_TRACKABLE_MICROS,
                    2,
                )
                .map_err(|e| BenchError::Histogram(format!("{e:?}")))?,
            ))),
            PhaseKind::Measurement => None,
        };

        Ok(Phase {
            kind,
            recorder: Arc::new(LatencyRecorder::from_config(&self.recorder)?),
            counters: Arc::new(LoadGeneratorCounters::new()),
            baseline_histogram,
            started_at: Utc::now(),
            started: Instant::now(),
            stop: CancellationSignal::new(),
        })
    }

    /// Open the bounded queue and start the workers for `phase`.
    pub fn spawn_workers(
        &self,
        phase: &Phase,
        correction_interval_micros: u64,
    ) -> (mpsc::Sender<Operation>, Vec<JoinHandle<BenchResult<()>>>) {
        let (tx, rx) = mpsc::channel::<Operation>(self.concurrency.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..self.concurrency)
            .map(|_| {
                let rx = Arc::clone(&rx);
                let transport = Arc::clone(&self.transport);
                let recorder = Arc::clone(&phase.recorder);
                let counters = Arc::clone(&phase.counters);
                let baseline_histogram = phase.baseline_histogram.clone();
                let cancel = self.cancel.clone();
                let stop = phase.stop.clone();

                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(operation) = next else {
                            break;
                        };

                        let executed = execute_operation(
                            transport.as_ref(),
                            &operation,
                            &recorder,
                            correction_interval_micros,
                            &cancel,
                        )
                        .await;
                        let result = match executed {
                            Ok(result) => result,
                            Err(err) => {
                                let latency_micros = match &err {
                                    BenchError::LatencyOutOfRange { value, .. } => *value,
                                    _ => 1,
                                };
                                counters.record(&WorkItemResult::unrecorded(latency_micros));
                                if !stop.is_cancelled() {
                                    tracing::warn!(error = %err, "Stopping phase after worker error");
                                }
                                stop.cancel();
                                return Err(err);
                            }
                        };
                        counters.record(&result);

                        if let Some(histogram) = &baseline_histogram {
                            if !result.is_error {
                                histogram.lock().saturating_record(result.latency_micros);
                            }
                        }
                    }
                    Ok::<(), BenchError>(())
                })
            })
            .collect();

        (tx, handles)
    }

    /// Wait for every worker; the first failure wins.
    pub async fn join_workers(&self, handles: Vec<JoinHandle<BenchResult<()>>>) -> BenchResult<()> {
        let mut first_error = None;
        for joined in join_all(handles).await {
            let outcome = joined
                .map_err(|e| BenchError::WorkerPanicked(e.to_string()))
                .and_then(|result| result);
            if let Err(err) = outcome {
                tracing::error!(error = %err, "Worker failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Close out a phase after its workers were joined.
    pub fn finish_phase(
        &self,
        generator: &'static str,
        phase: &Phase,
        rolling_rate: Option<RollingRateSample>,
    ) -> LoadGeneratorMetrics {
        let elapsed = phase.started.elapsed();
        let metrics = LoadGeneratorMetrics::from_counters(
            phase.counters.snapshot(),
            phase.started_at,
            elapsed,
            rolling_rate,
        );
        PHASES_TOTAL
            .with_label_values(&[generator, phase.kind.as_str()])
            .inc();
        tracing::info!(
            generator,
            phase = phase.kind.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            scheduled = metrics.scheduled,
            completed = metrics.completed,
            errors = metrics.errors,
            throughput = metrics.throughput,
            cancelled = self.cancel.is_cancelled(),
            "Phase complete"
        );
        metrics
    }

    /// Adopt the warmup median as the new baseline.
    ///
    /// Ignored when no successful sample was seen or the median is not positive.
    pub fn adopt_baseline(&self, phase: &Phase) {
        let Some(histogram) = &phase.baseline_histogram else {
            return;
        };
        let median = {
            let histogram = histogram.lock();
            if histogram.is_empty() {
                return;
            }
            histogram.value_at_quantile(0.5)
        };
        if median == 0 {
            return;
        }
        let previous = self.baseline_micros.swap(median, Ordering::AcqRel);
        tracing::debug!(previous, baseline_micros = median, "Baseline latency updated");
    }

    /// Summarise a warmup phase from its recorder and metrics.
    pub fn warmup_diagnostics(phase: &Phase, metrics: &LoadGeneratorMetrics) -> WarmupDiagnostics {
        let snapshot = phase.recorder.snapshot();
        WarmupDiagnostics {
            duration: metrics.elapsed,
            throughput: metrics.throughput,
            error_rate: metrics.error_rate,
            sample_count: snapshot.total_count(),
            p50_micros: snapshot.value_at_percentile(50.0),
            p95_micros: snapshot.value_at_percentile(95.0),
            p99_micros: snapshot.value_at_percentile(99.0),
            max_micros: snapshot.max(),
        }
    }
}

/// Send `operation` unless the deadline passes, the run is cancelled or the phase is stopped.
///
/// Returns false when the phase must stop producing.
pub(crate) async fn enqueue(
    tx: &mpsc::Sender<Operation>,
    operation: Operation,
    deadline: Instant,
    cancel: &CancellationSignal,
    stop: &CancellationSignal,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep_until(deadline) => false,
        sent = tx.send(operation) => sent.is_ok(),
    }
}
