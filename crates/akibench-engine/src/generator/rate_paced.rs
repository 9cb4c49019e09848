//! Open-loop generator paced to a target request rate

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use akibench_core::{BenchError, BenchResult, CancellationSignal, RecorderConfig, Transport, Workload};

use super::{enqueue, GeneratorCore, LoadGenerator, Measurement, Phase, PhaseKind};
use crate::metrics::{LoadGeneratorMetrics, RollingRateSampler};
use crate::warmup::WarmupDiagnostics;

/// Waits at or below this are spun out with `yield_now` instead of a timer.
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// Window for the rolling completion-rate sample.
const ROLLING_WINDOW: Duration = Duration::from_secs(1);

/// Warmup runs at this share of the target rate.
const WARMUP_RATE_FACTOR: f64 = 0.5;

/// Releases one operation every `round(1e6 / target_rps)` microseconds.
///
/// When the scheduler falls behind (queue full, slow host) it resumes one interval from
/// "now" instead of issuing the missed operations in a burst.
pub struct RatePacedGenerator {
    core: GeneratorCore,
    target_rps: f64,
    /// Last interval resolved from a positive rate, 0 until then.
    resolved_interval_micros: AtomicU64,
}

impl RatePacedGenerator {
    pub fn new(
        transport: Arc<dyn Transport>,
        workload: Arc<dyn Workload>,
        concurrency: usize,
        target_rps: f64,
        recorder: RecorderConfig,
        cancel: CancellationSignal,
        seed: Option<u64>,
    ) -> BenchResult<Self> {
        let core = GeneratorCore::new(transport, workload, concurrency, recorder, cancel, seed)?;
        Self::from_core(core, target_rps)
    }

    pub(crate) fn from_core(core: GeneratorCore, target_rps: f64) -> BenchResult<Self> {
        if !target_rps.is_finite() || target_rps < 0.0 {
            return Err(BenchError::invalid_config(format!(
                "target_rps must be a finite value >= 0, got {target_rps}"
            )));
        }
        let generator = Self {
            core,
            target_rps,
            resolved_interval_micros: AtomicU64::new(0),
        };
        if target_rps > 0.0 {
            generator.resolve_interval(target_rps)?;
        }
        Ok(generator)
    }

    pub fn target_rps(&self) -> f64 {
        self.target_rps
    }

    pub fn concurrency(&self) -> usize {
        self.core.concurrency()
    }

    /// Inter-arrival interval in microseconds for `rate`.
    ///
    /// A positive rate gives `round(1e6 / rate)` (at least 1) and caches it. A zero rate
    /// reuses the cached interval and fails if none was resolved yet.
    pub fn resolve_interval(&self, rate: f64) -> BenchResult<u64> {
        if rate > 0.0 && rate.is_finite() {
            let interval = ((1_000_000.0 / rate).round() as u64).max(1);
            self.resolved_interval_micros.store(interval, Ordering::Release);
            return Ok(interval);
        }
        match self.resolved_interval_micros.load(Ordering::Acquire) {
            0 => Err(BenchError::invalid_config(
                "rate-paced generator needs a positive target rate",
            )),
            cached => Ok(cached),
        }
    }

    async fn run_phase(
        &self,
        kind: PhaseKind,
        rate: f64,
        duration: Duration,
    ) -> BenchResult<(Phase, LoadGeneratorMetrics)> {
        let interval_micros = self.resolve_interval(rate)?;
        let interval = Duration::from_micros(interval_micros);
        let correction_micros = match self.core.baseline() {
            0 => interval_micros,
            baseline => baseline,
        };

        let phase = self.core.begin_phase(kind)?;
        let (tx, handles) = self.core.spawn_workers(&phase, correction_micros);
        tracing::debug!(
            generator = self.name(),
            phase = kind.as_str(),
            rate,
            interval_micros,
            correction_micros,
            "Pacing phase"
        );

        let deadline = phase.started + duration;
        let cancel = self.core.cancel();
        let mut rng = self.core.rng();
        let mut sampler = RollingRateSampler::new(ROLLING_WINDOW, phase.started);
        let mut next_due = phase.started;

        loop {
            let now = Instant::now();
            sampler.observe(now, phase.counters.completed());
            if now >= deadline || cancel.is_cancelled() || phase.stop.is_cancelled() {
                break;
            }

            if now < next_due {
                let wait = next_due - now;
                if wait <= SPIN_THRESHOLD {
                    tokio::task::yield_now().await;
                } else {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = phase.stop.cancelled() => break,
                        _ = tokio::time::sleep_until(next_due.min(deadline)) => {}
                    }
                }
                continue;
            }

            let operation = self.core.next_operation(&mut rng);
            if !enqueue(&tx, operation, deadline, cancel, &phase.stop).await {
                break;
            }
            phase.counters.record_scheduled();

            next_due += interval;
            let now = Instant::now();
            if now >= next_due {
                // Behind schedule: skip the missed slots rather than bursting
                next_due = now + interval;
            }
        }

        drop(tx);
        self.core.join_workers(handles).await?;
        sampler.observe(Instant::now(), phase.counters.completed());

        let metrics = self.core.finish_phase(self.name(), &phase, sampler.finish());
        Ok((phase, metrics))
    }
}

#[async_trait]
impl LoadGenerator for RatePacedGenerator {
    fn name(&self) -> &'static str {
        "rate_paced"
    }

    async fn execute_warmup(&self, duration: Duration) -> BenchResult<WarmupDiagnostics> {
        let rate = self.target_rps * WARMUP_RATE_FACTOR;
        let (phase, metrics) = self.run_phase(PhaseKind::Warmup, rate, duration).await?;
        let diagnostics = GeneratorCore::warmup_diagnostics(&phase, &metrics);
        self.core.adopt_baseline(&phase);
        Ok(diagnostics)
    }

    async fn execute_measurement(&self, duration: Duration) -> BenchResult<Measurement> {
        let (phase, metrics) = self
            .run_phase(PhaseKind::Measurement, self.target_rps, duration)
            .await?;
        Ok(Measurement {
            recorder: phase.recorder,
            metrics,
        })
    }

    fn set_baseline_latency(&self, micros: u64) {
        self.core.set_baseline(micros);
    }

    fn baseline_latency(&self) -> u64 {
        self.core.baseline()
    }
}
