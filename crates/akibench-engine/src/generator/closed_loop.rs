//! Fixed-concurrency generator

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use akibench_core::{BenchResult, CancellationSignal, RecorderConfig, Transport, Workload};

use super::{enqueue, GeneratorCore, LoadGenerator, Measurement, Phase, PhaseKind};
use crate::metrics::LoadGeneratorMetrics;
use crate::warmup::WarmupDiagnostics;

/// Keeps at most `concurrency` operations in flight.
///
/// The scheduler pushes into a queue of capacity `concurrency` as fast as it accepts;
/// a full queue suspends the scheduler until a worker frees a slot.
pub struct ClosedLoopGenerator {
    core: GeneratorCore,
}

impl ClosedLoopGenerator {
    pub fn new(
        transport: Arc<dyn Transport>,
        workload: Arc<dyn Workload>,
        concurrency: usize,
        recorder: RecorderConfig,
        cancel: CancellationSignal,
        seed: Option<u64>,
    ) -> BenchResult<Self> {
        let core = GeneratorCore::new(transport, workload, concurrency, recorder, cancel, seed)?;
        Ok(Self::from_core(core))
    }

    pub(crate) fn from_core(core: GeneratorCore) -> Self {
        Self { core }
    }

    pub fn concurrency(&self) -> usize {
        self.core.concurrency()
    }

    async fn run_phase(
        &self,
        kind: PhaseKind,
        duration: Duration,
    ) -> BenchResult<(Phase, LoadGeneratorMetrics)> {
        let phase = self.core.begin_phase(kind)?;
        let (tx, handles) = self.core.spawn_workers(&phase, self.core.baseline());

        let deadline = phase.started + duration;
        let cancel = self.core.cancel();
        let mut rng = self.core.rng();

        while Instant::now() < deadline && !cancel.is_cancelled() && !phase.stop.is_cancelled() {
            let operation = self.core.next_operation(&mut rng);
            if !enqueue(&tx, operation, deadline, cancel, &phase.stop).await {
                break;
            }
            phase.counters.record_scheduled();
        }

        drop(tx);
        self.core.join_workers(handles).await?;

        let metrics = self.core.finish_phase(self.name(), &phase, None);
        Ok((phase, metrics))
    }
}

#[async_trait]
impl LoadGenerator for ClosedLoopGenerator {
    fn name(&self) -> &'static str {
        "closed_loop"
    }

    async fn execute_warmup(&self, duration: Duration) -> BenchResult<WarmupDiagnostics> {
        let (phase, metrics) = self.run_phase(PhaseKind::Warmup, duration).await?;
        let diagnostics = GeneratorCore::warmup_diagnostics(&phase, &metrics);
        self.core.adopt_baseline(&phase);
        Ok(diagnostics)
    }

    async fn execute_measurement(&self, duration: Duration) -> BenchResult<Measurement> {
        let (phase, metrics) = self.run_phase(PhaseKind::Measurement, duration).await?;
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
