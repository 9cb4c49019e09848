//! Ramp orchestration: one warmup and one measurement per load level, then knee detection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use akibench_core::{BenchConfig, BenchResult};
use akibench_engine::{
    LoadGenerator, WarmupFailureReason, WarmupPolicy, WarmupRunner, WarmupSummary,
};

use crate::knee::{find_knee, Knee, KneeThresholds};
use crate::step::{LoadLevel, StepResult};

/// How each ramp step is run.
#[derive(Debug, Clone)]
pub struct RampPlan {
    pub warmup: WarmupPolicy,
    pub measurement: Duration,
    pub thresholds: KneeThresholds,
    /// Skip the remaining levels once a knee is found
    pub stop_at_knee: bool,
}

impl RampPlan {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            warmup: WarmupPolicy::from(&config.warmup),
            measurement: config.measurement.duration(),
            thresholds: KneeThresholds::from(&config.knee),
            stop_at_knee: false,
        }
    }
}

/// Outcome of a ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampReport {
    /// Steps in the order they were run
    pub steps: Vec<StepResult>,
    /// Warmup outcome per step, aligned with `steps`
    pub warmups: Vec<WarmupSummary>,
    pub knee: Option<Knee>,
}

impl RampReport {
    pub fn to_json(&self) -> BenchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Run `levels` in order, building a fresh generator for each through `factory`.
///
/// Levels should be ordered by increasing load. A warmup that does not converge is logged and
/// the step is still measured; only configuration errors abort the ramp.
pub async fn run_ramp<F>(
    levels: &[LoadLevel],
    mut factory: F,
    plan: &RampPlan,
) -> BenchResult<RampReport>
where
    F: FnMut(LoadLevel) -> BenchResult<Box<dyn LoadGenerator>>,
{
    plan.thresholds.validate()?;
    let runner = WarmupRunner::new(plan.warmup.clone());
    let mut report = RampReport {
        steps: Vec::with_capacity(levels.len()),
        warmups: Vec::with_capacity(levels.len()),
        knee: None,
    };

    for &level in levels {
        let generator = factory(level)?;
        tracing::info!(%level, generator = generator.name(), "Starting ramp step");

        let warmup = runner.run(generator.as_ref()).await?;
        if !warmup.converged && warmup.reason != WarmupFailureReason::Disabled {
            tracing::warn!(%level, reason = ?warmup.reason, "Measuring without a converged warmup");
        }

        let measurement = generator.execute_measurement(plan.measurement).await?;
        let snapshot = measurement.recorder.snapshot();
        let step = StepResult::from_measurement(
            level,
            &measurement.metrics,
            &snapshot,
            generator.baseline_latency(),
        );
        tracing::info!(
            %level,
            throughput = step.throughput,
            error_rate = step.error_rate,
            p95_ms = step.latency_ms.p95,
            "Ramp step complete"
        );

        report.steps.push(step);
        report.warmups.push(warmup);

        if plan.stop_at_knee {
            if let Some(knee) = find_knee(&report.steps, &plan.thresholds) {
                tracing::info!(level = %knee.step.level, reason = %knee.reason, "Knee found, stopping ramp");
                report.knee = Some(knee);
                return Ok(report);
            }
        }
    }

    report.knee = find_knee(&report.steps, &plan.thresholds);
    match &report.knee {
        Some(knee) => tracing::info!(level = %knee.step.level, reason = %knee.reason, "Knee found"),
        None => tracing::info!(steps = report.steps.len(), "No saturation within the tested range"),
    }
    Ok(report)
}
