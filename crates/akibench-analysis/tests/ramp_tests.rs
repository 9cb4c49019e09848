//! End-to-end ramps against the mock transport

use std::sync::Arc;
use std::time::Duration;

use akibench_analysis::{
    find_knee, run_ramp, KneeThresholds, LoadLevel, RampPlan, RampReport, StepResult,
};
use akibench_core::{
    BenchConfig, BenchError, CancellationSignal, GeneratorConfig, MixedWorkload,
    MixedWorkloadConfig, MockTransport, RecorderConfig,
};
use akibench_engine::{build_generator, LoadGenerator, WarmupPolicy};
use proptest::prelude::*;

fn plan(stop_at_knee: bool) -> RampPlan {
    RampPlan {
        warmup: WarmupPolicy {
            iteration_duration: Duration::from_millis(100),
            max_iterations: 2,
            require_convergence: false,
            ..Default::default()
        },
        measurement: Duration::from_millis(300),
        // Loose throughput threshold to absorb scheduler noise on CI
        thresholds: KneeThresholds {
            max_throughput_delta: 0.5,
            ..Default::default()
        },
        stop_at_knee,
    }
}

/// Target whose service time grows linearly with the offered concurrency, so throughput is flat.
fn saturated_factory(level: LoadLevel) -> Result<Box<dyn LoadGenerator>, BenchError> {
    let LoadLevel::Concurrency(concurrency) = level else {
        return Err(BenchError::invalid_config("closed-loop levels only"));
    };
    let mut config = GeneratorConfig {
        seed: Some(42),
        ..Default::default()
    };
    level.apply(&mut config);

    build_generator(
        &config,
        &RecorderConfig::default(),
        Arc::new(MockTransport::with_latency(Duration::from_millis(
            2 * concurrency as u64,
        ))),
        Arc::new(MixedWorkload::new(MixedWorkloadConfig::default())?),
        CancellationSignal::new(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ramp_stops_at_knee() {
    let levels = [
        LoadLevel::Concurrency(2),
        LoadLevel::Concurrency(4),
        LoadLevel::Concurrency(8),
        LoadLevel::Concurrency(16),
    ];

    let report = run_ramp(&levels, saturated_factory, &plan(true)).await.unwrap();

    // p95 doubles from c=2 to c=4 while throughput stays flat
    let knee = report.knee.as_ref().expect("flat throughput must saturate");
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.warmups.len(), 2);
    assert!(knee.index <= 1);
    assert!(knee.reason.contains("Δp95"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ramp_runs_every_level_without_stop() {
    let levels = [LoadLevel::Concurrency(1), LoadLevel::Concurrency(2)];

    let report = run_ramp(&levels, saturated_factory, &plan(false)).await.unwrap();

    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[0].level, LoadLevel::Concurrency(1));
    for (step, warmup) in report.steps.iter().zip(&report.warmups) {
        assert!(step.completed > 0);
        assert_eq!(step.error_rate, 0.0);
        assert!(warmup.converged);
        // Warmup learnt a baseline, so normalised percentiles are populated
        assert!(step.normalized.p50 > 0.0);
    }

    let json = report.to_json().unwrap();
    let parsed: RampReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.steps.len(), 2);
}

#[tokio::test]
async fn test_ramp_rejects_invalid_thresholds() {
    let mut plan = plan(false);
    plan.thresholds.max_error_rate = -0.1;

    let result = run_ramp(&[LoadLevel::Concurrency(1)], saturated_factory, &plan).await;
    assert!(matches!(result, Err(BenchError::InvalidConfig { .. })));
}

#[tokio::test]
async fn test_ramp_propagates_factory_errors() {
    let result = run_ramp(&[LoadLevel::TargetRate(100.0)], saturated_factory, &plan(false)).await;
    assert!(result.unwrap_err().is_configuration());
}

#[test]
fn test_plan_from_config() {
    let config = BenchConfig::default();
    let plan = RampPlan::from_config(&config);

    assert_eq!(plan.measurement, Duration::from_secs(30));
    assert_eq!(plan.thresholds, KneeThresholds::default());
    assert_eq!(plan.warmup.max_iterations, 5);
    assert!(!plan.stop_at_knee);
}

proptest! {
    #[test]
    fn prop_knee_finder_never_panics(
        series in prop::collection::vec((0.0f64..100_000.0, 0.0f64..10_000.0, 0.0f64..1.0), 0..20)
    ) {
        let steps: Vec<StepResult> = series
            .iter()
            .enumerate()
            .map(|(i, &(thr, p95, err))| {
                StepResult::synthetic(LoadLevel::Concurrency(1 << i.min(16)), thr, p95, err)
            })
            .collect();

        if let Some(knee) = find_knee(&steps, &KneeThresholds::default()) {
            prop_assert!(knee.index < steps.len());
            prop_assert_eq!(&knee.step, &steps[knee.index]);
            prop_assert!(!knee.reason.is_empty());
        }
    }
}
