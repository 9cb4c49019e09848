//! Warmup convergence heuristics
//!
//! A warmup runs short iterations of the generator until latency stabilises. After each
//! iteration the collected [`WarmupDiagnostics`] are evaluated:
//!
//! - any iteration at or above the error-rate limit (20%) aborts with `HighErrorRate`
//! - without a convergence requirement any non-empty run is converged
//! - a single iteration is trivially converged
//! - otherwise the p95 drift between the last two iterations must be within 10%, and this must
//!   happen before the iteration budget is exhausted; reaching the budget reports
//!   `MaxIterations` even if the final comparison alone would pass

use std::time::Duration;

use serde::{Deserialize, Serialize};

use akibench_core::{BenchResult, WarmupConfig};

use crate::generator::LoadGenerator;

/// Error rate at which warmup gives up.
pub const DEFAULT_MAX_ERROR_RATE: f64 = 0.20;

/// Accepted relative p95 change between the last two iterations.
pub const DEFAULT_MAX_P95_DRIFT: f64 = 0.10;

/// Summary of one warmup iteration. Latencies are microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupDiagnostics {
    pub duration: Duration,
    pub throughput: f64,
    pub error_rate: f64,
    pub sample_count: u64,
    pub p50_micros: u64,
    pub p95_micros: u64,
    pub p99_micros: u64,
    pub max_micros: u64,
}

/// Why a warmup did not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupFailureReason {
    None,
    Disabled,
    MaxIterations,
    HighErrorRate,
    LatencyInstability,
}

/// Outcome of a warmup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupSummary {
    pub iterations: Vec<WarmupDiagnostics>,
    pub converged: bool,
    pub reason: WarmupFailureReason,
}

impl WarmupSummary {
    /// Sentinel for a warmup that never ran.
    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            iterations: Vec::new(),
            converged: false,
            reason: WarmupFailureReason::Disabled,
        }
    }

    fn converged(iterations: Vec<WarmupDiagnostics>) -> Self {
        Self {
            iterations,
            converged: true,
            reason: WarmupFailureReason::None,
        }
    }

    fn failed(iterations: Vec<WarmupDiagnostics>, reason: WarmupFailureReason) -> Self {
        Self {
            iterations,
            converged: false,
            reason,
        }
    }
}

/// Thresholds and budget for warmup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupPolicy {
    pub enabled: bool,
    pub iteration_duration: Duration,
    pub max_iterations: usize,
    pub require_convergence: bool,
    pub max_error_rate: f64,
    pub max_p95_drift: f64,
}

impl Default for WarmupPolicy {
    fn default() -> Self {
        Self::from(&WarmupConfig::default())
    }
}

impl From<&WarmupConfig> for WarmupPolicy {
    fn from(config: &WarmupConfig) -> Self {
        Self {
            enabled: config.enabled,
            iteration_duration: config.iteration_duration(),
            max_iterations: config.max_iterations,
            require_convergence: config.require_convergence,
            max_error_rate: config.max_error_rate,
            max_p95_drift: config.max_p95_drift,
        }
    }
}

impl WarmupPolicy {
    /// Decide convergence for the iterations collected so far.
    #[must_use]
    pub fn evaluate(&self, iterations: Vec<WarmupDiagnostics>) -> WarmupSummary {
        if iterations.is_empty() {
            return WarmupSummary::skipped();
        }

        if iterations
            .iter()
            .any(|it| it.error_rate >= self.max_error_rate)
        {
            return WarmupSummary::failed(iterations, WarmupFailureReason::HighErrorRate);
        }

        if !self.require_convergence || iterations.len() == 1 {
            return WarmupSummary::converged(iterations);
        }

        if self.max_iterations > 0 && iterations.len() >= self.max_iterations {
            return WarmupSummary::failed(iterations, WarmupFailureReason::MaxIterations);
        }

        let last = &iterations[iterations.len() - 1];
        let prev = &iterations[iterations.len() - 2];
        if self.is_stable(prev, last) {
            WarmupSummary::converged(iterations)
        } else {
            WarmupSummary::failed(iterations, WarmupFailureReason::LatencyInstability)
        }
    }

    fn is_stable(&self, prev: &WarmupDiagnostics, last: &WarmupDiagnostics) -> bool {
        if prev.sample_count == 0 || last.sample_count == 0 {
            return false;
        }
        p95_drift(prev, last) <= self.max_p95_drift
    }
}

/// `|p95[last] - p95[prev]| / max(p95[prev], 1)`.
#[must_use]
pub fn p95_drift(prev: &WarmupDiagnostics, last: &WarmupDiagnostics) -> f64 {
    let prev_p95 = prev.p95_micros as f64;
    (last.p95_micros as f64 - prev_p95).abs() / prev_p95.max(1.0)
}

/// Evaluate with the default thresholds (20% errors, 10% p95 drift).
#[must_use]
pub fn evaluate_convergence(
    iterations: Vec<WarmupDiagnostics>,
    require_convergence: bool,
    max_iterations: usize,
) -> WarmupSummary {
    WarmupPolicy {
        enabled: true,
        iteration_duration: Duration::ZERO,
        max_iterations,
        require_convergence,
        max_error_rate: DEFAULT_MAX_ERROR_RATE,
        max_p95_drift: DEFAULT_MAX_P95_DRIFT,
    }
    .evaluate(iterations)
}

/// Drives warmup iterations of a generator until the policy settles.
#[derive(Debug, Clone, Default)]
pub struct WarmupRunner {
    policy: WarmupPolicy,
}

impl WarmupRunner {
    #[must_use]
    pub const fn new(policy: WarmupPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &WarmupPolicy {
        &self.policy
    }

    /// Run warmup iterations on `generator`.
    ///
    /// Stops early on convergence (two comparable iterations) or on the error-rate abort. When
    /// convergence is not required a single iteration is run.
    pub async fn run(&self, generator: &dyn LoadGenerator) -> BenchResult<WarmupSummary> {
        if !self.policy.enabled || self.policy.max_iterations == 0 {
            tracing::info!("Warmup disabled");
            return Ok(WarmupSummary::skipped());
        }

        let budget = if self.policy.require_convergence {
            self.policy.max_iterations
        } else {
            1
        };

        let mut iterations = Vec::with_capacity(budget);
        for iteration in 1..=budget {
            let diagnostics = generator
                .execute_warmup(self.policy.iteration_duration)
                .await?;
            tracing::info!(
                generator = generator.name(),
                iteration,
                throughput = diagnostics.throughput,
                error_rate = diagnostics.error_rate,
                p95_micros = diagnostics.p95_micros,
                baseline_micros = generator.baseline_latency(),
                "Warmup iteration complete"
            );
            iterations.push(diagnostics);

            let summary = self.policy.evaluate(iterations.clone());
            let settled = summary.reason == WarmupFailureReason::HighErrorRate
                || (summary.converged && iterations.len() >= 2)
                || !self.policy.require_convergence;
            if settled {
                log_summary(&summary);
                return Ok(summary);
            }
        }

        let summary = self.policy.evaluate(iterations);
        log_summary(&summary);
        Ok(summary)
    }
}

fn log_summary(summary: &WarmupSummary) {
    if summary.converged {
        tracing::info!(iterations = summary.iterations.len(), "Warmup converged");
    } else {
        tracing::warn!(
            iterations = summary.iterations.len(),
            reason = ?summary.reason,
            "Warmup did not converge"
        );
    }
}
