//! Saturation ("knee") detection over a ramp
//!
//! The series is scanned from the lowest to the highest load. For each step, in order:
//!
//! 1. error rate above `max_error_rate`: the step is saturated outright
//! 2. throughput dropped while p95 rose: the previous step (the throughput peak) is the knee
//! 3. throughput gain at or below `max_throughput_delta` while p95 grew by more than
//!    `max_p95_delta`: the step is the knee
//!
//! Deltas are symmetric relative changes, `(cur - prev) / max(|cur|, |prev|)`.

use serde::{Deserialize, Serialize};

use akibench_core::{BenchError, BenchResult, KneeConfig};

use crate::step::StepResult;

/// Knee detection thresholds, all ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KneeThresholds {
    pub max_throughput_delta: f64,
    pub max_p95_delta: f64,
    pub max_error_rate: f64,
}

impl Default for KneeThresholds {
    fn default() -> Self {
        Self::from(&KneeConfig::default())
    }
}

impl From<&KneeConfig> for KneeThresholds {
    fn from(config: &KneeConfig) -> Self {
        Self {
            max_throughput_delta: config.max_throughput_delta,
            max_p95_delta: config.max_p95_delta,
            max_error_rate: config.max_error_rate,
        }
    }
}

impl KneeThresholds {
    pub fn validate(&self) -> BenchResult<()> {
        for (name, value) in [
            ("max_throughput_delta", self.max_throughput_delta),
            ("max_p95_delta", self.max_p95_delta),
            ("max_error_rate", self.max_error_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(BenchError::invalid_config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Which condition identified the knee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KneeTrigger {
    ErrorRate,
    ThroughputDrop,
    DiminishingReturns,
}

/// Saturation point of a ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knee {
    /// Position of `step` in the scanned series
    pub index: usize,
    pub step: StepResult,
    pub trigger: KneeTrigger,
    /// Human-readable verdict naming the deltas involved
    pub reason: String,
}

/// Symmetric relative change from `prev` to `cur`; 0 when both are 0.
pub fn relative_delta(prev: f64, cur: f64) -> f64 {
    let scale = prev.abs().max(cur.abs());
    if scale == 0.0 {
        0.0
    } else {
        (cur - prev) / scale
    }
}

/// Find the first saturated step of `steps`, ordered by increasing load.
///
/// Returns `None` when the system did not saturate within the tested range.
pub fn find_knee(steps: &[StepResult], thresholds: &KneeThresholds) -> Option<Knee> {
    for (index, step) in steps.iter().enumerate() {
        if step.error_rate > thresholds.max_error_rate {
            return Some(Knee {
                index,
                step: step.clone(),
                trigger: KneeTrigger::ErrorRate,
                reason: format!(
                    "error rate {:.2}% at {} exceeds {:.2}%",
                    step.error_rate * 100.0,
                    step.level,
                    thresholds.max_error_rate * 100.0
                ),
            });
        }

        let Some(prev) = index.checked_sub(1).map(|i| &steps[i]) else {
            continue;
        };
        let d_thr = relative_delta(prev.throughput, step.throughput);
        let d_p95 = relative_delta(prev.latency_ms.p95, step.latency_ms.p95);

        if d_thr < 0.0 && d_p95 > 0.0 {
            return Some(Knee {
                index: index - 1,
                step: prev.clone(),
                trigger: KneeTrigger::ThroughputDrop,
                reason: format!(
                    "Δthr {:+.1}% and Δp95 {:+.1}% from {} to {}: throughput fell while latency rose",
                    d_thr * 100.0,
                    d_p95 * 100.0,
                    prev.level,
                    step.level
                ),
            });
        }

        if d_thr <= thresholds.max_throughput_delta && d_p95 > thresholds.max_p95_delta {
            return Some(Knee {
                index,
                step: step.clone(),
                trigger: KneeTrigger::DiminishingReturns,
                reason: format!(
                    "Δthr {:+.1}% <= {:.1}% while Δp95 {:+.1}% > {:.1}% from {} to {}",
                    d_thr * 100.0,
                    thresholds.max_throughput_delta * 100.0,
                    d_p95 * 100.0,
                    thresholds.max_p95_delta * 100.0,
                    prev.level,
                    step.level
                ),
            });
        }
    }
    None
}
