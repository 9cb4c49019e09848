//! Ramp analysis for akibench: per-level step results and saturation detection.

pub mod knee;
pub mod ramp;
pub mod step;

pub use knee::{find_knee, relative_delta, Knee, KneeThresholds, KneeTrigger};
pub use ramp::{run_ramp, RampPlan, RampReport};
pub use step::{LoadLevel, PercentileSet, StepResult};
