//! Configuration management for akibench
//!
//! Settings are layered with the following precedence:
//! - Environment variables (`AKIBENCH_` prefix, `__` separator)
//! - File named by `AKIBENCH_CONFIG`
//! - `./config/akibench.{yaml,toml,json}`
//! - Built-in defaults

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure for a benchmark run
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BenchConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub warmup: WarmupConfig,

    #[serde(default)]
    pub measurement: MeasurementConfig,

    #[serde(default)]
    pub knee: KneeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchConfig {
    /// Load configuration from all sources (see module docs) and validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Ok(config_path) = std::env::var("AKIBENCH_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder
            .add_source(File::with_name("./config/akibench").required(false))
            // Example: AKIBENCH_GENERATOR__CONCURRENCY=32
            .add_source(
                Environment::with_prefix("AKIBENCH")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: BenchConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: BenchConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            // Generator
            .set_default("generator.mode", "closed_loop")?
            .set_default("generator.concurrency", 8)?
            .set_default("generator.target_rps", 0.0)?
            // Recorder
            .set_default("recorder.enabled", true)?
            .set_default("recorder.significant_digits", 3)?
            // Warmup
            .set_default("warmup.enabled", true)?
            .set_default("warmup.iteration_secs", 5)?
            .set_default("warmup.max_iterations", 5)?
            .set_default("warmup.require_convergence", true)?
            .set_default("warmup.max_error_rate", 0.20)?
            .set_default("warmup.max_p95_drift", 0.10)?
            // Measurement
            .set_default("measurement.duration_secs", 30)?
            // Knee
            .set_default("knee.max_throughput_delta", 0.05)?
            .set_default("knee.max_p95_delta", 0.20)?
            .set_default("knee.max_error_rate", 0.005)?
            // Logging
            .set_default("logging.level", "info")?
            .set_default("logging.with_target", false)?
            .set_default("logging.with_thread_ids", false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator.concurrency == 0 {
            return Err(ConfigError::Message(
                "generator.concurrency must be > 0".to_string(),
            ));
        }

        if !self.generator.target_rps.is_finite() || self.generator.target_rps < 0.0 {
            return Err(ConfigError::Message(
                "generator.target_rps must be a finite value >= 0".to_string(),
            ));
        }

        if self.generator.mode == GeneratorMode::RatePaced && self.generator.target_rps <= 0.0 {
            return Err(ConfigError::Message(
                "generator.target_rps must be > 0 in rate_paced mode".to_string(),
            ));
        }

        if !(3..=5).contains(&self.recorder.significant_digits) {
            return Err(ConfigError::Message(
                "recorder.significant_digits must be between 3 and 5".to_string(),
            ));
        }

        if self.warmup.enabled && self.warmup.max_iterations == 0 {
            return Err(ConfigError::Message(
                "warmup.max_iterations must be > 0 when warmup is enabled".to_string(),
            ));
        }

        let ratios = [
            ("warmup.max_error_rate", self.warmup.max_error_rate),
            ("warmup.max_p95_drift", self.warmup.max_p95_drift),
            ("knee.max_throughput_delta", self.knee.max_throughput_delta),
            ("knee.max_p95_delta", self.knee.max_p95_delta),
            ("knee.max_error_rate", self.knee.max_error_rate),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Message(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        Ok(())
    }
}

/// Scheduling discipline of the load generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorMode {
    /// Fixed number of operations in flight.
    #[default]
    ClosedLoop,
    /// Operations released on a fixed schedule.
    RatePaced,
}

/// Load generator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    /// Scheduling discipline
    #[serde(default)]
    pub mode: GeneratorMode,

    /// Number of workers (and queue capacity)
    pub concurrency: usize,

    /// Target operations per second for rate-paced runs (0 = unset)
    pub target_rps: f64,

    /// Seed for the workload random source; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            mode: GeneratorMode::ClosedLoop,
            concurrency: 8,
            target_rps: 0.0,
            seed: None,
        }
    }
}

/// Latency recorder configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecorderConfig {
    /// Disable to skip latency recording entirely (snapshots report zeros)
    pub enabled: bool,

    /// Histogram precision in significant decimal digits
    pub significant_digits: u8,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            significant_digits: 3,
        }
    }
}

/// Warmup phase configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WarmupConfig {
    /// Run a warmup phase before measuring
    pub enabled: bool,

    /// Length of each warmup iteration in seconds
    pub iteration_secs: u64,

    /// Iteration budget
    pub max_iterations: usize,

    /// Require p95 stability between iterations before measuring
    pub require_convergence: bool,

    /// Error rate (0.0-1.0) at which warmup aborts
    pub max_error_rate: f64,

    /// Accepted relative p95 drift between the last two iterations
    pub max_p95_drift: f64,
}

impl WarmupConfig {
    /// Duration of one warmup iteration
    #[must_use]
    pub fn iteration_duration(&self) -> Duration {
        Duration::from_secs(self.iteration_secs)
    }
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            iteration_secs: 5,
            max_iterations: 5,
            require_convergence: true,
            max_error_rate: 0.20,
            max_p95_drift: 0.10,
        }
    }
}

/// Measurement phase configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeasurementConfig {
    /// Length of the measurement window in seconds
    pub duration_secs: u64,
}

impl MeasurementConfig {
    /// Duration of the measurement window
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self { duration_secs: 30 }
    }
}

/// Saturation detection thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KneeConfig {
    /// Throughput gain at or below which scaling counts as stalled (0.05 = 5%)
    pub max_throughput_delta: f64,

    /// p95 growth above which latency counts as blowing up (0.20 = 20%)
    pub max_p95_delta: f64,

    /// Error rate above which a step is saturated outright (0.005 = 0.5%)
    pub max_error_rate: f64,
}

impl Default for KneeConfig {
    fn default() -> Self {
        Self {
            max_throughput_delta: 0.05,
            max_p95_delta: 0.20,
            max_error_rate: 0.005,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Include the event target in each line
    pub with_target: bool,

    /// Include the thread id in each line
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
            with_thread_ids: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = BenchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generator.concurrency, 8);
        assert_eq!(config.warmup.max_iterations, 5);
        assert_eq!(config.knee.max_p95_delta, 0.20);
        assert_eq!(config.measurement.duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = BenchConfig::default();
        config.generator.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_paced_requires_rate() {
        let mut config = BenchConfig::default();
        config.generator.mode = GeneratorMode::RatePaced;
        assert!(config.validate().is_err());

        config.generator.target_rps = 500.0;
        assert!(config.validate().is_ok());

        config.generator.target_rps = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_range() {
        let mut config = BenchConfig::default();
        config.knee.max_p95_delta = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("knee.max_p95_delta"));
    }

    #[test]
    fn test_significant_digits_range() {
        let mut config = BenchConfig::default();
        config.recorder.significant_digits = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[generator]
mode = "rate_paced"
concurrency = 16
target_rps = 250.0
seed = 42

[warmup]
max_iterations = 3
"#
        )
        .unwrap();

        let config = BenchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.generator.mode, GeneratorMode::RatePaced);
        assert_eq!(config.generator.concurrency, 16);
        assert_eq!(config.generator.target_rps, 250.0);
        assert_eq!(config.generator.seed, Some(42));
        assert_eq!(config.warmup.max_iterations, 3);
        // Untouched sections keep their defaults
        assert!(config.warmup.require_convergence);
        assert_eq!(config.knee.max_throughput_delta, 0.05);
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[generator]\nconcurrency = 0").unwrap();

        assert!(BenchConfig::from_file(file.path()).is_err());
    }
}
