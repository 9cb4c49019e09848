//! Phase summaries derived from the shared counters

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::counters::CounterSnapshot;

/// Assumed link speed for network utilization: 1 Gbps.
pub const LINK_BITS_PER_SEC: f64 = 1e9;

/// Summary of one warmup iteration or measurement window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadGeneratorMetrics {
    /// Wall-clock start of the phase
    pub started_at: DateTime<Utc>,

    /// Actual phase length, including the drain of queued work
    pub elapsed: Duration,

    /// Completed operations per second
    pub throughput: f64,

    /// errors / completed (0.0-1.0), 0 when nothing completed
    pub error_rate: f64,

    pub bytes_out: u64,
    pub bytes_in: u64,

    /// Share of a 1 Gbps link used (0-100)
    pub network_utilization_pct: f64,

    /// Operations handed to the worker queue
    pub scheduled: u64,

    /// Operations that finished, successful or not
    pub completed: u64,

    pub errors: u64,

    /// Per-window completion rate, open-loop only
    pub rolling_rate: Option<RollingRateSample>,
}

impl LoadGeneratorMetrics {
    /// Build metrics from final counter values and the measured phase length.
    #[must_use]
    pub fn from_counters(
        counters: CounterSnapshot,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        rolling_rate: Option<RollingRateSample>,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            counters.completed as f64 / secs
        } else {
            0.0
        };
        let error_rate = if counters.completed > 0 {
            counters.errors as f64 / counters.completed as f64
        } else {
            0.0
        };

        Self {
            started_at,
            elapsed,
            throughput,
            error_rate,
            bytes_out: counters.bytes_out,
            bytes_in: counters.bytes_in,
            network_utilization_pct: network_utilization_pct(
                counters.bytes_out + counters.bytes_in,
                elapsed,
            ),
            scheduled: counters.scheduled,
            completed: counters.completed,
            errors: counters.errors,
            rolling_rate,
        }
    }
}

/// Percentage of a 1 Gbps link consumed by `bytes` over `elapsed`, capped at 100.
#[must_use]
pub fn network_utilization_pct(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let bits_per_sec = (bytes as f64 * 8.0) / secs;
    (bits_per_sec / LINK_BITS_PER_SEC * 100.0).min(100.0)
}

/// Completion rate observed in consecutive fixed windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingRateSample {
    pub window: Duration,
    /// Operations per second, one entry per closed window
    pub samples: Vec<f64>,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Turns periodic observations of a monotonically increasing counter into per-window rates.
#[derive(Debug)]
pub struct RollingRateSampler {
    window: Duration,
    window_start: Instant,
    count_at_start: u64,
    samples: Vec<f64>,
}

impl RollingRateSampler {
    #[must_use]
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            window_start: now,
            count_at_start: 0,
            samples: Vec::new(),
        }
    }

    /// Close every window that ended before `now`.
    pub fn observe(&mut self, now: Instant, count: u64) {
        if self.window.is_zero() {
            return;
        }
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return;
        }
        let rate = count.saturating_sub(self.count_at_start) as f64 / elapsed.as_secs_f64();
        self.samples.push(rate);
        self.window_start = now;
        self.count_at_start = count;
    }

    /// Summarise closed windows; `None` when the phase was shorter than one window.
    #[must_use]
    pub fn finish(self) -> Option<RollingRateSample> {
        if self.samples.is_empty() {
            return None;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        let min = self.samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(RollingRateSample {
            window: self.window,
            samples: self.samples,
            mean,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_rates() {
        let counters = CounterSnapshot {
            scheduled: 1_010,
            completed: 1_000,
            errors: 20,
            bytes_out: 1_000_000,
            bytes_in: 4_000_000,
        };
        let metrics =
            LoadGeneratorMetrics::from_counters(counters, Utc::now(), Duration::from_secs(10), None);

        assert_eq!(metrics.throughput, 100.0); // 1000 / 10 = 100 ops/s
        assert_eq!(metrics.error_rate, 0.02); // 2%
        // 5 MB * 8 / 10s = 4 Mbps = 0.4% of 1 Gbps
        assert!((metrics.network_utilization_pct - 0.4).abs() < 1e-9);
        assert_eq!(metrics.scheduled, 1_010);
    }

    #[test]
    fn test_metrics_without_completions() {
        let metrics = LoadGeneratorMetrics::from_counters(
            CounterSnapshot::default(),
            Utc::now(),
            Duration::ZERO,
            None,
        );
        assert_eq!(metrics.throughput, 0.0);
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.network_utilization_pct, 0.0);
    }

    #[test]
    fn test_network_utilization_capped() {
        // 1 GB in one second is 8 Gbps
        let pct = network_utilization_pct(1_000_000_000, Duration::from_secs(1));
        assert_eq!(pct, 100.0);
    }

    #[test]
    fn test_rolling_rate_windows() {
        let start = Instant::now();
        let mut sampler = RollingRateSampler::new(Duration::from_secs(1), start);

        sampler.observe(start + Duration::from_millis(500), 40);
        sampler.observe(start + Duration::from_secs(1), 100);
        sampler.observe(start + Duration::from_millis(1_500), 150);
        sampler.observe(start + Duration::from_secs(2), 300);

        let sample = sampler.finish().unwrap();
        assert_eq!(sample.samples, vec![100.0, 200.0]);
        assert_eq!(sample.mean, 150.0);
        assert_eq!(sample.min, 100.0);
        assert_eq!(sample.max, 200.0);
    }

    #[test]
    fn test_rolling_rate_short_phase() {
        let start = Instant::now();
        let mut sampler = RollingRateSampler::new(Duration::from_secs(1), start);
        sampler.observe(start + Duration::from_millis(200), 10);
        assert!(sampler.finish().is_none());
    }
}
