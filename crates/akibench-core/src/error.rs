use thiserror::Error;

/// Canonical error type for load generation and analysis.
///
/// Operational failures (timeouts, rejected requests) are never represented here: they are
/// counted as data by the execution helper. This enum only carries setup mistakes and
/// infrastructure faults that must stop a run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// A parameter is outside its valid range (concurrency, rate, thresholds, ...).
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Human-readable description of the rejected setting.
        message: String,
    },

    /// A latency sample exceeds the histogram's trackable range.
    #[error("latency {value}us exceeds the recorder range of {max}us")]
    LatencyOutOfRange {
        /// Offending value in microseconds.
        value: u64,
        /// Highest trackable value in microseconds.
        max: u64,
    },

    /// Histogram could not be created with the requested bounds.
    #[error("histogram error: {0}")]
    Histogram(String),

    /// Unexpected transport fault reported by a `Transport` implementation.
    #[error("transport error: {0}")]
    Transport(String),

    /// A worker or scheduler task aborted.
    #[error("worker task failed: {0}")]
    WorkerPanicked(String),

    /// Configuration source could not be loaded or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BenchError {
    /// Creates an `InvalidConfig` variant.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a `Transport` variant.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns true for errors caused by a setup mistake rather than a runtime fault.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::LatencyOutOfRange { .. } | Self::Config(_)
        )
    }
}

/// Convenient result alias for akibench operations.
pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_message() {
        let err = BenchError::LatencyOutOfRange {
            value: 61_000_000,
            max: 60_000_000,
        };
        assert_eq!(
            err.to_string(),
            "latency 61000000us exceeds the recorder range of 60000000us"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_transport_is_not_configuration() {
        let err = BenchError::transport("connection reset");
        assert!(!err.is_configuration());
        assert_eq!(err.to_string(), "transport error: connection reset");
    }
}
