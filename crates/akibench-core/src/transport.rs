use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationSignal;
use crate::error::BenchResult;
use crate::operation::Operation;

/// Result of one transport call.
///
/// Expected failures (timeouts, rejected requests, non-success status codes) are reported through
/// `error` rather than `Err`, so the engine can count them without unwinding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOutcome {
    /// Bytes written to the target.
    pub bytes_out: u64,
    /// Bytes read back from the target.
    pub bytes_in: u64,
    /// Failure details; `None` means the operation succeeded.
    pub error: Option<String>,
}

impl TransportOutcome {
    /// Successful call with the given byte counts.
    #[must_use]
    pub const fn success(bytes_out: u64, bytes_in: u64) -> Self {
        Self {
            bytes_out,
            bytes_in,
            error: None,
        }
    }

    /// Failed call. Bytes already written are still reported.
    #[must_use]
    pub fn failure(bytes_out: u64, error: impl Into<String>) -> Self {
        Self {
            bytes_out,
            bytes_in: 0,
            error: Some(error.into()),
        }
    }

    /// Returns true when the call failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Connection to the system under test.
///
/// Implementations must be shareable between all workers of a phase. Returning `Err` is reserved
/// for unexpected faults; the execution helper converts both `Err` and panics into counted errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes one operation. Long waits should observe `cancel`.
    async fn execute(
        &self,
        operation: &Operation,
        cancel: &CancellationSignal,
    ) -> BenchResult<TransportOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let ok = TransportOutcome::success(10, 20);
        assert!(!ok.is_error());

        let failed = TransportOutcome::failure(10, "503 Service Unavailable");
        assert!(failed.is_error());
        assert_eq!(failed.bytes_in, 0);
        assert_eq!(failed.bytes_out, 10);
    }
}
