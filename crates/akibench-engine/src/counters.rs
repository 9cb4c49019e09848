use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::execution::WorkItemResult;

/// Phase-wide counters shared by the scheduler and every worker.
///
/// Fields are independent atomics; no cross-field invariant needs a lock. `completed` is bumped
/// before `errors` so readers never observe more errors than completions.
#[derive(Debug, Default)]
pub struct LoadGeneratorCounters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    errors: AtomicU64,
    bytes_out: AtomicU64,
    bytes_in: AtomicU64,
}

impl LoadGeneratorCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an operation handed to the worker queue.
    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one execution result into the totals.
    pub fn record(&self, result: &WorkItemResult) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        if result.is_error {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        self.bytes_out.fetch_add(result.bytes_out, Ordering::Relaxed);
        self.bytes_in.fetch_add(result.bytes_in, Ordering::Relaxed);
    }

    /// Operations completed so far, successful or not.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        // errors first: a concurrent record can only make `completed` larger than it was
        let errors = self.errors.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        CounterSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            completed,
            errors,
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`LoadGeneratorCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub scheduled: u64,
    pub completed: u64,
    pub errors: u64,
    pub bytes_out: u64,
    pub bytes_in: u64,
}
