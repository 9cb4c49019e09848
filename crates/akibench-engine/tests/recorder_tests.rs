// Concurrency and property tests for the latency recorder
//
// Properties tested:
// 1. Percentiles are non-decreasing in rank for any recorded sequence
// 2. A single value is reported for every percentile and as the max
// 3. Expected-interval correction yields floor(value / interval) counts, never fewer than one
// 4. Concurrent writers lose no samples and the max is the true max

use std::sync::Arc;

use akibench_engine::LatencyRecorder;
use proptest::prelude::*;

fn within_bucket(actual: u64, expected: u64) -> bool {
    // 3 significant digits
    actual.abs_diff(expected) <= (expected / 1000).max(1)
}

proptest! {
    #[test]
    fn prop_percentiles_are_monotone(values in prop::collection::vec(1u64..=60_000_000, 1..500)) {
        let recorder = LatencyRecorder::new().unwrap();
        for value in &values {
            recorder.record(*value).unwrap();
        }
        let snapshot = recorder.snapshot();

        let p = snapshot.percentiles();
        prop_assert!(p.p50 <= p.p90);
        prop_assert!(p.p90 <= p.p95);
        prop_assert!(p.p95 <= p.p99);
        prop_assert!(p.p99 <= p.p999);
        prop_assert!(p.p999 <= p.max);
        prop_assert_eq!(p.count, values.len() as u64);
    }

    #[test]
    fn prop_single_value_round_trips(value in 1u64..=60_000_000) {
        let recorder = LatencyRecorder::new().unwrap();
        recorder.record(value).unwrap();
        let snapshot = recorder.snapshot();

        for percentile in [0.0, 50.0, 95.0, 99.0, 99.9, 100.0] {
            let reported = snapshot.value_at_percentile(percentile);
            prop_assert!(within_bucket(reported, value), "p{} = {} for {}", percentile, reported, value);
        }
        prop_assert!(within_bucket(snapshot.max(), value));
    }

    #[test]
    fn prop_correction_backfills_whole_intervals(value in 1u64..=1_000_000, interval in 1u64..=1_000_000) {
        let recorder = LatencyRecorder::new().unwrap();
        recorder.record_with_expected_interval(value, interval).unwrap();
        let count = recorder.snapshot().total_count();

        prop_assert_eq!(count, (value / interval).max(1));
        if value >= 2 * interval {
            prop_assert!(count > 1);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_recording_loses_no_samples() {
    const WORKERS: u64 = 16;
    const PER_WORKER: u64 = 5_000;

    let recorder = Arc::new(LatencyRecorder::new().unwrap());
    let mut handles = Vec::new();

    for worker in 0..WORKERS {
        let recorder = recorder.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..PER_WORKER {
                recorder.record(1 + (worker * PER_WORKER + i) % 50_000).unwrap();
                if i % 500 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            // One outlier per worker; the largest belongs to the last worker
            recorder.record(1_000_000 + worker).unwrap();
        }));
    }

    // Interval snapshots taken while writers are active must not drop samples either
    let mut total = 0;
    let mut max = 0;
    for _ in 0..10 {
        let snapshot = recorder.snapshot();
        total += snapshot.total_count();
        max = max.max(snapshot.max());
        tokio::task::yield_now().await;
    }

    for handle in handles {
        handle.await.unwrap();
    }
    let last = recorder.snapshot();
    total += last.total_count();
    max = max.max(last.max());

    assert_eq!(total, WORKERS * (PER_WORKER + 1));
    assert!(within_bucket(max, 1_000_000 + WORKERS - 1), "max {max}");
}

#[test]
fn test_disabled_recorder_reports_nothing() {
    let recorder = LatencyRecorder::disabled();
    recorder.record(42).unwrap();
    recorder.record_with_expected_interval(10_000, 10).unwrap();

    let snapshot = recorder.snapshot();
    assert_eq!(snapshot.total_count(), 0);
    assert_eq!(snapshot.value_at_percentile(99.0), 0);
    assert_eq!(snapshot.max(), 0);
}
