use super::FlowControlledPipeline;
use crate::config::FlowSettings;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn settings(queue_capacity: usize, workers: usize, io_delay_ms: u64, grace_period_ms: u64) -> FlowSettings {
    FlowSettings {
        queue_capacity,
        workers,
        io_delay_ms,
        grace_period_ms,
    }
}

fn stop_after(delay: Duration) -> CancellationToken {
    let stop = CancellationToken::new();
    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    stop
}

#[tokio::test]
async fn test_backpressure_caps_queue_at_capacity() {
    let pipeline = FlowControlledPipeline::new(settings(100, 20, 60_000, 50));
    let report = pipeline
        .simulate(stop_after(Duration::from_millis(200)))
        .await;

    // 20 items held by sleeping workers, 100 waiting in the queue.
    assert_eq!(report.produced, 120);
    assert_eq!(report.high_water, 100);
    assert_eq!(report.consumed, 0);
    assert!(report.forced_halt);
}

#[tokio::test]
async fn test_cooperative_stop_finishes_in_flight_work() {
    let pipeline = FlowControlledPipeline::new(settings(10, 4, 5, 1_000));
    let report = pipeline.simulate(stop_after(Duration::from_millis(100))).await;

    assert!(!report.forced_halt);
    assert!(report.consumed > 0);
    assert!(report.produced >= report.consumed);
    assert!(report.high_water <= 10);
}

#[tokio::test]
async fn test_workers_never_exceed_pool_size() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (active_in, peak_in) = (active.clone(), peak.clone());

    let pipeline = FlowControlledPipeline::new(settings(5, 3, 0, 1_000));
    let report = pipeline
        .run(
            |n| n,
            move |_item: u64| {
                let active = active_in.clone();
                let peak = peak_in.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            },
            stop_after(Duration::from_millis(100)),
        )
        .await;

    assert!(report.consumed > 0);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_before_start_produces_nothing() {
    let stop = CancellationToken::new();
    stop.cancel();

    let pipeline = FlowControlledPipeline::new(settings(10, 2, 0, 100));
    let report = pipeline.simulate(stop).await;
    assert_eq!(report.produced, 0);
    assert_eq!(report.consumed, 0);
    assert!(!report.forced_halt);
}

#[tokio::test]
async fn test_zero_capacity_queue_still_holds_one_item() {
    let pipeline = FlowControlledPipeline::new(settings(0, 1, 60_000, 20));
    let report = pipeline
        .simulate(stop_after(Duration::from_millis(100)))
        .await;

    // One item held by the stalled worker, one waiting in the queue.
    assert_eq!(report.produced, 2);
    assert_eq!(report.high_water, 1);
    assert!(report.forced_halt);
}
