//! Flow-controlled pipeline
//!
//! One producer task sends items into a bounded `flume` channel and blocks
//! while it is full. A fixed pool of workers each take a permit from a counting
//! semaphore, pop an item and process it. Every task checks the stop token on
//! each iteration and at every blocking point, so after a stop they exit once
//! their current item is done.
//!
//! The driver gives the tasks `grace_period` to wind down and aborts whatever
//! is still running after that.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::FlowSettings;

/// Summary of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowReport {
    /// Items accepted by the queue.
    pub produced: u64,
    /// Items fully processed by a worker.
    pub consumed: u64,
    /// Largest queue length observed.
    pub high_water: usize,
    /// Tasks were still running when the grace period ran out.
    pub forced_halt: bool,
}

#[derive(Debug, Clone)]
pub struct FlowControlledPipeline {
    settings: FlowSettings,
}

impl FlowControlledPipeline {
    pub fn new(settings: FlowSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// Runs the producer and the worker pool until `stop` is cancelled.
    ///
    /// `produce` receives a 1-based sequence number. `work` runs once per
    /// consumed item on a worker task.
    pub async fn run<T, P, W, Fut>(&self, produce: P, work: W, stop: CancellationToken) -> FlowReport
    where
        T: Send + 'static,
        P: FnMut(u64) -> T + Send + 'static,
        W: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let workers = self.settings.workers.max(1);
        let capacity = self.settings.queue_capacity.max(1);
        // Cloned by every worker; each item is received once.
        let (sender, receiver) = flume::bounded(capacity);
        let high_water = Arc::new(AtomicUsize::new(0));
        let permits = Arc::new(Semaphore::new(workers));
        let produced = Arc::new(AtomicU64::new(0));
        let consumed = Arc::new(AtomicU64::new(0));
        let work = Arc::new(work);

        info!(capacity, workers, "flow-controlled pipeline running");

        let mut tasks = JoinSet::new();
        tasks.spawn(producer(
            sender,
            produce,
            produced.clone(),
            high_water.clone(),
            stop.clone(),
        ));
        for worker in 0..workers {
            tasks.spawn(consumer(
                worker,
                receiver.clone(),
                permits.clone(),
                work.clone(),
                consumed.clone(),
                stop.clone(),
            ));
        }

        stop.cancelled().await;
        info!(grace_period_ms = self.settings.grace_period_ms, "stop requested");
        // The producer drops the sender on exit, which disconnects the
        // workers' receivers once the queue is empty.
        drop(receiver);
        permits.close();

        let wind_down = async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "pipeline task failed");
                }
            }
        };
        let forced_halt = tokio::time::timeout(self.settings.grace_period(), wind_down)
            .await
            .is_err();
        if forced_halt {
            warn!(remaining = tasks.len(), "grace period elapsed, halting remaining tasks");
            tasks.shutdown().await;
        }

        let report = FlowReport {
            produced: produced.load(Ordering::SeqCst),
            consumed: consumed.load(Ordering::SeqCst),
            high_water: high_water.load(Ordering::SeqCst),
            forced_halt,
        };
        info!(
            produced = report.produced,
            consumed = report.consumed,
            high_water = report.high_water,
            forced_halt = report.forced_halt,
            "flow-controlled pipeline stopped"
        );
        report
    }

    /// Feeds sequence numbers as text to workers that simulate I/O by
    /// sleeping for `io_delay`.
    pub async fn simulate(&self, stop: CancellationToken) -> FlowReport {
        let io_delay = self.settings.io_delay();
        self.run(
            |n| n.to_string(),
            move |item: String| async move {
                debug!(%item, "consuming");
                tokio::time::sleep(io_delay).await;
            },
            stop,
        )
        .await
    }
}

async fn producer<T, P>(
    sender: flume::Sender<T>,
    mut produce: P,
    produced: Arc<AtomicU64>,
    high_water: Arc<AtomicUsize>,
    stop: CancellationToken,
) where
    P: FnMut(u64) -> T,
{
    let start = Instant::now();
    let mut n: u64 = 0;

    while !stop.is_cancelled() {
        n += 1;
        let item = produce(n);
        debug!(item = n, "producing");

        let pushed = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            sent = sender.send_async(item) => sent,
        };
        if pushed.is_err() {
            break;
        }
        produced.fetch_add(1, Ordering::SeqCst);

        let queued = sender.len();
        high_water.fetch_max(queued, Ordering::SeqCst);
        let processed = n.saturating_sub(queued as u64);
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            debug!(rps = processed as f64 / elapsed, "throughput");
        }
    }
    info!("producer is stopped");
}

async fn consumer<T, W, Fut>(
    worker: usize,
    receiver: flume::Receiver<T>,
    permits: Arc<Semaphore>,
    work: Arc<W>,
    consumed: Arc<AtomicU64>,
    stop: CancellationToken,
) where
    W: Fn(T) -> Fut,
    Fut: Future<Output = ()>,
{
    while !stop.is_cancelled() {
        let permit = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            permit = permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let item = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            item = receiver.recv_async() => match item {
                Ok(item) => item,
                Err(_) => break,
            },
        };

        (*work)(item).await;
        consumed.fetch_add(1, Ordering::SeqCst);
        drop(permit);
    }
    debug!(worker, "consumer is stopped");
}
