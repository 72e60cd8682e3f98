//! Bounded worker pool between an input sequence and an output/error pair.
//!
//! The supervisor task owns the original senders of both outgoing sequences
//! and hands each worker a clone. It drops its own senders only after every
//! worker has been joined, so the sequences close exactly once and never
//! while a worker could still send on them.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info_span, warn, Instrument};

use super::Stage;
use crate::cancellation::CancellationObserver;
use crate::core::WorkItem;
use crate::errors::{ItemError, StageError};

/// Live counters for one stage.
#[derive(Debug, Default)]
pub struct StageStats {
    started: AtomicU64,
    forwarded: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StageStats {
    fn enter(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of items the stage has started processing.
    #[must_use]
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Number of items forwarded downstream.
    #[must_use]
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Number of items that failed.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Number of transforms currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of transforms that executed at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StageStatsSnapshot {
        StageStatsSnapshot {
            started: self.started(),
            forwarded: self.forwarded(),
            failed: self.failed(),
            peak_in_flight: self.peak_in_flight(),
        }
    }
}

/// Serializable copy of [`StageStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatsSnapshot {
    /// Items started.
    pub started: u64,
    /// Items forwarded downstream.
    pub forwarded: u64,
    /// Items failed.
    pub failed: u64,
    /// Peak concurrent transforms.
    pub peak_in_flight: usize,
}

/// The running side of a stage, as seen by its consumer.
#[derive(Debug)]
pub struct StageHandle<O> {
    /// Stage name.
    pub name: String,
    /// Transformed items. Closed once every worker has exited.
    pub output: mpsc::Receiver<O>,
    /// Item failures. Closed together with `output`.
    pub errors: mpsc::Receiver<StageError>,
    /// Live counters.
    pub stats: Arc<StageStats>,
    /// The supervisor task; completes after the join.
    pub supervisor: JoinHandle<()>,
}

/// Runs a [`Stage`] with a fixed number of concurrent workers.
pub struct StageRunner<S: Stage> {
    stage: Arc<S>,
    workers: usize,
    capacity: usize,
}

impl<S: Stage> StageRunner<S> {
    /// Creates a runner with one worker and a queue capacity of one.
    pub fn new(stage: S) -> Self {
        Self::from_arc(Arc::new(stage))
    }

    /// Creates a runner around a shared stage.
    pub fn from_arc(stage: Arc<S>) -> Self {
        Self {
            stage,
            workers: 1,
            capacity: 1,
        }
    }

    /// Sets the number of concurrent workers. Zero is raised to one.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        if workers == 0 {
            warn!(stage = self.stage.name(), "Worker count of 0 raised to 1");
        }
        self.workers = workers.max(1);
        self
    }

    /// Sets the capacity of the output and error sequences. Zero is raised to one.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns the workers and returns the consumer side of the stage.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        self,
        input: mpsc::Receiver<S::Input>,
        cancel: CancellationObserver,
    ) -> StageHandle<S::Output> {
        let name = self.stage.name().to_string();
        let (output_tx, output_rx) = mpsc::channel(self.capacity);
        let (error_tx, error_rx) = mpsc::channel(self.capacity);
        let stats = Arc::new(StageStats::default());

        let supervisor = Supervisor {
            name: name.clone(),
            stage: self.stage,
            workers: self.workers,
            input: Arc::new(Mutex::new(input)),
            output: output_tx,
            errors: error_tx,
            cancel,
            stats: Arc::clone(&stats),
        };
        let span = info_span!("stage", stage = %name);
        let supervisor = tokio::spawn(supervisor.run().instrument(span));

        StageHandle {
            name,
            output: output_rx,
            errors: error_rx,
            stats,
            supervisor,
        }
    }
}

impl<S: Stage> std::fmt::Debug for StageRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("stage", &self.stage.name())
            .field("workers", &self.workers)
            .field("capacity", &self.capacity)
            .finish()
    }
}

struct Supervisor<S: Stage> {
    name: String,
    stage: Arc<S>,
    workers: usize,
    input: Arc<Mutex<mpsc::Receiver<S::Input>>>,
    output: mpsc::Sender<S::Output>,
    errors: mpsc::Sender<StageError>,
    cancel: CancellationObserver,
    stats: Arc<StageStats>,
}

impl<S: Stage> Supervisor<S> {
    async fn run(self) {
        let mut pool = JoinSet::new();
        for id in 0..self.workers {
            let worker = Worker {
                name: self.name.clone(),
                stage: Arc::clone(&self.stage),
                input: Arc::clone(&self.input),
                output: self.output.clone(),
                errors: self.errors.clone(),
                cancel: self.cancel.clone(),
                stats: Arc::clone(&self.stats),
            };
            pool.spawn(worker.run().instrument(info_span!("worker", worker = id)));
        }
        debug!(workers = self.workers, "Stage started");

        while let Some(joined) = pool.join_next().await {
            let Err(join_error) = joined else { continue };
            let message = if join_error.is_panic() {
                panic_message(&*join_error.into_panic())
            } else {
                join_error.to_string()
            };
            error!(error = %message, "Stage worker died");
            let report = StageError::new(
                self.name.as_str(),
                format!("{} worker", self.name),
                ItemError::Panicked(message),
            );
            send_or_abandon(&self.errors, report, &self.cancel).await;
        }

        debug!(
            forwarded = self.stats.forwarded(),
            failed = self.stats.failed(),
            cancelled = self.cancel.is_cancelled(),
            "Stage finished"
        );
        // `self` drops here, releasing the last senders and closing both sequences.
    }
}

struct Worker<S: Stage> {
    name: String,
    stage: Arc<S>,
    input: Arc<Mutex<mpsc::Receiver<S::Input>>>,
    output: mpsc::Sender<S::Output>,
    errors: mpsc::Sender<StageError>,
    cancel: CancellationObserver,
    stats: Arc<StageStats>,
}

impl<S: Stage> Worker<S> {
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = async { self.input.lock().await.recv().await } => next,
            };
            let Some(item) = next else { break };

            if !self.handle(item).await {
                break;
            }
        }
    }

    /// Processes one item. Returns `false` when the worker should stop.
    async fn handle(&self, item: S::Input) -> bool {
        let item_id = item.id().to_string();

        self.stats.enter();
        let outcome = AssertUnwindSafe(self.stage.process(item, &self.cancel))
            .catch_unwind()
            .await;
        self.stats.leave();

        let cause = match outcome {
            Ok(Ok(transformed)) => {
                let delivered = send_or_abandon(&self.output, transformed, &self.cancel).await;
                if delivered {
                    self.stats.record_forwarded();
                }
                return delivered;
            }
            Ok(Err(cause)) => cause,
            Err(payload) => ItemError::Panicked(panic_message(&*payload)),
        };

        self.stats.record_failed();
        debug!(item = %item_id, error = %cause, "Item failed");
        let report = StageError::new(self.name.as_str(), item_id, cause);
        send_or_abandon(&self.errors, report, &self.cancel).await
    }
}

/// Sends unless the token closes first. Returns `false` if the value was not delivered.
async fn send_or_abandon<T>(tx: &mpsc::Sender<T>, value: T, cancel: &CancellationObserver) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
