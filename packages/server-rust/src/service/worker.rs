//! Single-task worker draining a bounded queue, with a periodic tick.
//!
//! The broker runs one `BackgroundWorker` per configured worker slot; each
//! executes queued notifications one at a time and sweeps expired results
//! on its tick.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Work executed inside a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Handle one queued task. Tasks never overlap on one worker.
    async fn run(&mut self, task: Self::Task);

    /// Periodic maintenance between tasks.
    async fn on_tick(&mut self) {}

    /// Runs once after the loop exits.
    async fn shutdown(&mut self) {}
}

/// Handle to a spawned worker loop.
///
/// Submission never blocks: a full queue hands the task straight back so the
/// caller can try another worker or report the broker as unavailable.
/// Tasks still queued when the worker stops are dropped.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    capacity: usize,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawn the loop on the current runtime. `capacity` is clamped to at
    /// least 1; the first tick fires one full interval after start.
    pub fn start(mut runnable: R, tick_interval_ms: u64, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = Duration::from_millis(tick_interval_ms.max(1));

        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    task = rx.recv() => match task {
                        Some(task) => runnable.run(task).await,
                        None => break,
                    },
                    _ = ticks.tick() => runnable.on_tick().await,
                    _ = &mut stop_rx => break,
                }
            }
            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            capacity,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Queue `task` without waiting.
    ///
    /// # Errors
    ///
    /// `TrySendError::Full` when the queue is at capacity,
    /// `TrySendError::Closed` once the worker has stopped. Both return the task.
    pub fn try_submit(&self, task: R::Task) -> Result<(), TrySendError<R::Task>> {
        match &self.tx {
            Some(tx) => tx.try_send(task),
            None => Err(TrySendError::Closed(task)),
        }
    }

    /// Tasks waiting in the queue (not counting the one running).
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.tx
            .as_ref()
            .map_or(0, |tx| self.capacity.saturating_sub(tx.capacity()))
    }

    /// Stop the loop and wait for it to exit. A task already running is
    /// allowed to finish.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
