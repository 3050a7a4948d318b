//! In-process broker backed by a task table and a pool of background workers.
//!
//! Submissions are encoded to `MsgPack` exactly as they would be for a network
//! queue, then spread round-robin over the workers' bounded channels. Each
//! worker decodes the message, runs the registered handler, and records the
//! outcome in the shared task table that status queries read from.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use newsroute_core::{HandlerId, NativeTaskSnapshot, NotificationPayload, TaskId, TaskMessage};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use super::record::TaskRecord;
use super::{BrokerClient, BrokerError};
use crate::handler::{call_guarded, HandlerRegistry};
use crate::service::registry::{ManagedService, ServiceContext};
use crate::service::worker::{BackgroundRunnable, BackgroundWorker};

type TaskTable = Arc<DashMap<TaskId, TaskRecord>>;

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// Broker that executes queued notifications inside this process.
///
/// Not durable: pending tasks are lost when the process stops.
pub struct MemoryBroker {
    tasks: TaskTable,
    handlers: Arc<HandlerRegistry>,
    workers: parking_lot::Mutex<Vec<BackgroundWorker<TaskExecutor>>>,
    next_worker: AtomicUsize,
    open: AtomicBool,
    max_message_bytes: AtomicUsize,
}

impl MemoryBroker {
    /// Create a stopped broker. Workers are spawned by `ManagedService::init`.
    #[must_use]
    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            handlers,
            workers: parking_lot::Mutex::new(Vec::new()),
            next_worker: AtomicUsize::new(0),
            open: AtomicBool::new(false),
            max_message_bytes: AtomicUsize::new(usize::MAX),
        }
    }

    /// Whether the broker currently accepts submissions.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Number of task records currently retained.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn enqueue(&self, bytes: Vec<u8>) -> Result<(), BrokerError> {
        let workers = self.workers.lock();
        if workers.is_empty() {
            return Err(BrokerError::Unavailable("broker is not running".to_string()));
        }

        let start = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let mut task = bytes;
        for offset in 0..workers.len() {
            let worker = &workers[(start + offset) % workers.len()];
            match worker.try_submit(task) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned) | TrySendError::Closed(returned)) => {
                    task = returned;
                }
            }
        }
        Err(BrokerError::Unavailable("task queue is full".to_string()))
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn submit(
        &self,
        handler_id: &HandlerId,
        payload: NotificationPayload,
    ) -> Result<TaskId, BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::Unavailable("broker is shut down".to_string()));
        }

        let task_id = TaskId::new(uuid::Uuid::new_v4().to_string());
        let message = TaskMessage {
            task_id: task_id.clone(),
            handler_id: handler_id.clone(),
            payload,
        };
        let bytes = message.encode()?;
        let limit = self.max_message_bytes.load(Ordering::Relaxed);
        if bytes.len() > limit {
            return Err(BrokerError::Rejected(format!(
                "task message is {} bytes, limit is {limit}",
                bytes.len()
            )));
        }

        // Record first so a status query racing the worker never sees an
        // unknown id for an accepted task.
        self.tasks
            .insert(task_id.clone(), TaskRecord::pending(handler_id.clone()));
        if let Err(e) = self.enqueue(bytes) {
            self.tasks.remove(&task_id);
            return Err(e);
        }

        debug!(task_id = %task_id, handler_id = %handler_id, "task enqueued");
        Ok(task_id)
    }

    async fn query_state(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<NativeTaskSnapshot>, BrokerError> {
        Ok(self.tasks.get(task_id).map(|record| record.snapshot()))
    }

    fn queue_depth(&self) -> Option<usize> {
        Some(self.workers.lock().iter().map(BackgroundWorker::queue_depth).sum())
    }
}

#[async_trait]
impl ManagedService for MemoryBroker {
    fn name(&self) -> &'static str {
        "broker"
    }

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let config = &ctx.config;
        let result_ttl = config.result_ttl_ms.map(Duration::from_millis);
        self.max_message_bytes
            .store(config.broker_max_message_bytes, Ordering::Relaxed);

        let spawned: Vec<_> = (0..config.broker_workers.max(1))
            .map(|_| {
                BackgroundWorker::start(
                    TaskExecutor {
                        tasks: self.tasks.clone(),
                        handlers: self.handlers.clone(),
                        result_ttl,
                    },
                    config.broker_tick_interval_ms,
                    config.broker_queue_capacity,
                )
            })
            .collect();
        let count = spawned.len();
        self.workers.lock().extend(spawned);
        self.open.store(true, Ordering::Release);

        info!(
            workers = count,
            queue_capacity = config.broker_queue_capacity,
            "broker started"
        );
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.tasks.clear();
        Ok(())
    }

    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()> {
        self.open.store(false, Ordering::Release);
        let workers = std::mem::take(&mut *self.workers.lock());
        let pending = self.tasks.iter().filter(|r| !r.state().is_terminal()).count();
        if pending > 0 {
            warn!(pending, "broker stopping with unfinished tasks");
        }
        for mut worker in workers {
            if terminate {
                // Dropping the handle closes the channel; the worker exits on its own.
                drop(worker);
            } else {
                worker.stop().await;
            }
        }
        info!("broker stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TaskExecutor
// ---------------------------------------------------------------------------

/// Worker-side half of the broker: runs one decoded task at a time.
struct TaskExecutor {
    tasks: TaskTable,
    handlers: Arc<HandlerRegistry>,
    result_ttl: Option<Duration>,
}

impl TaskExecutor {
    fn finish(&self, task_id: &TaskId, outcome: Result<serde_json::Value, String>) {
        let Some(mut record) = self.tasks.get_mut(task_id) else {
            return;
        };
        let transition = match outcome {
            Ok(value) => record.mark_succeeded(value),
            Err(message) => {
                error!(task_id = %task_id, handler_id = %record.handler_id(), error = %message, "task failed");
                record.mark_failed(message)
            }
        };
        if let Err(e) = transition {
            warn!(task_id = %task_id, error = %e, "ignored task transition");
        }
    }
}

#[async_trait]
impl BackgroundRunnable for TaskExecutor {
    type Task = Vec<u8>;

    async fn run(&mut self, bytes: Vec<u8>) {
        let message = match TaskMessage::decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "dropping undecodable task message");
                return;
            }
        };
        let task_id = message.task_id;

        let started = self
            .tasks
            .get_mut(&task_id)
            .map(|mut record| record.mark_started());
        match started {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(task_id = %task_id, error = %e, "skipping task that is not pending");
                return;
            }
            // Expired or reset while queued.
            None => return,
        }

        let Some(handler) = self.handlers.get(&message.handler_id).cloned() else {
            self.finish(
                &task_id,
                Err(format!("no handler registered for '{}'", message.handler_id)),
            );
            return;
        };

        let outcome = call_guarded(handler.as_ref(), &message.payload)
            .await
            .map_err(|e| e.to_string());
        self.finish(&task_id, outcome);
    }

    async fn on_tick(&mut self) {
        let Some(ttl) = self.result_ttl else {
            return;
        };
        let now = Instant::now();
        let mut expired = 0usize;
        for mut record in self.tasks.iter_mut() {
            if record.is_expired(now, ttl) {
                record.expire();
                expired += 1;
            }
        }
        if expired > 0 {
            debug!(expired, "task results expired");
        }
    }

    async fn shutdown(&mut self) {
        debug!("task executor stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
