//! Bounded fan-out execution for upstream service calls.
//!
//! One inbound request fans out to several sibling services (content
//! lookup, entitlement check). Those calls run on a dedicated fixed-size
//! worker pool with a bounded queue rather than spawning per-request
//! tasks: under load the pool rejects new submissions fast instead of
//! piling unbounded work onto the shared scheduler.
//!
//! Failure is contained per task. A timeout, rejection, or panic in one
//! upstream call degrades only its own entry in the result map and never
//! cancels co-scheduled siblings.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::FanOutConfig;
use crate::upstream::{ContentLocation, Entitlement};

/// Successful result of one fan-out call.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Resolved storage location of the requested content
    Content(ContentLocation),
    /// Caller's entitlement to stream
    Entitlement(Entitlement),
}

/// Failure of one fan-out call, local to that call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Upstream task timed out")]
    Timeout,

    #[error("Upstream task rejected, fan-out queue is full")]
    Rejected,

    #[error("Upstream task transport failure: {reason}")]
    Transport { reason: String },
}

/// Result map of one fan-out round: task name to outcome or error.
///
/// Always carries exactly one entry per submitted task.
pub type FanOutResult = HashMap<String, Result<TaskOutcome, TaskError>>;

type TaskFuture = BoxFuture<'static, Result<TaskOutcome, TaskError>>;

/// One named unit of fan-out work.
///
/// The future is created and polled inside a pool worker, so work only
/// starts once a worker slot is available. The executor owns scheduling
/// and the timeout; retries, if any, belong to the caller.
pub struct UpstreamTask {
    name: String,
    timeout: Duration,
    invoke: Box<dyn FnOnce() -> TaskFuture + Send>,
}

impl UpstreamTask {
    pub fn new<F>(name: impl Into<String>, timeout: Duration, invoke: F) -> Self
    where
        F: FnOnce() -> TaskFuture + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout,
            invoke: Box::new(invoke),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct QueuedTask {
    task: UpstreamTask,
    reply: oneshot::Sender<Result<TaskOutcome, TaskError>>,
}

/// Process-wide fan-out worker pool.
///
/// Constructed once at startup with a fixed capacity and shut down at
/// process stop. Request handlers interact with it through cloned
/// [`FanOutHandle`]s; the owner keeps the executor itself for shutdown.
pub struct FanOutExecutor {
    handle: FanOutHandle,
    workers: Vec<JoinHandle<()>>,
}

/// Cheap cloneable handle for submitting fan-out rounds to the pool.
#[derive(Clone)]
pub struct FanOutHandle {
    queue: mpsc::Sender<QueuedTask>,
}

impl FanOutExecutor {
    /// Spawns the worker pool described by `config`.
    pub fn new(config: &FanOutConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let workers = (0..config.workers.max(1))
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&queue_rx))))
            .collect();

        debug!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Fan-out executor started"
        );

        Self {
            handle: FanOutHandle { queue: queue_tx },
            workers,
        }
    }

    /// Returns a handle for submitting work to this pool.
    pub fn handle(&self) -> FanOutHandle {
        self.handle.clone()
    }

    /// Closes the queue and waits for the workers to drain and stop.
    pub async fn shutdown(self) {
        let Self { handle, workers } = self;
        drop(handle);

        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Fan-out worker ended abnormally during shutdown: {e}");
            }
        }

        debug!("Fan-out executor stopped");
    }
}

impl FanOutHandle {
    /// Runs every task and returns once each has an outcome or error.
    ///
    /// This is a join, not a race: one slow or failed upstream degrades
    /// only its own entry and never blocks siblings from completing. The
    /// `budget` bounds the join itself — a task still unresolved when the
    /// budget elapses (including one parked behind a saturated pool) is
    /// recorded as [`TaskError::Timeout`] rather than awaited further or
    /// dropped.
    pub async fn run_all(&self, tasks: Vec<UpstreamTask>, budget: Duration) -> FanOutResult {
        enum Pending {
            Queued(oneshot::Receiver<Result<TaskOutcome, TaskError>>),
            Failed(TaskError),
        }

        let mut submitted = Vec::with_capacity(tasks.len());
        for task in tasks {
            let name = task.name.clone();
            let (reply_tx, reply_rx) = oneshot::channel();

            let pending = match self.queue.try_send(QueuedTask {
                task,
                reply: reply_tx,
            }) {
                Ok(()) => Pending::Queued(reply_rx),
                Err(TrySendError::Full(_)) => {
                    warn!(task = %name, "Fan-out queue full, rejecting task");
                    Pending::Failed(TaskError::Rejected)
                }
                Err(TrySendError::Closed(_)) => Pending::Failed(TaskError::Transport {
                    reason: "fan-out executor is shut down".to_string(),
                }),
            };
            submitted.push((name, pending));
        }

        let deadline = tokio::time::Instant::now() + budget;
        let joined = join_all(submitted.into_iter().map(|(name, pending)| async move {
            let result = match pending {
                Pending::Failed(error) => Err(error),
                Pending::Queued(reply_rx) => {
                    match tokio::time::timeout_at(deadline, reply_rx).await {
                        Ok(Ok(result)) => result,
                        // Worker dropped the reply without sending; only
                        // happens when the pool is torn down mid-flight.
                        Ok(Err(_)) => Err(TaskError::Transport {
                            reason: "fan-out worker dropped the task".to_string(),
                        }),
                        Err(_) => Err(TaskError::Timeout),
                    }
                }
            };
            (name, result)
        }))
        .await;

        joined.into_iter().collect()
    }
}

async fn worker_loop(id: usize, queue: Arc<Mutex<mpsc::Receiver<QueuedTask>>>) {
    loop {
        let next = { queue.lock().await.recv().await };
        let Some(QueuedTask { task, reply }) = next else {
            break;
        };

        let name = task.name.clone();
        let result = run_task(task).await;
        if let Err(ref error) = result {
            debug!(worker = id, task = %name, %error, "Fan-out task failed");
        }

        // The submitter may have stopped waiting (budget elapsed); that is
        // its business, not a worker failure.
        let _ = reply.send(result);
    }

    debug!(worker = id, "Fan-out worker stopped");
}

/// Runs one task under its own timeout, converting panics to transport
/// errors so a misbehaving upstream adapter cannot take a worker down.
async fn run_task(task: UpstreamTask) -> Result<TaskOutcome, TaskError> {
    let future = (task.invoke)();

    match tokio::time::timeout(task.timeout, AssertUnwindSafe(future).catch_unwind()).await {
        Err(_) => Err(TaskError::Timeout),
        Ok(Err(panic)) => Err(TaskError::Transport {
            reason: panic_message(&panic),
        }),
        Ok(Ok(result)) => result,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("task panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("task panicked: {message}")
    } else {
        "task panicked".to_string()
    }
}
