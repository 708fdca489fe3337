//! Worker pool with an explicit result channel.
//!
//! Tasks are closures submitted from the interaction thread. Each worker
//! thread pulls tasks from a shared queue, runs them with a cancellation token,
//! and sends the output back over a result channel. The interaction thread
//! drains that channel (`try_results`) at a point of its choosing, so no state
//! owned by the interaction thread is ever touched from a worker.

use crate::{CancellationRegistry, CancellationToken, SchedulerError, TaskId};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

type BoxedTask<T> = Box<dyn FnOnce(&CancellationToken) -> T + Send + 'static>;

struct Envelope<T> {
    id: TaskId,
    token: CancellationToken,
    task: BoxedTask<T>,
}

/// How a task finished.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    /// The task ran to completion.
    Completed(T),
    /// The task was cancelled before or while running.
    Cancelled,
    /// The task panicked; the payload message is kept for logging.
    Panicked(String),
}

/// A finished task as delivered on the result channel.
#[derive(Debug)]
pub struct TaskOutput<T> {
    pub id: TaskId,
    pub outcome: TaskOutcome<T>,
}

impl<T> TaskOutput<T> {
    /// The value of a completed task, dropping cancelled and panicked outcomes.
    pub fn into_completed(self) -> Option<T> {
        match self.outcome {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads. Default: logical CPU count, capped at 4.
    pub num_workers: usize,

    /// Thread name prefix, used in logs and debuggers.
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus().min(4),
            name: "inkleaf-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Pool of worker threads producing values of type `T`.
///
/// # Example
///
/// ```
/// use inkleaf_scheduler::{TaskPool, WorkerPoolConfig};
/// use std::time::Duration;
///
/// let pool = TaskPool::new(WorkerPoolConfig::new(1)).unwrap();
/// let (id, _token) = pool.submit(|_token| 21 * 2);
///
/// let output = pool.recv_timeout(Duration::from_secs(5)).unwrap();
/// assert_eq!(output.id, id);
/// assert_eq!(output.into_completed(), Some(42));
/// ```
pub struct TaskPool<T: Send + 'static> {
    sender: Option<Sender<Envelope<T>>>,
    results: Receiver<TaskOutput<T>>,
    registry: CancellationRegistry,
    next_id: AtomicU64,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> TaskPool<T> {
    /// Spawn the worker threads.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, SchedulerError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Envelope<T>>();
        let (result_sender, results) = crossbeam_channel::unbounded::<TaskOutput<T>>();
        let registry = CancellationRegistry::new();

        let count = config.num_workers.max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let receiver = receiver.clone();
            let result_sender = result_sender.clone();
            let registry = registry.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.name, index))
                .spawn(move || run_worker(receiver, result_sender, registry))
                .map_err(SchedulerError::Spawn)?;
            workers.push(handle);
        }
        debug!(workers = count, name = %config.name, "worker pool started");

        Ok(Self {
            sender: Some(sender),
            results,
            registry,
            next_id: AtomicU64::new(1),
            workers,
        })
    }

    /// Queue a task. The returned token can cancel it cooperatively.
    pub fn submit<F>(&self, task: F) -> (TaskId, CancellationToken)
    where
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.registry.register(id);
        let envelope = Envelope {
            id,
            token: token.clone(),
            task: Box::new(task),
        };

        let delivered = self
            .sender
            .as_ref()
            .map(|sender| sender.send(envelope).is_ok())
            .unwrap_or(false);
        if !delivered {
            warn!(task = id, "worker pool is shut down; task dropped");
            self.registry.unregister(id);
            token.cancel();
        }
        (id, token)
    }

    /// Cancel a queued or running task.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.registry.cancel(id)
    }

    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// Number of tasks submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Drain every result available right now without blocking.
    pub fn try_results(&self) -> Vec<TaskOutput<T>> {
        self.results.try_iter().collect()
    }

    /// Block for at most `timeout` waiting for the next result.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TaskOutput<T>> {
        match self.results.recv_timeout(timeout) {
            Ok(output) => Some(output),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting work and wait for the workers to drain the queue.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the queue ends each worker's receive loop.
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread terminated abnormally");
            }
        }
    }
}

impl<T: Send + 'static> Drop for TaskPool<T> {
    fn drop(&mut self) {
        self.registry.cancel_all();
        self.stop();
    }
}

fn run_worker<T: Send + 'static>(
    receiver: Receiver<Envelope<T>>,
    results: Sender<TaskOutput<T>>,
    registry: CancellationRegistry,
) {
    for Envelope { id, token, task } in receiver.iter() {
        let outcome = if token.is_cancelled() {
            TaskOutcome::Cancelled
        } else {
            match panic::catch_unwind(AssertUnwindSafe(|| task(&token))) {
                Ok(_) if token.is_cancelled() => TaskOutcome::Cancelled,
                Ok(value) => TaskOutcome::Completed(value),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(task = id, %message, "background task panicked");
                    TaskOutcome::Panicked(message)
                }
            }
        };
        registry.unregister(id);

        if results.send(TaskOutput { id, outcome }).is_err() {
            // The pool was dropped; nobody is listening any more.
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
