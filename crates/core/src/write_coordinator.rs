//! Save coordination
//!
//! Saves run on a background worker so the interaction thread never waits on
//! disk. Every request carries a snapshot of the document and a generation
//! number. Writes to the same path are serialized by a per-path lock, and a
//! snapshot older than one already written is skipped, so the newest state
//! always wins even when two save triggers race.

use crate::store::{self, DocumentStore};
use inkleaf_model::Document;
use inkleaf_scheduler::{SchedulerError, TaskOutcome, TaskPool, WorkerPoolConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-path record of the newest generation written.
type PathLocks = Arc<Mutex<HashMap<PathBuf, Arc<Mutex<u64>>>>>;

/// Result of one save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { path: PathBuf, generation: u64 },
    /// A newer snapshot of the same path was already written.
    Skipped { path: PathBuf, generation: u64 },
    Failed { path: PathBuf, generation: u64, error: String },
}

impl SaveOutcome {
    pub fn path(&self) -> &Path {
        match self {
            SaveOutcome::Saved { path, .. }
            | SaveOutcome::Skipped { path, .. }
            | SaveOutcome::Failed { path, .. } => path,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            SaveOutcome::Saved { generation, .. }
            | SaveOutcome::Skipped { generation, .. }
            | SaveOutcome::Failed { generation, .. } => *generation,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SaveOutcome::Failed { .. })
    }
}

pub struct SaveCoordinator {
    store: Arc<dyn DocumentStore>,
    pool: TaskPool<SaveOutcome>,
    locks: PathLocks,
    next_generation: u64,
    pending: usize,
}

impl SaveCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, pool_config: WorkerPoolConfig) -> Result<Self, SchedulerError> {
        Ok(Self {
            store,
            pool: TaskPool::new(pool_config)?,
            locks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: 1,
            pending: 0,
        })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Number of save requests whose outcome has not been drained yet.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Queue a save of `document` to `path`. Returns the snapshot's generation.
    pub fn request_save(&mut self, path: impl Into<PathBuf>, document: Document) -> u64 {
        let path = path.into();
        let generation = self.next_generation;
        self.next_generation += 1;

        let store = Arc::clone(&self.store);
        let lock = path_lock(&self.locks, &path);
        debug!(path = %path.display(), generation, "save requested");
        self.pool
            .submit(move |_token| write_generation(store.as_ref(), &lock, path, generation, &document));
        self.pending += 1;
        generation
    }

    /// Outcomes of finished saves, without blocking.
    pub fn drain(&mut self) -> Vec<SaveOutcome> {
        let outputs = self.pool.try_results();
        self.collect(outputs)
    }

    /// Wait up to `timeout` for every queued save to finish.
    pub fn flush(&mut self, timeout: Duration) -> Vec<SaveOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = self.drain();
        while self.pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(pending = self.pending, "timed out waiting for saves");
                break;
            }
            match self.pool.recv_timeout(remaining) {
                Some(output) => outcomes.extend(self.collect(vec![output])),
                None => {
                    warn!(pending = self.pending, "timed out waiting for saves");
                    break;
                }
            }
        }
        outcomes
    }

    fn collect(&mut self, outputs: Vec<inkleaf_scheduler::TaskOutput<SaveOutcome>>) -> Vec<SaveOutcome> {
        let mut outcomes = Vec::with_capacity(outputs.len());
        for output in outputs {
            self.pending = self.pending.saturating_sub(1);
            match output.outcome {
                TaskOutcome::Completed(outcome) => outcomes.push(outcome),
                TaskOutcome::Cancelled => debug!(task = output.id, "save cancelled"),
                TaskOutcome::Panicked(message) => {
                    warn!(task = output.id, %message, "save task panicked")
                }
            }
        }
        outcomes
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn path_lock(locks: &PathLocks, path: &Path) -> Arc<Mutex<u64>> {
    Arc::clone(lock(locks).entry(path.to_path_buf()).or_default())
}

/// Write one snapshot while holding the path's lock.
fn write_generation(
    store: &dyn DocumentStore,
    lock_cell: &Mutex<u64>,
    path: PathBuf,
    generation: u64,
    document: &Document,
) -> SaveOutcome {
    let mut last_written = lock(lock_cell);
    if generation < *last_written {
        debug!(path = %path.display(), generation, newer = *last_written, "stale save skipped");
        return SaveOutcome::Skipped { path, generation };
    }
    match store::save_document(store, &path, document) {
        Ok(()) => {
            *last_written = generation;
            SaveOutcome::Saved { path, generation }
        }
        Err(err) => {
            warn!(path = %path.display(), generation, %err, "save failed");
            SaveOutcome::Failed {
                path,
                generation,
                error: err.to_string(),
            }
        }
    }
}
