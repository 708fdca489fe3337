//! Cancellation tokens for background tasks
//!
//! Cancellation is cooperative: a worker checks `is_cancelled()` between units
//! of work and returns early. Consumers still compare a task's target against
//! current view state before using its result, so a late result from a
//! cancelled task is harmless.

use crate::TaskId;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

/// Cancellation token shared between the submitter and the worker.
///
/// # Example
///
/// ```
/// use inkleaf_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps live task ids to their tokens.
///
/// Cloning the registry shares the underlying map, so the pool and its workers
/// see the same set of tasks.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<TaskId, CancellationToken>> {
        // A panicking holder cannot leave the map half-updated.
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a task and return the token handed to its worker.
    pub fn register(&self, task_id: TaskId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens().insert(task_id, token.clone());
        token
    }

    /// Cancel a task by id. Returns `true` if the task was still registered.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        match self.tokens().get(&task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered task, returning how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Forget a finished task.
    pub fn unregister(&self, task_id: TaskId) -> bool {
        self.tokens().remove(&task_id).is_some()
    }

    pub fn get(&self, task_id: TaskId) -> Option<CancellationToken> {
        self.tokens().get(&task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        assert!(!token1.is_cancelled());
        assert!(!token2.is_cancelled());

        token1.cancel();
        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_registry_cancel_by_id() {
        let registry = CancellationRegistry::new();
        let token = registry.register(1);

        assert_eq!(registry.len(), 1);
        assert!(registry.cancel(1));
        assert!(token.is_cancelled());
        assert!(!registry.cancel(999));
    }

    #[test]
    fn test_registry_cancel_all() {
        let registry = CancellationRegistry::new();
        let token1 = registry.register(1);
        let token2 = registry.register(2);

        assert_eq!(registry.cancel_all(), 2);
        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_registry_unregister() {
        let registry = CancellationRegistry::new();
        registry.register(7);

        assert!(registry.unregister(7));
        assert!(!registry.unregister(7));
        assert!(registry.is_empty());
        assert!(registry.get(7).is_none());
    }

    #[test]
    fn test_registry_clones_share_state() {
        let registry = CancellationRegistry::new();
        let shared = registry.clone();
        let token = registry.register(3);

        assert!(shared.cancel(3));
        assert!(token.is_cancelled());
    }
}
