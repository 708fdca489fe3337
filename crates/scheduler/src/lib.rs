//! Inkleaf Scheduler Library
//!
//! Background worker pool used for page rasterization, text recognition and
//! document saves. Work is submitted from the interaction thread as closures;
//! results come back over a channel that the interaction thread drains, and
//! every task carries a cooperative cancellation token.
//!
//! # Example
//!
//! ```
//! use inkleaf_scheduler::{TaskPool, WorkerPoolConfig};
//! use std::time::Duration;
//!
//! let pool = TaskPool::new(WorkerPoolConfig::new(2).with_name("render")).unwrap();
//!
//! let (job_id, token) = pool.submit(|token| {
//!     if token.is_cancelled() {
//!         return None;
//!     }
//!     Some("rendered")
//! });
//!
//! // Later, on the interaction thread:
//! if let Some(output) = pool.recv_timeout(Duration::from_secs(5)) {
//!     assert_eq!(output.id, job_id);
//! }
//! # drop(token);
//! ```

mod cancel;
mod worker;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use worker::{TaskOutcome, TaskOutput, TaskPool, WorkerPoolConfig};

/// Identifier assigned to every submitted task.
pub type TaskId = u64;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
