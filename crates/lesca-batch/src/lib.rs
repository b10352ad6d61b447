//! Concurrency-bounded batch executor with checkpoint/resume (spec.md
//! §4.I).
//!
//! Grounded on the teacher's `riptide-workers::worker::Worker` for the
//! bounded-concurrency shape (a semaphore-style fixed-size batch rather
//! than a free-running worker pool, since spec.md requires batches to
//! fully settle before the next one starts so the checkpoint's index
//! space stays stable) and on `lesca-session::store`'s temp+rename
//! atomic write for the progress file.

pub mod checkpoint;
pub mod executor;
pub mod progress;

pub use checkpoint::{Checkpoint, CheckpointError};
pub use executor::{BatchConfig, BatchError, BatchExecutor, BatchSummary, ItemOutcome};
pub use progress::BatchProgress;
