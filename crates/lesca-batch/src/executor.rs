//! Fixed-size-batch executor with checkpoint/resume (spec.md §4.I).
//!
//! Each batch is a contiguous slice of not-yet-completed original
//! indices, sized to `concurrency`. A batch fully settles — every item
//! either succeeds or fails — before the next one starts, so the
//! checkpoint's index space never has a batch half-applied. This is a
//! narrower shape than `riptide-workers::worker::Worker`'s free-running
//! semaphore-bounded pool: that one accepts a continuous job stream and
//! never needs an instant where "no more than N are in flight and no
//! fewer" holds, because it has no notion of resumable batches.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use lesca_types::EpochMs;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::checkpoint::{Checkpoint, CheckpointError, RecordedOutcome};
use crate::progress::BatchProgress;

fn now_ms() -> EpochMs {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("batch concurrency must be at least 1")]
    InvalidConcurrency,
}

impl BatchError {
    pub fn kind(&self) -> lesca_types::ErrorKind {
        match self {
            BatchError::Checkpoint(_) => lesca_types::ErrorKind::Fatal,
            BatchError::InvalidConcurrency => lesca_types::ErrorKind::Fatal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub concurrency: usize,
    /// When `false`, one or more item failures flip the final summary's
    /// `success` flag to false. Execution always runs every item
    /// regardless — only the reported outcome changes (spec.md §4.I).
    pub continue_on_error: bool,
    pub delay_between_batches: Duration,
    /// Whether to read an existing progress file at `progress_file` and
    /// skip indices it already recorded (success *or* failure).
    pub resume: bool,
    pub progress_file: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            continue_on_error: true,
            delay_between_batches: Duration::from_millis(0),
            resume: false,
            progress_file: PathBuf::from("batch-progress.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemOutcome<Res, Err> {
    Success(Res),
    Failed(Err),
}

#[derive(Debug, Clone)]
pub struct BatchItemResult<Req, Res, Err> {
    pub index: usize,
    pub request: Req,
    pub outcome: ItemOutcome<Res, Err>,
    /// `true` when this result was replayed from a prior run's
    /// checkpoint rather than freshly executed.
    pub skipped: bool,
}

#[derive(Debug, Clone)]
pub struct BatchSummary<Req, Res, Err> {
    pub results: Vec<BatchItemResult<Req, Res, Err>>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub success: bool,
    pub progress: BatchProgress,
}

pub struct BatchExecutor<Req, Res, Err> {
    config: BatchConfig,
    on_progress: Option<Arc<dyn Fn(BatchProgress) + Send + Sync>>,
    _marker: std::marker::PhantomData<(Req, Res, Err)>,
}

impl<Req, Res, Err> BatchExecutor<Req, Res, Err>
where
    Req: Clone + Send + Sync + 'static,
    Res: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
    Err: Clone + Send + Sync + Serialize + DeserializeOwned + std::fmt::Display + 'static,
{
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            on_progress: None,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn with_progress_callback(
        mut self,
        callback: impl Fn(BatchProgress) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Runs `scraper` over `requests`, honouring `resume`/`continue_on_error`
    /// from the config. Results come back ordered by original index
    /// regardless of completion order.
    pub async fn run<F, Fut>(
        &self,
        requests: Vec<Req>,
        scraper: F,
    ) -> Result<BatchSummary<Req, Res, Err>, BatchError>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Res, Err>> + Send + 'static,
    {
        if self.config.concurrency == 0 {
            return Err(BatchError::InvalidConcurrency);
        }
        let scraper = Arc::new(scraper);
        let total = requests.len();

        let existing = if self.config.resume {
            Checkpoint::<Res, Err>::load(&self.config.progress_file).await?
        } else {
            None
        };

        let (mut checkpoint, already_done): (
            Checkpoint<Res, Err>,
            HashMap<usize, RecordedOutcome<Res, Err>>,
        ) = match existing {
            Some(c) => {
                let map = c.results.iter().map(|r| (r.index, r.outcome.clone())).collect();
                (c, map)
            }
            None => (Checkpoint::new(now_ms()), HashMap::new()),
        };
        let start_time = checkpoint.start_time;

        let mut results: Vec<Option<BatchItemResult<Req, Res, Err>>> =
            (0..total).map(|_| None).collect();
        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut completed_count = 0usize;

        for (&index, outcome) in already_done.iter().filter(|(&i, _)| i < total) {
            let request = requests[index].clone();
            let (item_outcome, is_success) = match outcome.clone() {
                RecordedOutcome::Success { value } => (ItemOutcome::Success(value), true),
                RecordedOutcome::Failed { error } => (ItemOutcome::Failed(error), false),
            };
            if is_success {
                successful += 1;
            } else {
                failed += 1;
            }
            skipped += 1;
            completed_count += 1;
            results[index] = Some(BatchItemResult {
                index,
                request,
                outcome: item_outcome,
                skipped: true,
            });
        }

        let pending_indices: Vec<usize> =
            (0..total).filter(|i| !already_done.contains_key(i)).collect();
        let total_batches = if pending_indices.is_empty() {
            0
        } else {
            (pending_indices.len() + self.config.concurrency - 1) / self.config.concurrency
        };

        let mut current_batch = 0usize;
        for chunk in pending_indices.chunks(self.config.concurrency) {
            current_batch += 1;
            let mut tasks = FuturesUnordered::new();
            for &index in chunk {
                let request = requests[index].clone();
                let result_request = request.clone();
                let scraper = scraper.clone();
                tasks.push(async move {
                    let outcome = scraper(request).await;
                    (index, result_request, outcome)
                });
            }

            while let Some((index, request, outcome)) = tasks.next().await {
                let (item_outcome, recorded, is_success) = match outcome {
                    Ok(value) => (
                        ItemOutcome::Success(value.clone()),
                        RecordedOutcome::Success { value },
                        true,
                    ),
                    Err(error) => (
                        ItemOutcome::Failed(error.clone()),
                        RecordedOutcome::Failed { error },
                        false,
                    ),
                };
                if is_success {
                    successful += 1;
                } else {
                    failed += 1;
                    tracing::warn!(index, "batch item failed");
                }
                completed_count += 1;
                results[index] = Some(BatchItemResult {
                    index,
                    request,
                    outcome: item_outcome,
                    skipped: false,
                });
                checkpoint.record(index, recorded);
                checkpoint.save(&self.config.progress_file).await?;

                if let Some(cb) = &self.on_progress {
                    cb(BatchProgress::compute(
                        total,
                        completed_count,
                        successful,
                        failed,
                        skipped,
                        current_batch,
                        total_batches,
                        start_time,
                        now_ms(),
                    ));
                }
            }

            if current_batch < total_batches && !self.config.delay_between_batches.is_zero() {
                tokio::time::sleep(self.config.delay_between_batches).await;
            }
        }

        if completed_count >= total {
            Checkpoint::<Res, Err>::remove(&self.config.progress_file).await?;
        }

        let final_results: Vec<BatchItemResult<Req, Res, Err>> = results
            .into_iter()
            .map(|r| r.expect("every index is either replayed from checkpoint or freshly run"))
            .collect();
        let progress = BatchProgress::compute(
            total,
            completed_count,
            successful,
            failed,
            skipped,
            current_batch,
            total_batches,
            start_time,
            now_ms(),
        );
        let success = failed == 0 || self.config.continue_on_error;

        Ok(BatchSummary {
            results: final_results,
            total,
            successful,
            failed,
            skipped,
            success,
            progress,
        })
    }
}
