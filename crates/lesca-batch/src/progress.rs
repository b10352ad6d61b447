//! The live progress snapshot handed to progress callbacks and returned
//! alongside the final summary (spec.md §4.I "Progress model").

use lesca_types::EpochMs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub percentage: f64,
    #[serde(rename = "currentBatch")]
    pub current_batch: usize,
    #[serde(rename = "totalBatches")]
    pub total_batches: usize,
    #[serde(rename = "startTime")]
    pub start_time: EpochMs,
    #[serde(rename = "elapsedTime")]
    pub elapsed_time: EpochMs,
    /// Estimated milliseconds remaining, `None` until at least one item
    /// has completed (spec.md §4.I).
    #[serde(rename = "estimatedTimeRemaining", skip_serializing_if = "Option::is_none")]
    pub eta: Option<EpochMs>,
}

impl BatchProgress {
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        total: usize,
        completed: usize,
        successful: usize,
        failed: usize,
        skipped: usize,
        current_batch: usize,
        total_batches: usize,
        start_time: EpochMs,
        now: EpochMs,
    ) -> Self {
        let elapsed_time = (now - start_time).max(0);
        let percentage = if total == 0 {
            100.0
        } else {
            (completed as f64 / total as f64) * 100.0
        };
        let eta = if completed == 0 || completed >= total {
            None
        } else {
            let remaining = (total - completed) as f64;
            let per_item = elapsed_time as f64 / completed as f64;
            Some((per_item * remaining).round() as EpochMs)
        };
        Self {
            total,
            completed,
            successful,
            failed,
            skipped,
            percentage,
            current_batch,
            total_batches,
            start_time,
            elapsed_time,
            eta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_is_none_until_something_has_completed() {
        let p = BatchProgress::compute(10, 0, 0, 0, 0, 0, 2, 0, 1_000);
        assert_eq!(p.eta, None);
    }

    #[test]
    fn eta_extrapolates_from_average_item_duration() {
        // 2 of 10 done in 1000ms => 500ms/item => 8 remaining => 4000ms.
        let p = BatchProgress::compute(10, 2, 2, 0, 0, 0, 2, 0, 1_000);
        assert_eq!(p.eta, Some(4_000));
    }

    #[test]
    fn eta_is_none_once_fully_complete() {
        let p = BatchProgress::compute(10, 10, 10, 0, 0, 1, 2, 0, 2_000);
        assert_eq!(p.eta, None);
        assert_eq!(p.percentage, 100.0);
    }

    #[test]
    fn empty_batch_is_complete_by_definition() {
        let p = BatchProgress::compute(0, 0, 0, 0, 0, 0, 0, 0, 0);
        assert_eq!(p.percentage, 100.0);
    }
}
