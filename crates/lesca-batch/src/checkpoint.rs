//! The durable batch progress record enabling resume (spec.md §3 "Batch
//! Progress State", §6 "Checkpoint file").
//!
//! Only the *outcome* of each completed index is persisted, not the
//! original request: on resume the caller already holds the full
//! request list and only needs to know which indices to skip and what
//! to replay in their place. Atomic write mirrors
//! `lesca_session::store`'s temp+rename (spec.md §4.C "Atomic write").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lesca_types::EpochMs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One item's terminal outcome, persisted so a resumed run can replay it
/// without re-invoking the scraper (spec.md's open question: a failed
/// item is recorded as completed too, so resume never retries failures).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecordedOutcome<Res, Err> {
    Success { value: Res },
    Failed { error: Err },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord<Res, Err> {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: RecordedOutcome<Res, Err>,
}

/// `{completedIndices, results, startTime}` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<Res, Err> {
    #[serde(rename = "completedIndices")]
    pub completed_indices: Vec<usize>,
    pub results: Vec<CheckpointRecord<Res, Err>>,
    #[serde(rename = "startTime")]
    pub start_time: EpochMs,
}

impl<Res, Err> Checkpoint<Res, Err> {
    pub fn new(start_time: EpochMs) -> Self {
        Self {
            completed_indices: Vec::new(),
            results: Vec::new(),
            start_time,
        }
    }

    pub fn record(&mut self, index: usize, outcome: RecordedOutcome<Res, Err>) {
        self.completed_indices.push(index);
        self.results.push(CheckpointRecord { index, outcome });
    }

    pub fn as_map(&self) -> HashMap<usize, &CheckpointRecord<Res, Err>>
    where
        Res: Clone,
        Err: Clone,
    {
        self.results.iter().map(|r| (r.index, r)).collect()
    }
}

impl<Res, Err> Checkpoint<Res, Err>
where
    Res: Serialize + DeserializeOwned,
    Err: Serialize + DeserializeOwned,
{
    /// Loads an existing checkpoint, if present. A missing file is not an
    /// error (fresh start); a corrupt file is surfaced since, unlike the
    /// session store, there is no quarantine contract for checkpoints.
    pub async fn load(path: &Path) -> Result<Option<Self>, CheckpointError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic write: serialise, write to `<path>.tmp.<epoch>.<rand>`,
    /// rename over the final path.
    pub async fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec(self)?;
        let tmp = tmp_path(path, self.start_time);
        let write_result = fs::write(&tmp, &bytes).await;
        match write_result {
            Ok(()) => match fs::rename(&tmp, path).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    let _ = fs::remove_file(&tmp).await;
                    Err(e.into())
                }
            },
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                Err(e.into())
            }
        }
    }

    /// Removed on clean completion (spec.md §6).
    pub async fn remove(path: &Path) -> Result<(), CheckpointError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn tmp_path(path: &Path, salt: EpochMs) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("progress");
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    parent.join(format!("{file_name}.tmp.{salt}.{}", fastrand::u32(..)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut checkpoint: Checkpoint<String, String> = Checkpoint::new(1_000);
        checkpoint.record(0, RecordedOutcome::Success { value: "ok".into() });
        checkpoint.record(1, RecordedOutcome::Failed { error: "boom".into() });
        checkpoint.save(&path).await.unwrap();

        let loaded: Checkpoint<String, String> = Checkpoint::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.completed_indices, vec![0, 1]);
        assert_eq!(loaded.start_time, 1_000);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded: Option<Checkpoint<String, String>> = Checkpoint::load(&path).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let checkpoint: Checkpoint<String, String> = Checkpoint::new(1_000);
        checkpoint.save(&path).await.unwrap();
        Checkpoint::<String, String>::remove(&path).await.unwrap();
        assert!(!path.exists());
        Checkpoint::<String, String>::remove(&path).await.unwrap();
    }
}
