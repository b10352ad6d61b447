//! Narrow trait seams standing in for the HTTP/GraphQL fetch,
//! HTML→Markdown conversion and Markdown/Obsidian writers — all
//! external collaborators whose interiors spec.md §1 explicitly puts
//! out of scope. The CLI only needs to know it can hand a request to
//! something that returns a result, and hand a result to something that
//! persists it; the defaults here are in-memory/no-op stand-ins so the
//! `scrape`/`session` commands are exercisable without a real backend
//! wired in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScrapeTarget {
    Problem { slug: String },
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub target: ScrapeTarget,
    pub session_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub target: ScrapeTarget,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn kind(&self) -> lesca_types::ErrorKind {
        match self {
            BackendError::NotFound(_) => lesca_types::ErrorKind::NotFound,
            BackendError::Other(_) => lesca_types::ErrorKind::Fatal,
        }
    }
}

#[async_trait]
pub trait ScrapeBackend: Send + Sync {
    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeResult, BackendError>;
}

#[async_trait]
pub trait ContentWriter: Send + Sync {
    async fn write(&self, result: &ScrapeResult) -> Result<(), BackendError>;
}

/// Stand-in backend: echoes the request back as a placeholder result
/// rather than performing a real fetch. Real deployments supply a
/// `ScrapeBackend` that talks to the HTTP/GraphQL layer.
pub struct NoopScrapeBackend;

#[async_trait]
impl ScrapeBackend for NoopScrapeBackend {
    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeResult, BackendError> {
        let title = match &request.target {
            ScrapeTarget::Problem { slug } => format!("problem:{slug}"),
            ScrapeTarget::List => "problem-list".to_string(),
        };
        Ok(ScrapeResult {
            target: request.target,
            title,
            content: String::new(),
        })
    }
}

/// Collects written results in memory, for tests and for callers that
/// don't need filesystem output wired up yet.
#[derive(Default)]
pub struct InMemoryContentWriter {
    written: Mutex<Vec<ScrapeResult>>,
}

impl InMemoryContentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn written(&self) -> Vec<ScrapeResult> {
        self.written.lock().await.clone()
    }
}

#[async_trait]
impl ContentWriter for InMemoryContentWriter {
    async fn write(&self, result: &ScrapeResult) -> Result<(), BackendError> {
        self.written.lock().await.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_backend_echoes_slug_into_title() {
        let backend = NoopScrapeBackend;
        let result = backend
            .scrape(ScrapeRequest {
                target: ScrapeTarget::Problem { slug: "two-sum".into() },
                session_name: "default".into(),
            })
            .await
            .unwrap();
        assert_eq!(result.title, "problem:two-sum");
    }

    #[tokio::test]
    async fn in_memory_writer_accumulates_results() {
        let writer = InMemoryContentWriter::new();
        let result = ScrapeResult {
            target: ScrapeTarget::List,
            title: "list".into(),
            content: String::new(),
        };
        writer.write(&result).await.unwrap();
        writer.write(&result).await.unwrap();
        assert_eq!(writer.written().await.len(), 2);
    }
}
