//! Abstraction over a live browser context, used by `create`/`restore`
//! (spec.md §4.C). The concrete implementation (talking to a real CDP
//! page) lives with whatever crate owns the browser handle — this store
//! only needs the capability, not the type, which keeps it decoupled
//! from `lesca-pool`/`spider_chrome` the same way the teacher's
//! `riptide-core` keeps `cache.rs` decoupled from `riptide-headless`.

use async_trait::async_trait;
use lesca_types::{Cookie, StorageMap};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no page available in this context")]
    NoPage,
    #[error("context operation failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn snapshot_cookies(&self) -> Result<Vec<Cookie>, ContextError>;
    async fn snapshot_local_storage(&self) -> Result<StorageMap, ContextError>;
    async fn snapshot_session_storage(&self) -> Result<StorageMap, ContextError>;

    async fn apply_cookies(&self, cookies: &[Cookie]) -> Result<(), ContextError>;
    async fn inject_local_storage(&self, storage: &StorageMap) -> Result<(), ContextError>;
    async fn inject_session_storage(&self, storage: &StorageMap) -> Result<(), ContextError>;

    /// Whether this context currently has a page to inject storage into
    /// (spec.md §4.C `restore`: "if no page exists, apply cookies only").
    fn has_page(&self) -> bool;
}

/// A context with no page, useful for tests and for cookie-only restores.
pub struct NullContext;

#[async_trait]
impl BrowserContext for NullContext {
    async fn snapshot_cookies(&self) -> Result<Vec<Cookie>, ContextError> {
        Ok(Vec::new())
    }

    async fn snapshot_local_storage(&self) -> Result<StorageMap, ContextError> {
        Ok(StorageMap::new())
    }

    async fn snapshot_session_storage(&self) -> Result<StorageMap, ContextError> {
        Ok(StorageMap::new())
    }

    async fn apply_cookies(&self, _cookies: &[Cookie]) -> Result<(), ContextError> {
        Ok(())
    }

    async fn inject_local_storage(&self, _storage: &StorageMap) -> Result<(), ContextError> {
        Err(ContextError::NoPage)
    }

    async fn inject_session_storage(&self, _storage: &StorageMap) -> Result<(), ContextError> {
        Err(ContextError::NoPage)
    }

    fn has_page(&self) -> bool {
        false
    }
}
