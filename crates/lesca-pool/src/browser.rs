//! A single pooled browser instance (spec.md §4.F).
//!
//! Grounded on the teacher's `riptide-headless::pool::PooledBrowser`:
//! one browser per unique profile directory (Chrome's `SingletonLock` is
//! per-profile, not per-process), a spawned handler task draining the
//! CDP event stream, and a `Drop` impl that aborts that task so it never
//! outlives the browser.

use std::time::Instant;

use futures::StreamExt;
use spider_chrome::{Browser, BrowserConfig};
use tempfile::TempDir;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::PoolError;

pub struct PooledBrowser {
    pub id: String,
    pub browser: Browser,
    pub created_at: Instant,
    pub last_used_at: Instant,
    handler_task: tokio::task::JoinHandle<()>,
    _profile_dir: TempDir,
}

impl std::fmt::Debug for PooledBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBrowser")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

impl PooledBrowser {
    pub async fn launch(
        base_config: &BrowserConfig,
        profile_base_dir: Option<&std::path::Path>,
    ) -> Result<Self, PoolError> {
        let id = Uuid::new_v4().to_string();
        debug!(browser_id = %id, "launching browser");

        let profile_dir = match profile_base_dir {
            Some(base) => TempDir::new_in(base),
            None => TempDir::new(),
        }
        .map_err(|e| PoolError::LaunchFailed(format!("profile dir: {e}")))?;

        let mut config = base_config.clone();
        config.user_data_dir = Some(profile_dir.path().to_path_buf());

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PoolError::LaunchFailed(format!("{id}: {e}")))?;

        let handler_id = id.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!(browser_id = %handler_id, error = %e, "browser event error");
                }
            }
            debug!(browser_id = %handler_id, "browser event handler ended");
        });

        let now = Instant::now();
        Ok(Self {
            id,
            browser,
            created_at: now,
            last_used_at: now,
            handler_task,
            _profile_dir: profile_dir,
        })
    }

    /// Liveness probe used on release (spec.md §4.F `release`: "if the
    /// browser is no longer connected, discard").
    pub async fn is_connected(&self) -> bool {
        timeout(Duration::from_millis(500), self.browser.pages())
            .await
            .is_ok_and(|r| r.is_ok())
    }

    pub fn is_idle_expired(&self, max_idle_time: Duration) -> bool {
        self.last_used_at.elapsed() > max_idle_time
    }

    pub async fn close(mut self) {
        self.handler_task.abort();
        if let Err(e) = self.browser.close().await {
            warn!(browser_id = %self.id, error = %e, "error closing browser");
        }
    }
}

impl Drop for PooledBrowser {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
