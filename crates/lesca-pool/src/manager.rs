//! Session pool manager: a map of per-session `Pool`s (spec.md §2, §4.F).

use std::sync::Arc;

use dashmap::DashMap;
use lesca_events::EventBus;
use lesca_reliability::clock::Clock;
use spider_chrome::BrowserConfig;

use tracing::warn;

use crate::error::PoolError;
use crate::pool::{Pool, PoolConfig, PoolHandle, PoolStats};

/// Lazily creates and owns one [`Pool`] per session name, fanning out
/// `drain`/`stats` across all of them.
pub struct SessionPoolManager {
    pools: DashMap<String, Arc<Pool>>,
    config: PoolConfig,
    browser_config: BrowserConfig,
    clock: Arc<dyn Clock>,
    bus: Option<EventBus>,
}

impl SessionPoolManager {
    pub fn new(
        config: PoolConfig,
        browser_config: BrowserConfig,
        clock: Arc<dyn Clock>,
        bus: Option<EventBus>,
    ) -> Self {
        Self {
            pools: DashMap::new(),
            config,
            browser_config,
            clock,
            bus,
        }
    }

    fn pool_for(&self, session_name: &str) -> Arc<Pool> {
        self.pools
            .entry(session_name.to_string())
            .or_insert_with(|| {
                Pool::new(
                    session_name,
                    self.config.clone(),
                    self.browser_config.clone(),
                    self.clock.clone(),
                    self.bus.clone(),
                )
            })
            .clone()
    }

    /// Acquires a browser from the session's pool. When
    /// `config.retry_on_failure` is set, a transient `acquire` failure
    /// (spec.md §7 `Transient`) is retried up to `config.max_retries`
    /// times; the breaker vetoes retries implicitly, since a tripped
    /// breaker surfaces `CircuitOpen` rather than `Transient` and that
    /// kind is never retried here (spec.md §9 open question).
    pub async fn acquire(&self, session_name: &str) -> Result<PoolHandle, PoolError> {
        let pool = self.pool_for(session_name);
        let mut attempt = 0u32;
        loop {
            match pool.acquire().await {
                Ok(handle) => return Ok(handle),
                Err(e)
                    if self.config.retry_on_failure
                        && attempt < self.config.max_retries
                        && e.kind().is_internally_retryable() =>
                {
                    attempt += 1;
                    warn!(session_name, attempt, error = %e, "acquire failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn drain(&self, session_name: &str) {
        if let Some(pool) = self.pools.get(session_name) {
            pool.drain().await;
        }
    }

    /// Drains every pool concurrently, returning once all have fully
    /// drained (spec.md §4.G).
    pub async fn drain_all(&self) {
        let pools: Vec<Arc<Pool>> = self.pools.iter().map(|e| e.value().clone()).collect();
        let drains = pools.iter().map(|pool| pool.drain());
        futures::future::join_all(drains).await;
    }

    pub async fn stats_for(&self, session_name: &str) -> Option<PoolStats> {
        let pool = self.pools.get(session_name)?.clone();
        Some(pool.stats().await)
    }

    pub async fn get_statistics(&self) -> Vec<(String, PoolStats)> {
        let pools: Vec<(String, Arc<Pool>)> = self
            .pools
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let mut out = Vec::with_capacity(pools.len());
        for (name, pool) in pools {
            out.push((name, pool.stats().await));
        }
        out
    }

    pub fn session_count(&self) -> usize {
        self.pools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lazily_creates_one_pool_per_session_name() {
        // Pool::new spawns a warm-up task that will attempt a real
        // browser launch; we only assert the map behaviour here; the
        // launch itself happening in the background and failing (no
        // Chrome binary in a unit test sandbox) does not affect this.
        let manager = SessionPoolManager::new(
            PoolConfig {
                min_size: 0,
                ..Default::default()
            },
            BrowserConfig::builder().build().unwrap(),
            lesca_reliability::clock::real_clock(),
            None,
        );
        assert_eq!(manager.session_count(), 0);
        let _ = manager.pool_for("alpha");
        let _ = manager.pool_for("alpha");
        let _ = manager.pool_for("beta");
        assert_eq!(manager.session_count(), 2);
    }
}
