//! Per-session browser pool (spec.md §4.F, "the core of the core").
//!
//! Grounded on the teacher's `riptide-headless::pool::BrowserPool`: an
//! idle/busy split, a background sweep task, and checkout objects that
//! auto-release on drop. Reworked for the spec's contract: the idle set
//! prefers the most-recently-released browser (a LIFO stack, not the
//! teacher's FIFO `VecDeque`), acquisition launches are gated by a
//! `lesca_reliability::CircuitBreaker`, a FIFO wait queue serves callers
//! once `maxSize` is reached, and every transition publishes a
//! `MetricEvent` instead of the teacher's internal-only `PoolEvent`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lesca_events::EventBus;
use lesca_reliability::circuit::{CircuitBreaker, CircuitConfig, CircuitState};
use lesca_reliability::clock::Clock;
use lesca_types::{DestroyReason, MetricEvent, MetricPayload};
use spider_chrome::BrowserConfig;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::PooledBrowser;
use crate::error::PoolError;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub max_idle_time: std::time::Duration,
    pub idle_sweep_interval: std::time::Duration,
    pub acquire_timeout: std::time::Duration,
    pub profile_base_dir: Option<std::path::PathBuf>,
    pub breaker: CircuitConfig,
    /// Whether [`SessionPoolManager::acquire`] retries a transient
    /// `acquire` failure, honouring the breaker between tries
    /// (spec.md §4.G).
    pub retry_on_failure: bool,
    pub max_retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 5,
            max_idle_time: std::time::Duration::from_secs(300),
            idle_sweep_interval: std::time::Duration::from_secs(30),
            acquire_timeout: std::time::Duration::from_secs(30),
            profile_base_dir: None,
            breaker: CircuitConfig::default(),
            retry_on_failure: false,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub idle: usize,
    pub busy: usize,
    pub waiting: usize,
    pub max_size: usize,
}

/// Per-session browser pool. Always accessed through an `Arc` so the
/// background sweeper and outstanding `PoolHandle`s can outlive any
/// single caller's reference.
pub struct Pool {
    session_name: String,
    config: PoolConfig,
    browser_config: BrowserConfig,
    idle: Mutex<Vec<PooledBrowser>>,
    busy: DashMap<String, PooledBrowser>,
    wait_queue: Mutex<VecDeque<oneshot::Sender<()>>>,
    breaker: Arc<CircuitBreaker>,
    bus: Option<EventBus>,
    clock: Arc<dyn Clock>,
    draining: AtomicBool,
    release_notify: Notify,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Pool {
    pub fn new(
        session_name: impl Into<String>,
        config: PoolConfig,
        browser_config: BrowserConfig,
        clock: Arc<dyn Clock>,
        bus: Option<EventBus>,
    ) -> Arc<Self> {
        let session_name = session_name.into();
        let breaker = CircuitBreaker::new(
            config.breaker.clone(),
            clock.clone(),
            bus.clone(),
            Some(session_name.clone()),
        );

        let pool = Arc::new(Self {
            session_name,
            config,
            browser_config,
            idle: Mutex::new(Vec::new()),
            busy: DashMap::new(),
            wait_queue: Mutex::new(VecDeque::new()),
            breaker,
            bus,
            clock,
            draining: AtomicBool::new(false),
            release_notify: Notify::new(),
            sweeper: std::sync::Mutex::new(None),
        });

        let warmup = pool.clone();
        tokio::spawn(async move { warmup.warm_up().await });

        let sweep = pool.clone();
        let handle = tokio::spawn(async move { sweep.idle_sweep_loop().await });
        *pool.sweeper.lock().unwrap() = Some(handle);

        pool
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    async fn warm_up(self: Arc<Self>) {
        for _ in 0..self.config.min_size {
            if self.busy.len() + self.idle.lock().await.len() >= self.config.max_size {
                break;
            }
            match self.launch_one().await {
                Ok(browser) => self.idle.lock().await.push(browser),
                Err(e) => {
                    warn!(session = %self.session_name, error = %e, "warm-up launch failed");
                    break;
                }
            }
        }
    }

    async fn launch_one(&self) -> Result<PooledBrowser, PoolError> {
        let permit = self.breaker.try_acquire()?;
        let start = self.clock.now_ms();
        let result =
            PooledBrowser::launch(&self.browser_config, self.config.profile_base_dir.as_deref())
                .await;
        match &result {
            Ok(_) => {
                self.breaker.on_success();
                let duration_ms = (self.clock.now_ms() - start).max(0) as u64;
                self.publish(MetricPayload::BrowserCreated {
                    duration_ms,
                    pool_size: self.busy.len(),
                });
            }
            Err(_) => self.breaker.on_failure(),
        }
        drop(permit);
        result
    }

    fn publish(&self, payload: MetricPayload) {
        if let Some(bus) = &self.bus {
            bus.publish(MetricEvent::new(
                self.clock.now_ms(),
                Some(self.session_name.clone()),
                payload,
            ));
        }
    }

    /// `acquire() -> Browser` (spec.md §4.F).
    pub async fn acquire(self: &Arc<Self>) -> Result<PoolHandle, PoolError> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(PoolError::Draining);
        }

        let start = self.clock.now_ms();
        let mut queued = false;

        loop {
            if let Some(browser) = self.idle.lock().await.pop() {
                let id = browser.id.clone();
                self.busy.insert(id.clone(), browser);
                let duration_ms = (self.clock.now_ms() - start).max(0) as u64;
                if queued {
                    self.publish(MetricPayload::PoolExhausted {
                        wait_time_ms: duration_ms,
                        pool_size: self.busy.len(),
                        max_size: self.config.max_size,
                    });
                }
                self.publish(MetricPayload::PoolAcquire {
                    duration_ms,
                    reused: true,
                    pool_size: self.busy.len(),
                });
                return Ok(PoolHandle {
                    pool: self.clone(),
                    id: Some(id),
                });
            }

            if self.busy.len() < self.config.max_size {
                let browser = self.launch_one().await?;
                let id = browser.id.clone();
                self.busy.insert(id.clone(), browser);
                let duration_ms = (self.clock.now_ms() - start).max(0) as u64;
                self.publish(MetricPayload::PoolAcquire {
                    duration_ms,
                    reused: false,
                    pool_size: self.busy.len(),
                });
                return Ok(PoolHandle {
                    pool: self.clone(),
                    id: Some(id),
                });
            }

            let (tx, rx) = oneshot::channel();
            self.wait_queue.lock().await.push_back(tx);
            queued = true;
            debug!(session = %self.session_name, "acquire queued, pool at max size");

            match tokio::time::timeout(self.config.acquire_timeout, rx).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(PoolError::Draining),
                Err(_) => return Err(PoolError::Exhausted),
            }
        }
    }

    /// `release(browser)` (spec.md §4.F).
    async fn release(self: &Arc<Self>, id: &str) {
        let Some((_, mut browser)) = self.busy.remove(id) else {
            return;
        };

        if !browser.is_connected().await {
            self.publish(MetricPayload::BrowserDestroyed {
                pool_size: self.busy.len(),
                reason: DestroyReason::Disconnected,
            });
            browser.close().await;
        } else {
            browser.last_used_at = std::time::Instant::now();
            self.idle.lock().await.push(browser);
        }

        self.publish(MetricPayload::PoolRelease {
            duration_ms: 0,
            pool_size: self.busy.len(),
        });

        // Wake the head of the wait queue; it will retry the idle pop.
        if let Some(tx) = self.wait_queue.lock().await.pop_front() {
            let _ = tx.send(());
        }
        self.release_notify.notify_waiters();
    }

    /// `drain()`: reject new acquisitions, wait for busy to empty,
    /// destroy all idle.
    pub async fn drain(self: &Arc<Self>) {
        self.draining.store(true, Ordering::SeqCst);
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }

        // Fail every currently-queued waiter rather than serving them.
        let mut queue = self.wait_queue.lock().await;
        while let Some(tx) = queue.pop_front() {
            drop(tx);
        }
        drop(queue);

        while !self.busy.is_empty() {
            self.release_notify.notified().await;
        }

        let mut idle = self.idle.lock().await;
        let drained: Vec<_> = idle.drain(..).collect();
        drop(idle);
        for browser in drained {
            self.publish(MetricPayload::BrowserDestroyed {
                pool_size: 0,
                reason: DestroyReason::Drain,
            });
            browser.close().await;
        }
        info!(session = %self.session_name, "pool drained");
    }

    pub async fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().await.len(),
            busy: self.busy.len(),
            waiting: self.wait_queue.lock().await.len(),
            max_size: self.config.max_size,
        }
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    async fn idle_sweep_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.idle_sweep_interval);
        loop {
            ticker.tick().await;
            if self.draining.load(Ordering::SeqCst) {
                return;
            }
            self.sweep_idle().await;
        }
    }

    /// Closes idle browsers past `maxIdleTime`, but never below
    /// `minSize` (spec.md §4.F "Idle eviction").
    async fn sweep_idle(self: &Arc<Self>) {
        let mut idle = self.idle.lock().await;
        if idle.len() <= self.config.min_size {
            return;
        }

        let mut survivors = Vec::with_capacity(idle.len());
        let mut expired = Vec::new();
        for browser in idle.drain(..) {
            let below_floor = survivors.len() < self.config.min_size;
            if below_floor || !browser.is_idle_expired(self.config.max_idle_time) {
                survivors.push(browser);
            } else {
                expired.push(browser);
            }
        }
        *idle = survivors;
        drop(idle);

        for browser in expired {
            self.publish(MetricPayload::BrowserDestroyed {
                pool_size: self.busy.len(),
                reason: DestroyReason::Idle,
            });
            browser.close().await;
        }
    }
}

/// A checked-out browser. Releases automatically on drop (best-effort,
/// spawned in the background, mirroring the teacher's `BrowserCheckout`);
/// prefer the explicit async `release()`.
pub struct PoolHandle {
    pool: Arc<Pool>,
    id: Option<String>,
}

impl PoolHandle {
    pub fn browser_id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    /// Snapshot of the owning pool's state, exposed directly off the
    /// handle for doctor/CLI consumers that don't want to go through the
    /// metrics pipeline just to ask "how busy is this pool right now".
    pub async fn stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    pub async fn new_page(&self, url: &str) -> Result<spider_chrome::Page, PoolError> {
        let id = self.id.as_deref().unwrap_or("");
        let entry = self
            .pool
            .busy
            .get(id)
            .ok_or_else(|| PoolError::LaunchFailed("browser missing from busy set".into()))?;
        entry
            .browser
            .new_page(url)
            .await
            .map_err(|e| PoolError::LaunchFailed(e.to_string()))
    }

    /// Explicit release, preferred over letting `Drop` spawn a
    /// best-effort background task.
    pub async fn release(mut self) {
        if let Some(id) = self.id.take() {
            self.pool.release(&id).await;
        }
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move { pool.release(&id).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_keeps_min_within_max() {
        let config = PoolConfig::default();
        assert!(config.min_size <= config.max_size);
    }

    #[tokio::test]
    async fn acquire_rejects_once_draining() {
        let pool = Pool::new(
            "session-a",
            PoolConfig {
                min_size: 0,
                max_size: 1,
                ..Default::default()
            },
            BrowserConfig::builder().build().unwrap(),
            lesca_reliability::clock::real_clock(),
            None,
        );
        pool.draining.store(true, Ordering::SeqCst);
        assert!(matches!(pool.acquire().await, Err(PoolError::Draining)));
    }

    #[tokio::test]
    async fn stats_report_zero_on_a_fresh_pool() {
        let pool = Pool::new(
            "session-b",
            PoolConfig {
                min_size: 0,
                max_size: 2,
                ..Default::default()
            },
            BrowserConfig::builder().build().unwrap(),
            lesca_reliability::clock::real_clock(),
            None,
        );
        let stats = pool.stats().await;
        assert_eq!(stats.busy, 0);
        assert_eq!(stats.max_size, 2);
    }
}
