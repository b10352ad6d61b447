//! Scheduled session pruning by age and capacity (spec.md §4.D).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lesca_types::EpochMs;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Sessions idle longer than this are evicted regardless of count.
    pub max_session_age_ms: i64,
    /// `0` disables the count phase.
    pub max_sessions: usize,
    /// Interval between scheduled runs; `None` disables the timer.
    pub interval: Option<Duration>,
    pub run_at_start: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_session_age_ms: 30 * 24 * 60 * 60 * 1000,
            max_sessions: 0,
            interval: Some(Duration::from_secs(60 * 60)),
            run_at_start: true,
        }
    }
}

/// What a cleanup pass did (or would do, under `dryRun`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub scanned: usize,
    pub age_evicted: Vec<String>,
    pub count_evicted: Vec<String>,
    pub errors: Vec<String>,
}

impl CleanupReport {
    pub fn total_evicted(&self) -> usize {
        self.age_evicted.len() + self.count_evicted.len()
    }
}

/// Runs the two-phase cleanup scan (age, then count) and, unless
/// `dry_run`, deletes the marked sessions. Re-entrant-safe via the
/// `running` flag on `CleanupScheduler`; this function itself is plain
/// and reusable for one-off CLI invocations too.
pub async fn run_cleanup(
    store: &SessionStore,
    config: CleanupConfig,
    now_ms: EpochMs,
    dry_run: bool,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    let sessions = match store.list(now_ms).await {
        Ok(s) => s,
        Err(e) => {
            report.errors.push(e.to_string());
            return report;
        }
    };
    report.scanned = sessions.len();

    let mut survivors = Vec::with_capacity(sessions.len());
    for session in sessions {
        let too_old = (now_ms - session.metadata.last_used) > config.max_session_age_ms;
        let past_expiry = session.metadata.expires.is_some_and(|e| now_ms > e);
        if too_old || past_expiry {
            report.age_evicted.push(session.name.clone());
        } else {
            survivors.push(session);
        }
    }

    if config.max_sessions > 0 && survivors.len() > config.max_sessions {
        survivors.sort_by(|a, b| b.metadata.last_used.cmp(&a.metadata.last_used));
        let tail = survivors.split_off(config.max_sessions);
        report.count_evicted.extend(tail.into_iter().map(|s| s.name));
    }

    if dry_run {
        return report;
    }

    for name in report.age_evicted.iter().chain(report.count_evicted.iter()) {
        if let Err(e) = store.delete(name).await {
            report.errors.push(format!("{name}: {e}"));
        }
    }

    debug!(
        scanned = report.scanned,
        age_evicted = report.age_evicted.len(),
        count_evicted = report.count_evicted.len(),
        "cleanup pass complete"
    );
    report
}

/// Background scheduler driving `run_cleanup` on an interval. A second
/// concurrent `run_now` while one is in flight is a no-op (spec.md §4.D
/// "re-entrant-safe").
pub struct CleanupScheduler {
    store: Arc<SessionStore>,
    config: RwLock<CleanupConfig>,
    running: AtomicBool,
    run_lock: Mutex<()>,
    last_run: RwLock<Option<EpochMs>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupScheduler {
    pub fn new(store: Arc<SessionStore>, config: CleanupConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            config: RwLock::new(config),
            running: AtomicBool::new(false),
            run_lock: Mutex::new(()),
            last_run: RwLock::new(None),
            timer: Mutex::new(None),
        })
    }

    pub async fn last_run(&self) -> Option<EpochMs> {
        *self.last_run.read().await
    }

    /// Runs one pass now. If a pass is already in flight, returns `None`
    /// without running a second one.
    pub async fn run_now(self: &Arc<Self>, now_ms: EpochMs, dry_run: bool) -> Option<CleanupReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("cleanup already running, skipping re-entrant call");
            return None;
        }
        let _guard = self.run_lock.lock().await;
        let config = *self.config.read().await;
        let report = run_cleanup(&self.store, config, now_ms, dry_run).await;
        if !dry_run {
            *self.last_run.write().await = Some(now_ms);
        }
        self.running.store(false, Ordering::SeqCst);
        Some(report)
    }

    /// Starts the interval timer (if configured). Any previous timer is
    /// stopped first.
    pub async fn start(self: &Arc<Self>) {
        self.stop().await;
        let interval = self.config.read().await.interval;
        let Some(interval) = interval else {
            return;
        };
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now_ms = chrono::Utc::now().timestamp_millis();
                this.run_now(now_ms, false).await;
            }
        });
        *self.timer.lock().await = Some(handle);
        info!("cleanup scheduler timer started");
    }

    pub async fn stop(self: &Arc<Self>) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
        }
    }

    /// Replaces the config; if the interval changed and the timer was
    /// running, restarts it (spec.md §4.D).
    pub async fn update_config(self: &Arc<Self>, new_config: CleanupConfig) {
        let was_running = self.timer.lock().await.is_some();
        let interval_changed = self.config.read().await.interval != new_config.interval;
        *self.config.write().await = new_config;
        if was_running && interval_changed {
            self.start().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::NoopCipher;
    use crate::context::NullContext;
    use crate::store::SessionStoreConfig;

    async fn new_store(dir: &std::path::Path) -> SessionStore {
        SessionStore::new(SessionStoreConfig::new(dir.to_path_buf()), Arc::new(NoopCipher))
    }

    #[tokio::test]
    async fn age_phase_evicts_stale_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path()).await;
        let ctx = NullContext;
        store.create("old", &ctx, 1_000).await.unwrap();
        store.create("fresh", &ctx, 100_000).await.unwrap();

        let config = CleanupConfig {
            max_session_age_ms: 50_000,
            max_sessions: 0,
            interval: None,
            run_at_start: false,
        };
        let report = run_cleanup(&store, config, 100_500, false).await;
        assert_eq!(report.age_evicted, vec!["old".to_string()]);
        assert!(!store.exists("old").await);
        assert!(store.exists("fresh").await);
    }

    #[tokio::test]
    async fn count_phase_keeps_most_recently_used() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path()).await;
        let ctx = NullContext;
        store.create("a", &ctx, 1_000).await.unwrap();
        store.create("b", &ctx, 2_000).await.unwrap();
        store.create("c", &ctx, 3_000).await.unwrap();

        let config = CleanupConfig {
            max_session_age_ms: i64::MAX,
            max_sessions: 2,
            interval: None,
            run_at_start: false,
        };
        let report = run_cleanup(&store, config, 4_000, false).await;
        assert_eq!(report.count_evicted, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn dry_run_does_not_mutate_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = new_store(tmp.path()).await;
        let ctx = NullContext;
        store.create("old", &ctx, 1_000).await.unwrap();

        let config = CleanupConfig {
            max_session_age_ms: 10,
            max_sessions: 0,
            interval: None,
            run_at_start: false,
        };
        let report = run_cleanup(&store, config, 100_000, true).await;
        assert_eq!(report.age_evicted, vec!["old".to_string()]);
        assert!(store.exists("old").await);
    }

    #[tokio::test]
    async fn concurrent_run_now_is_reentrant_safe() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(new_store(tmp.path()).await);
        let scheduler = CleanupScheduler::new(store, CleanupConfig::default());

        scheduler.running.store(true, Ordering::SeqCst);
        let result = scheduler.run_now(1_000, false).await;
        assert!(result.is_none());
        scheduler.running.store(false, Ordering::SeqCst);
    }
}
