//! The metrics collector: ingest, aggregate, publish/export (spec.md §4.H).

use std::sync::Arc;

use dashmap::DashMap;
use lesca_events::{EventBus, RecvOutcome};
use lesca_types::{EpochMs, MetricEvent, GLOBAL_BUCKET};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::bucket::{Bucket, BreakerState, TimingStats};

#[derive(Debug, Clone)]
pub struct SessionMetrics {
    pub session_name: String,
    pub pool_size: usize,
    pub active_browsers: usize,
    pub idle_browsers: usize,
    pub total_acquisitions: u64,
    pub total_releases: u64,
    pub total_failures: u64,
    pub browsers_created: u64,
    pub browsers_destroyed: u64,
    pub acquisitions_per_minute: f64,
    pub failure_rate: f64,
    pub circuit_state: BreakerState,
    pub circuit_trips: u64,
    pub acquire_timing: TimingStats,
    pub release_timing: TimingStats,
    pub browser_create_timing: TimingStats,
}

/// Totals summed across every non-global bucket (spec.md §4.H(2)
/// "sum across non-global buckets and count open/half-open breakers").
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryTotals {
    pub total_acquisitions: u64,
    pub total_releases: u64,
    pub total_failures: u64,
    pub browsers_created: u64,
    pub browsers_destroyed: u64,
    pub circuit_trips: u64,
    pub open_breakers: usize,
    pub half_open_breakers: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub sessions: Vec<SessionMetrics>,
    pub totals: SummaryTotals,
}

impl Summary {
    /// Flattened `(header, value)` rows per session, for table-style
    /// rendering (CLI `metrics export --format table`).
    pub fn to_table_rows(&self) -> Vec<Vec<(&'static str, String)>> {
        self.sessions
            .iter()
            .map(|m| {
                vec![
                    ("session_name", m.session_name.clone()),
                    ("pool_size", m.pool_size.to_string()),
                    ("active_browsers", m.active_browsers.to_string()),
                    ("idle_browsers", m.idle_browsers.to_string()),
                    ("total_acquisitions", m.total_acquisitions.to_string()),
                    ("total_failures", m.total_failures.to_string()),
                    (
                        "acquisitions_per_minute",
                        format!("{:.2}", m.acquisitions_per_minute),
                    ),
                    ("failure_rate", format!("{:.4}", m.failure_rate)),
                    ("circuit_state", format!("{:?}", m.circuit_state)),
                ]
            })
            .collect()
    }
}

pub struct CollectorConfig {
    pub max_history_per_bucket: usize,
    pub rate_window_ms: i64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_history_per_bucket: 1000,
            rate_window_ms: 60_000,
        }
    }
}

/// Ingests [`MetricEvent`]s published on an [`EventBus`] and maintains
/// per-session (and `__global__`) aggregates. Never polls the pool or
/// the breaker directly: everything here is reconstructed from the
/// event stream (spec.md §4.H).
pub struct MetricsCollector {
    config: CollectorConfig,
    buckets: DashMap<String, Mutex<Bucket>>,
    subscriber_task: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsCollector {
    pub fn new(config: CollectorConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            buckets: DashMap::new(),
            subscriber_task: Mutex::new(None),
        })
    }

    fn bucket_for(&self, key: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<Bucket>> {
        if !self.buckets.contains_key(key) {
            self.buckets
                .entry(key.to_string())
                .or_insert_with(|| Mutex::new(Bucket::new(self.config.max_history_per_bucket)));
        }
        self.buckets.get(key).expect("just inserted")
    }

    /// Ingests a single event synchronously. Exposed for tests and for
    /// callers that already hold the `Arc<MetricEvent>` (e.g. replaying
    /// a persisted event log).
    pub fn ingest(&self, event: Arc<MetricEvent>) {
        let key = event.bucket().to_string();
        self.bucket_for(&key).lock().ingest(event.clone());
        if key != GLOBAL_BUCKET {
            // nothing additional: global bucket is excluded from per-session
            // aggregation per spec.md §4.H, but we still let callers query it
            // directly via get_global_metrics() below.
        }
    }

    /// Subscribes to `bus` and ingests every event until the bus closes
    /// or [`stop`](Self::stop) is called. Spawns a background task.
    pub fn start(self: &Arc<Self>, bus: &EventBus) {
        let mut sub = bus.subscribe();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match sub.recv().await {
                    RecvOutcome::Event(event) => this.ingest(event),
                    RecvOutcome::Lagged(_) => continue,
                    RecvOutcome::Closed => break,
                }
            }
        });
        *self.subscriber_task.lock() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.subscriber_task.lock().take() {
            handle.abort();
        }
    }

    fn metrics_for_bucket(&self, name: &str, now_ms: EpochMs) -> Option<SessionMetrics> {
        let entry = self.buckets.get(name)?;
        let bucket = entry.lock();
        let window_events = bucket.events_in_window(now_ms, self.config.rate_window_ms);
        let window_secs = (self.config.rate_window_ms as f64 / 1000.0).max(1.0);
        let acquisitions_in_window = window_events
            .iter()
            .filter(|e| matches!(e.payload, lesca_types::MetricPayload::PoolAcquire { .. }))
            .count() as f64;
        let acquisitions_per_minute = acquisitions_in_window * (60.0 / window_secs);

        // spec.md §4.H / §9: codified as failuresInWindow / eventsInWindow,
        // not failures / attempts — every event in the window counts
        // towards the denominator, not just acquire/failure pairs.
        let failures_in_window = window_events
            .iter()
            .filter(|e| {
                matches!(
                    e.payload,
                    lesca_types::MetricPayload::PoolFailure { .. }
                        | lesca_types::MetricPayload::PoolExhausted { .. }
                )
            })
            .count() as f64;
        let failure_rate = if window_events.is_empty() {
            0.0
        } else {
            failures_in_window / window_events.len() as f64
        };

        Some(SessionMetrics {
            session_name: name.to_string(),
            pool_size: bucket.counters.pool_size,
            active_browsers: bucket.counters.active,
            idle_browsers: bucket.counters.idle,
            total_acquisitions: bucket.counters.acquisitions,
            total_releases: bucket.counters.releases,
            total_failures: bucket.counters.failures,
            browsers_created: bucket.counters.created,
            browsers_destroyed: bucket.counters.destroyed,
            acquisitions_per_minute,
            failure_rate,
            circuit_state: bucket.counters.breaker_state,
            circuit_trips: bucket.counters.circuit_trips,
            acquire_timing: bucket.acquire_timing,
            release_timing: bucket.release_timing,
            browser_create_timing: bucket.create_timing,
        })
    }

    pub fn get_session_metrics(&self, session_name: &str, now_ms: EpochMs) -> Option<SessionMetrics> {
        self.metrics_for_bucket(session_name, now_ms)
    }

    pub fn get_global_metrics(&self, now_ms: EpochMs) -> Option<SessionMetrics> {
        self.metrics_for_bucket(GLOBAL_BUCKET, now_ms)
    }

    /// All per-session metrics, excluding the `__global__` bucket
    /// (spec.md §4.H).
    pub fn get_summary(&self, now_ms: EpochMs) -> Summary {
        let mut sessions: Vec<SessionMetrics> = self
            .buckets
            .iter()
            .filter(|e| e.key() != GLOBAL_BUCKET)
            .filter_map(|e| self.metrics_for_bucket(e.key(), now_ms))
            .collect();
        sessions.sort_by(|a, b| a.session_name.cmp(&b.session_name));

        let mut totals = SummaryTotals::default();
        for s in &sessions {
            totals.total_acquisitions += s.total_acquisitions;
            totals.total_releases += s.total_releases;
            totals.total_failures += s.total_failures;
            totals.browsers_created += s.browsers_created;
            totals.browsers_destroyed += s.browsers_destroyed;
            totals.circuit_trips += s.circuit_trips;
            match s.circuit_state {
                BreakerState::Open => totals.open_breakers += 1,
                BreakerState::HalfOpen => totals.half_open_breakers += 1,
                BreakerState::Closed => {}
            }
        }

        Summary { sessions, totals }
    }

    /// Raw event history for one bucket, oldest first.
    pub fn history(&self, bucket_name: &str) -> Vec<Arc<MetricEvent>> {
        self.buckets
            .get(bucket_name)
            .map(|b| b.lock().history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn session_names(&self) -> Vec<String> {
        self.buckets
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k != GLOBAL_BUCKET)
            .collect()
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        if let Some(handle) = self.subscriber_task.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesca_types::MetricPayload;

    fn event(ts: EpochMs, session: Option<&str>, payload: MetricPayload) -> Arc<MetricEvent> {
        Arc::new(MetricEvent::new(ts, session.map(String::from), payload))
    }

    #[test]
    fn ingest_updates_per_session_bucket_not_global() {
        let collector = MetricsCollector::new(CollectorConfig::default());
        collector.ingest(event(
            1_000,
            Some("alpha"),
            MetricPayload::PoolAcquire {
                duration_ms: 5,
                reused: true,
                pool_size: 2,
            },
        ));
        let metrics = collector.get_session_metrics("alpha", 1_000).unwrap();
        assert_eq!(metrics.total_acquisitions, 1);
        assert!(collector.get_global_metrics(1_000).is_none());
    }

    #[test]
    fn summary_excludes_global_bucket() {
        let collector = MetricsCollector::new(CollectorConfig::default());
        collector.ingest(event(
            1_000,
            None,
            MetricPayload::CircuitTrip {
                failures: 5,
                threshold: 5,
            },
        ));
        collector.ingest(event(
            1_000,
            Some("alpha"),
            MetricPayload::PoolAcquire {
                duration_ms: 5,
                reused: false,
                pool_size: 1,
            },
        ));
        let summary = collector.get_summary(1_000);
        assert_eq!(summary.sessions.len(), 1);
        assert_eq!(summary.sessions[0].session_name, "alpha");
    }

    #[test]
    fn failure_rate_divides_by_all_events_in_window_not_just_attempts() {
        let collector = MetricsCollector::new(CollectorConfig::default());
        collector.ingest(event(
            1_000,
            Some("alpha"),
            MetricPayload::PoolAcquire {
                duration_ms: 5,
                reused: false,
                pool_size: 1,
            },
        ));
        collector.ingest(event(
            1_000,
            Some("alpha"),
            MetricPayload::PoolRelease {
                duration_ms: 1,
                pool_size: 1,
            },
        ));
        collector.ingest(event(
            1_000,
            Some("alpha"),
            MetricPayload::PoolFailure {
                error: "boom".into(),
                error_code: None,
            },
        ));
        let metrics = collector.get_session_metrics("alpha", 1_000).unwrap();
        // 1 failure out of 3 total events in the window, not 1 of 2 attempts.
        assert_eq!(metrics.failure_rate, 1.0 / 3.0);
    }

    #[test]
    fn summary_totals_sum_across_sessions_and_count_breaker_states() {
        let collector = MetricsCollector::new(CollectorConfig::default());
        collector.ingest(event(
            1_000,
            Some("alpha"),
            MetricPayload::PoolAcquire {
                duration_ms: 5,
                reused: true,
                pool_size: 2,
            },
        ));
        collector.ingest(event(
            1_000,
            Some("alpha"),
            MetricPayload::CircuitTrip {
                failures: 5,
                threshold: 5,
            },
        ));
        collector.ingest(event(
            1_000,
            Some("beta"),
            MetricPayload::PoolAcquire {
                duration_ms: 5,
                reused: true,
                pool_size: 1,
            },
        ));
        collector.ingest(event(
            1_200,
            Some("beta"),
            MetricPayload::CircuitHalfOpen {
                time_since_trip_ms: 200,
            },
        ));

        let summary = collector.get_summary(1_200);
        assert_eq!(summary.totals.total_acquisitions, 2);
        assert_eq!(summary.totals.circuit_trips, 1);
        assert_eq!(summary.totals.open_breakers, 1);
        assert_eq!(summary.totals.half_open_breakers, 1);
    }

    #[test]
    fn circuit_events_reconstruct_breaker_state() {
        let collector = MetricsCollector::new(CollectorConfig::default());
        collector.ingest(event(
            1_000,
            Some("alpha"),
            MetricPayload::CircuitTrip {
                failures: 5,
                threshold: 5,
            },
        ));
        assert_eq!(
            collector.get_session_metrics("alpha", 1_000).unwrap().circuit_state,
            BreakerState::Open
        );
        collector.ingest(event(
            1_200,
            Some("alpha"),
            MetricPayload::CircuitHalfOpen {
                time_since_trip_ms: 200,
            },
        ));
        assert_eq!(
            collector.get_session_metrics("alpha", 1_200).unwrap().circuit_state,
            BreakerState::HalfOpen
        );
    }
}
