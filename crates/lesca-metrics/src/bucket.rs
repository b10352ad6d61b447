//! Per-session (and `__global__`) metric bucket (spec.md §4.H).

use std::collections::VecDeque;
use std::sync::Arc;

use lesca_types::{EpochMs, MetricEvent, MetricPayload};

#[derive(Debug, Clone, Copy, Default)]
pub struct TimingStats {
    pub count: u64,
    pub total_ms: u64,
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

impl TimingStats {
    fn record(&mut self, value_ms: u64) {
        self.count += 1;
        self.total_ms += value_ms;
        self.min_ms = Some(self.min_ms.map_or(value_ms, |m| m.min(value_ms)));
        self.max_ms = Some(self.max_ms.map_or(value_ms, |m| m.max(value_ms)));
    }

    pub fn avg_ms(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total_ms as f64 / self.count as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

/// Lifetime counters plus reconstructed pool state for one bucket.
#[derive(Debug, Clone, Default)]
pub struct BucketCounters {
    pub acquisitions: u64,
    pub releases: u64,
    pub failures: u64,
    pub created: u64,
    pub destroyed: u64,
    pub circuit_trips: u64,
    pub pool_size: usize,
    pub active: usize,
    pub idle: usize,
    pub breaker_state: BreakerState,
}

pub struct Bucket {
    pub max_history: usize,
    pub history: VecDeque<Arc<MetricEvent>>,
    pub acquire_timing: TimingStats,
    pub release_timing: TimingStats,
    pub create_timing: TimingStats,
    pub counters: BucketCounters,
    pub first_event_at: Option<EpochMs>,
    pub last_event_at: Option<EpochMs>,
}

impl Bucket {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            history: VecDeque::new(),
            acquire_timing: TimingStats::default(),
            release_timing: TimingStats::default(),
            create_timing: TimingStats::default(),
            counters: BucketCounters::default(),
            first_event_at: None,
            last_event_at: None,
        }
    }

    /// Applies one event: updates lifetime counters, timing arrays, and
    /// the active/idle state machine (spec.md §4.H "Active/idle counts
    /// are maintained by a state machine on the event stream").
    pub fn ingest(&mut self, event: Arc<MetricEvent>) {
        self.first_event_at.get_or_insert(event.timestamp);
        self.last_event_at = Some(event.timestamp);

        match &event.payload {
            MetricPayload::PoolAcquire {
                duration_ms,
                pool_size,
                ..
            } => {
                self.acquire_timing.record(*duration_ms);
                self.counters.acquisitions += 1;
                self.counters.active += 1;
                self.counters.idle = self.counters.idle.saturating_sub(1);
                self.counters.pool_size = (*pool_size).max(self.counters.pool_size);
            }
            MetricPayload::PoolRelease {
                duration_ms,
                pool_size,
            } => {
                self.release_timing.record(*duration_ms);
                self.counters.releases += 1;
                self.counters.active = self.counters.active.saturating_sub(1);
                self.counters.idle += 1;
                self.counters.pool_size = (*pool_size).max(self.counters.pool_size);
            }
            MetricPayload::PoolFailure { .. } => {
                self.counters.failures += 1;
            }
            MetricPayload::PoolExhausted { pool_size, .. } => {
                self.counters.failures += 1;
                self.counters.pool_size = (*pool_size).max(self.counters.pool_size);
            }
            MetricPayload::BrowserCreated {
                duration_ms,
                pool_size,
            } => {
                self.create_timing.record(*duration_ms);
                self.counters.created += 1;
                self.counters.idle += 1;
                self.counters.pool_size = (*pool_size).max(self.counters.pool_size);
            }
            MetricPayload::BrowserDestroyed { pool_size, .. } => {
                self.counters.destroyed += 1;
                self.counters.idle = self.counters.idle.saturating_sub(1);
                self.counters.pool_size = (*pool_size).max(self.counters.pool_size);
            }
            MetricPayload::CircuitTrip { .. } => {
                self.counters.circuit_trips += 1;
                self.counters.breaker_state = BreakerState::Open;
            }
            MetricPayload::CircuitHalfOpen { .. } => {
                self.counters.breaker_state = BreakerState::HalfOpen;
            }
            MetricPayload::CircuitReset { .. } => {
                self.counters.breaker_state = BreakerState::Closed;
            }
        }

        self.history.push_back(event);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// Events within `[now - window, now]`.
    pub fn events_in_window(&self, now_ms: EpochMs, window_ms: i64) -> Vec<&Arc<MetricEvent>> {
        let floor = now_ms - window_ms;
        self.history
            .iter()
            .filter(|e| e.timestamp >= floor && e.timestamp <= now_ms)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesca_types::MetricEvent;

    fn acquire(duration_ms: u64, reused: bool, pool_size: usize) -> Arc<MetricEvent> {
        Arc::new(MetricEvent::new(
            1_000,
            Some("s".into()),
            MetricPayload::PoolAcquire {
                duration_ms,
                reused,
                pool_size,
            },
        ))
    }

    #[test]
    fn acquire_then_release_restores_idle() {
        let mut bucket = Bucket::new(100);
        bucket.ingest(acquire(10, true, 1));
        assert_eq!(bucket.counters.active, 1);
        bucket.ingest(Arc::new(MetricEvent::new(
            1_100,
            Some("s".into()),
            MetricPayload::PoolRelease {
                duration_ms: 1,
                pool_size: 1,
            },
        )));
        assert_eq!(bucket.counters.active, 0);
        assert_eq!(bucket.counters.idle, 1);
    }

    #[test]
    fn history_is_capped_at_max_history() {
        let mut bucket = Bucket::new(2);
        for i in 0..5 {
            bucket.ingest(acquire(i, true, 1));
        }
        assert_eq!(bucket.history.len(), 2);
    }

    #[test]
    fn timing_stats_track_min_max_avg() {
        let mut stats = TimingStats::default();
        stats.record(10);
        stats.record(30);
        assert_eq!(stats.min_ms, Some(10));
        assert_eq!(stats.max_ms, Some(30));
        assert_eq!(stats.avg_ms(), Some(20.0));
    }
}
