//! Metric event payloads (spec.md §3 "Metric Event").
//!
//! These are pure data: the event bus (`lesca-events`) moves them, the
//! pool/breaker (`lesca-pool`, `lesca-reliability`) produce them, and the
//! collector (`lesca-metrics`) consumes them. No crate here performs I/O.

use serde::{Deserialize, Serialize};

use crate::EpochMs;

/// Reason a browser was destroyed (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestroyReason {
    Idle,
    Drain,
    Error,
    Disconnected,
}

/// The circuit breaker's prior state, reported on `circuit:reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreviousBreakerState {
    Open,
    HalfOpen,
}

/// Per-type payload of a `MetricEvent`. The `type` discriminant embedded
/// by serde matches the `pool:acquire` / `circuit:trip` style names used
/// in spec.md §3 and §6's CSV export column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetricPayload {
    #[serde(rename = "pool:acquire")]
    PoolAcquire {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        reused: bool,
        #[serde(rename = "poolSize")]
        pool_size: usize,
    },
    #[serde(rename = "pool:release")]
    PoolRelease {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        #[serde(rename = "poolSize")]
        pool_size: usize,
    },
    #[serde(rename = "pool:failure")]
    PoolFailure {
        error: String,
        #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
    #[serde(rename = "pool:exhausted")]
    PoolExhausted {
        #[serde(rename = "waitTimeMs")]
        wait_time_ms: u64,
        #[serde(rename = "poolSize")]
        pool_size: usize,
        #[serde(rename = "maxSize")]
        max_size: usize,
    },
    #[serde(rename = "pool:browser-created")]
    BrowserCreated {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        #[serde(rename = "poolSize")]
        pool_size: usize,
    },
    #[serde(rename = "pool:browser-destroyed")]
    BrowserDestroyed {
        #[serde(rename = "poolSize")]
        pool_size: usize,
        reason: DestroyReason,
    },
    #[serde(rename = "circuit:trip")]
    CircuitTrip { failures: u32, threshold: u32 },
    #[serde(rename = "circuit:reset")]
    CircuitReset {
        #[serde(rename = "previousState")]
        previous_state: PreviousBreakerState,
    },
    #[serde(rename = "circuit:half-open")]
    CircuitHalfOpen {
        #[serde(rename = "timeSinceTrip")]
        time_since_trip_ms: u64,
    },
}

impl MetricPayload {
    /// Stable discriminant string, matching the `type` field written by
    /// serde above. Used for bucket-keyed rate accounting without
    /// round-tripping through JSON.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MetricPayload::PoolAcquire { .. } => "pool:acquire",
            MetricPayload::PoolRelease { .. } => "pool:release",
            MetricPayload::PoolFailure { .. } => "pool:failure",
            MetricPayload::PoolExhausted { .. } => "pool:exhausted",
            MetricPayload::BrowserCreated { .. } => "pool:browser-created",
            MetricPayload::BrowserDestroyed { .. } => "pool:browser-destroyed",
            MetricPayload::CircuitTrip { .. } => "circuit:trip",
            MetricPayload::CircuitReset { .. } => "circuit:reset",
            MetricPayload::CircuitHalfOpen { .. } => "circuit:half-open",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            MetricPayload::PoolFailure { .. }
                | MetricPayload::PoolExhausted { .. }
                | MetricPayload::CircuitTrip { .. }
        )
    }
}

/// A tagged metric record: `{type, timestamp, sessionName?}` plus payload
/// (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub timestamp: EpochMs,
    #[serde(rename = "sessionName", skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    #[serde(flatten)]
    pub payload: MetricPayload,
}

/// Bucket key events without a session are filed under. Excluded from
/// `getSummary()` aggregates per spec.md §4.H.
pub const GLOBAL_BUCKET: &str = "__global__";

impl MetricEvent {
    pub fn new(timestamp: EpochMs, session_name: Option<String>, payload: MetricPayload) -> Self {
        Self {
            timestamp,
            session_name,
            payload,
        }
    }

    pub fn bucket(&self) -> &str {
        self.session_name.as_deref().unwrap_or(GLOBAL_BUCKET)
    }
}
