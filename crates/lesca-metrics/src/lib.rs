//! Metrics collector: ingest pool/breaker events, aggregate per session,
//! and export summaries (spec.md §4.H).

pub mod bucket;
pub mod collector;
pub mod export;

pub use bucket::{BreakerState, TimingStats};
pub use collector::{CollectorConfig, MetricsCollector, SessionMetrics, Summary};
pub use export::{export_csv, export_json, ExportError};
