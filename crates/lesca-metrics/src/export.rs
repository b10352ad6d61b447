//! JSON and CSV export of collector state (spec.md §4.H, §6).

use std::sync::Arc;

use lesca_types::{EpochMs, MetricEvent};
use serde::Serialize;
use thiserror::Error;

use crate::collector::{MetricsCollector, SessionMetrics, Summary};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write csv row: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct JsonExport<'a> {
    #[serde(rename = "exportedAt")]
    exported_at: EpochMs,
    summary: &'a Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<Vec<Arc<MetricEvent>>>,
}

impl Summary {
    fn serializable_sessions(&self) -> Vec<SerializableSessionMetrics<'_>> {
        self.sessions.iter().map(SerializableSessionMetrics).collect()
    }
}

/// Thin serde wrapper over [`SessionMetrics`] so that field renames live
/// here rather than polluting the aggregate struct with serde attributes.
struct SerializableSessionMetrics<'a>(&'a SessionMetrics);

impl Serialize for Summary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Summary", 2)?;
        s.serialize_field("sessions", &self.serializable_sessions())?;
        s.serialize_field("totals", &SerializableTotals(&self.totals))?;
        s.end()
    }
}

struct SerializableTotals<'a>(&'a crate::collector::SummaryTotals);

impl Serialize for SerializableTotals<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let t = self.0;
        let mut s = serializer.serialize_struct("SummaryTotals", 8)?;
        s.serialize_field("totalAcquisitions", &t.total_acquisitions)?;
        s.serialize_field("totalReleases", &t.total_releases)?;
        s.serialize_field("totalFailures", &t.total_failures)?;
        s.serialize_field("browsersCreated", &t.browsers_created)?;
        s.serialize_field("browsersDestroyed", &t.browsers_destroyed)?;
        s.serialize_field("circuitTrips", &t.circuit_trips)?;
        s.serialize_field("openBreakers", &t.open_breakers)?;
        s.serialize_field("halfOpenBreakers", &t.half_open_breakers)?;
        s.end()
    }
}

impl Serialize for SerializableSessionMetrics<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let m = self.0;
        let mut s = serializer.serialize_struct("SessionMetrics", 14)?;
        s.serialize_field("sessionName", &m.session_name)?;
        s.serialize_field("poolSize", &m.pool_size)?;
        s.serialize_field("activeBrowsers", &m.active_browsers)?;
        s.serialize_field("idleBrowsers", &m.idle_browsers)?;
        s.serialize_field("totalAcquisitions", &m.total_acquisitions)?;
        s.serialize_field("totalReleases", &m.total_releases)?;
        s.serialize_field("totalFailures", &m.total_failures)?;
        s.serialize_field("browsersCreated", &m.browsers_created)?;
        s.serialize_field("browsersDestroyed", &m.browsers_destroyed)?;
        s.serialize_field("acquisitionsPerMinute", &m.acquisitions_per_minute)?;
        s.serialize_field("failureRate", &m.failure_rate)?;
        s.serialize_field("circuitState", &format!("{:?}", m.circuit_state).to_lowercase())?;
        s.serialize_field("circuitTrips", &m.circuit_trips)?;
        s.serialize_field("acquireAvgMs", &m.acquire_timing.avg_ms())?;
        s.end()
    }
}

/// Renders `{exportedAt, summary, history?}` (spec.md §6). `history`, when
/// requested, is the `__global__` bucket's raw event log plus every
/// per-session bucket's, concatenated in bucket-iteration order.
pub fn export_json(
    collector: &MetricsCollector,
    exported_at: EpochMs,
    include_history: bool,
) -> Result<String, ExportError> {
    let summary = collector.get_summary(exported_at);
    let history = include_history.then(|| {
        let mut all: Vec<Arc<MetricEvent>> = collector.history(lesca_types::GLOBAL_BUCKET);
        for name in collector.session_names() {
            all.extend(collector.history(&name));
        }
        all.sort_by_key(|e| e.timestamp);
        all
    });
    let export = JsonExport {
        exported_at,
        summary: &summary,
        history,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

const CSV_HEADERS: &[&str] = &[
    "session_name",
    "pool_size",
    "active_browsers",
    "idle_browsers",
    "total_acquisitions",
    "total_releases",
    "total_failures",
    "browsers_created",
    "browsers_destroyed",
    "acquisitions_per_minute",
    "failure_rate",
    "circuit_state",
    "circuit_trips",
    "acquire_avg_ms",
    "acquire_min_ms",
    "acquire_max_ms",
    "release_avg_ms",
    "browser_create_avg_ms",
];

fn opt_ms(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

fn opt_f64(v: Option<f64>) -> String {
    v.map(|n| format!("{n:.2}")).unwrap_or_default()
}

/// Renders one row per session with the exact column set from spec.md §6.
/// Uses the `csv` crate so comma/quote/newline quoting follows RFC 4180
/// without hand-rolled escaping.
pub fn export_csv(collector: &MetricsCollector, now_ms: EpochMs) -> Result<String, ExportError> {
    let summary = collector.get_summary(now_ms);
    let mut writer = csv::WriterBuilder::new().from_writer(vec![]);
    writer.write_record(CSV_HEADERS)?;
    for m in &summary.sessions {
        writer.write_record(&[
            m.session_name.clone(),
            m.pool_size.to_string(),
            m.active_browsers.to_string(),
            m.idle_browsers.to_string(),
            m.total_acquisitions.to_string(),
            m.total_releases.to_string(),
            m.total_failures.to_string(),
            m.browsers_created.to_string(),
            m.browsers_destroyed.to_string(),
            format!("{:.2}", m.acquisitions_per_minute),
            format!("{:.4}", m.failure_rate),
            format!("{:?}", m.circuit_state).to_lowercase(),
            m.circuit_trips.to_string(),
            opt_f64(m.acquire_timing.avg_ms()),
            opt_ms(m.acquire_timing.min_ms),
            opt_ms(m.acquire_timing.max_ms),
            opt_f64(m.release_timing.avg_ms()),
            opt_f64(m.browser_create_timing.avg_ms()),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .expect("flushing a Vec<u8>-backed csv writer cannot fail");
    Ok(String::from_utf8(bytes).expect("csv writer only emits valid utf-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorConfig;
    use lesca_types::MetricPayload;

    fn collector_with_one_session() -> std::sync::Arc<MetricsCollector> {
        let collector = MetricsCollector::new(CollectorConfig::default());
        collector.ingest(Arc::new(MetricEvent::new(
            1_000,
            Some("alpha".into()),
            MetricPayload::PoolAcquire {
                duration_ms: 12,
                reused: true,
                pool_size: 2,
            },
        )));
        collector
    }

    #[test]
    fn csv_export_has_exact_header_row() {
        let collector = collector_with_one_session();
        let csv_text = export_csv(&collector, 1_000).unwrap();
        let header = csv_text.lines().next().unwrap();
        assert_eq!(header, CSV_HEADERS.join(","));
    }

    #[test]
    fn csv_export_renders_empty_string_for_absent_timing() {
        let collector = MetricsCollector::new(CollectorConfig::default());
        collector.ingest(Arc::new(MetricEvent::new(
            1_000,
            Some("alpha".into()),
            MetricPayload::PoolFailure {
                error: "boom".into(),
                error_code: None,
            },
        )));
        let csv_text = export_csv(&collector, 1_000).unwrap();
        let row = csv_text.lines().nth(1).unwrap();
        // acquire_avg_ms/min/max columns should be empty since no acquire
        // events were recorded for this session.
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields[13], "");
        assert_eq!(fields[14], "");
        assert_eq!(fields[15], "");
    }

    #[test]
    fn json_export_includes_history_only_when_requested() {
        let collector = collector_with_one_session();
        let without = export_json(&collector, 2_000, false).unwrap();
        assert!(!without.contains("\"history\""));
        let with = export_json(&collector, 2_000, true).unwrap();
        assert!(with.contains("\"history\""));
    }
}
