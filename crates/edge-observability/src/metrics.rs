//! Per-session timing and flush metrics.

use edge_core::{DeliveryMode, SessionEvent, SessionReport};
use serde::{Deserialize, Serialize};

/// Metrics for one finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Request ID for correlation.
    pub request_id: String,
    /// Delivery mode.
    pub mode: DeliveryMode,
    /// Terminal event name.
    pub outcome: String,
    /// HTTP status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Number of physical writes.
    pub flush_count: u32,
    /// Body bytes written.
    pub bytes_written: usize,
    /// Time to first flushed byte (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_flush_us: Option<u64>,
    /// Time until body metadata was ready (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_metadata_us: Option<u64>,
    /// Total session duration (microseconds).
    pub total_duration_us: u64,
    /// Boundaries that ended on fallback or error markup.
    pub fallback_boundaries: Vec<String>,
}

impl SessionMetrics {
    /// Build metrics from a session report.
    pub fn from_report(event: &SessionEvent, report: &SessionReport) -> Self {
        Self {
            request_id: report.request_id.to_string(),
            mode: report.mode,
            outcome: event.name().to_string(),
            status_code: report.status.map(|s| s.as_u16()),
            flush_count: report.flush_count,
            bytes_written: report.bytes_written,
            time_to_first_flush_us: report
                .timing
                .time_to_first_flush()
                .map(|d| d.as_micros() as u64),
            time_to_metadata_us: report
                .timing
                .time_to_metadata()
                .map(|d| d.as_micros() as u64),
            total_duration_us: report.timing.elapsed().as_micros() as u64,
            fallback_boundaries: report.fallback_boundaries.clone(),
        }
    }

    /// Format as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
