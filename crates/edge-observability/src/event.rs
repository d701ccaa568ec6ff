//! Terminal session event observers.

use std::sync::Mutex;

use edge_core::{SessionEvent, SessionObserver, SessionReport};

use crate::logging::{LogFormat, LogLevel, StructuredLogger};
use crate::metrics::SessionMetrics;

/// Writes one structured log line per finished session.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    format: LogFormat,
    min_level: LogLevel,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new(LogFormat::default())
    }
}

impl LoggingObserver {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            min_level: LogLevel::Debug,
        }
    }

    /// Drop lines below `level`.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Log level for a terminal event.
    ///
    /// Disconnects are not page errors and log at debug.
    pub fn level_for(event: &SessionEvent) -> LogLevel {
        match event {
            SessionEvent::Success | SessionEvent::Redirect { .. } => LogLevel::Info,
            SessionEvent::NotFound => LogLevel::Info,
            SessionEvent::Error { .. } => LogLevel::Error,
            SessionEvent::Aborted => LogLevel::Debug,
        }
    }

    /// Format the line for an event without writing it.
    pub fn render(&self, event: &SessionEvent, report: &SessionReport) -> Option<String> {
        let logger = StructuredLogger::new(report.request_id.clone())
            .with_format(self.format)
            .with_min_level(self.min_level);
        let metrics = SessionMetrics::from_report(event, report);

        let mut entry = logger
            .entry(Self::level_for(event), "session finished")
            .field("event", event.name())
            .field("mode", report.mode.to_string())
            .field_u64("flush_count", u64::from(report.flush_count))
            .field_u64("bytes", report.bytes_written as u64);

        if let Some(status) = metrics.status_code {
            entry = entry.field_u64("status", u64::from(status));
        }
        if let Some(us) = metrics.time_to_first_flush_us {
            entry = entry.field_u64("ttfb_us", us);
        }
        match event {
            SessionEvent::Error { class, message } => {
                entry = entry
                    .field("error_class", class.to_string())
                    .field("error", message.clone());
            }
            SessionEvent::Redirect { target } => {
                entry = entry.field("location", target.clone());
            }
            _ => {}
        }

        entry.render()
    }
}

impl SessionObserver for LoggingObserver {
    fn on_terminal(&self, event: &SessionEvent, report: &SessionReport) {
        tracing::debug!(request_id = %report.request_id, event = event.name(), "session terminal event");
        if let Some(line) = self.render(event, report) {
            eprintln!("{}", line);
        }
    }
}

/// Keeps every terminal event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(SessionEvent, SessionMetrics)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<(SessionEvent, SessionMetrics)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionObserver for RecordingObserver {
    fn on_terminal(&self, event: &SessionEvent, report: &SessionReport) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event.clone(), SessionMetrics::from_report(event, report)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_core::{DeliveryMode, ErrorClass, RequestId, TimingContext};
    use http::StatusCode;

    fn report(status: StatusCode) -> SessionReport {
        SessionReport {
            request_id: RequestId::from_string("req-7"),
            mode: DeliveryMode::Streaming,
            status: Some(status),
            flush_count: 4,
            bytes_written: 512,
            fallback_boundaries: vec!["b1".to_string()],
            timing: TimingContext::new(),
        }
    }

    #[test]
    fn test_error_event_line() {
        let observer = LoggingObserver::default();
        let event = SessionEvent::Error {
            class: ErrorClass::TopLevel,
            message: "boom".to_string(),
        };
        let line = observer.render(&event, &report(StatusCode::INTERNAL_SERVER_ERROR)).unwrap();

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "error");
        assert_eq!(value["event"], "error");
        assert_eq!(value["error_class"], "top_level");
        assert_eq!(value["status"], 500);
    }

    #[test]
    fn test_min_level_filters_aborted() {
        let observer = LoggingObserver::default().with_min_level(LogLevel::Info);
        assert!(observer
            .render(&SessionEvent::Aborted, &report(StatusCode::OK))
            .is_none());
        assert!(observer
            .render(&SessionEvent::NotFound, &report(StatusCode::NOT_FOUND))
            .is_some());
    }

    #[test]
    fn test_aborted_is_not_an_error() {
        assert_eq!(LoggingObserver::level_for(&SessionEvent::Aborted), LogLevel::Debug);
    }

    #[test]
    fn test_recording_observer() {
        let observer = RecordingObserver::new();
        observer.on_terminal(&SessionEvent::Success, &report(StatusCode::OK));

        let events = observer.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, SessionEvent::Success);
        assert_eq!(events[0].1.fallback_boundaries, vec!["b1".to_string()]);
    }
}
