//! Observability for response sessions.
//!
//! This crate provides:
//! - `StructuredLogger` - JSON/human log lines with request context
//! - `SessionMetrics` - Per-session timing and flush metrics
//! - `LoggingObserver` / `RecordingObserver` - Terminal event sinks

mod event;
mod logging;
mod metrics;

pub use event::*;
pub use logging::*;
pub use metrics::*;

// Re-export from edge-core for convenience
pub use edge_core::{RequestId, SessionEvent, SessionObserver, SessionReport};
