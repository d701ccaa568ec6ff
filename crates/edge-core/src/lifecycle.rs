//! Session lifecycle tracking.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use http::StatusCode;

use crate::context::RequestId;
use crate::mode::DeliveryMode;

/// States of the response assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created, nothing written.
    Opening,
    /// Forwarding shell and content chunks.
    EmittingShell,
    /// Body insertion point reached before its metadata was ready.
    AwaitingMetadata,
    /// Writing the deferred metadata.
    SplicingMetadata,
    /// Forwarding content after the body insertion point.
    EmittingBody,
    /// A terminal failure is being resolved.
    Erroring,
    /// Response finished or abandoned.
    Closed,
}

impl SessionState {
    /// Check if a transition to `next` is allowed.
    ///
    /// `Erroring` and `Closed` are reachable from any open state.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Erroring) | (_, Closed) => true,
            (Opening, EmittingShell) => true,
            (EmittingShell, AwaitingMetadata | SplicingMetadata | EmittingBody) => true,
            (AwaitingMetadata, SplicingMetadata) => true,
            (SplicingMetadata, EmittingBody) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opening => "opening",
            Self::EmittingShell => "emitting_shell",
            Self::AwaitingMetadata => "awaiting_metadata",
            Self::SplicingMetadata => "splicing_metadata",
            Self::EmittingBody => "emitting_body",
            Self::Erroring => "erroring",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark. The first mark under a name wins.
    pub fn mark(&mut self, name: &str) {
        self.marks
            .entry(name.to_string())
            .or_insert_with(Instant::now);
    }

    /// Time from start to a named mark.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time to the first flushed byte.
    pub fn time_to_first_flush(&self) -> Option<Duration> {
        self.since_start("first_flush")
    }

    /// Time until body metadata became ready.
    pub fn time_to_metadata(&self) -> Option<Duration> {
        self.since_start("metadata_ready")
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of a terminal page error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Uncaught error outside any boundary.
    TopLevel,
    /// The engine gave up waiting on suspended work.
    Timeout,
    /// The render stream ended without a terminal event.
    Incomplete,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopLevel => write!(f, "top_level"),
            Self::Timeout => write!(f, "timeout"),
            Self::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// The single terminal event reported for every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Page rendered (boundary-local errors included).
    Success,
    /// Page failed at the top level.
    Error { class: ErrorClass, message: String },
    /// Page issued a redirect.
    Redirect { target: String },
    /// Page signalled not-found.
    NotFound,
    /// Client went away; not a page error.
    Aborted,
}

impl SessionEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error { .. } => "error",
            Self::Redirect { .. } => "redirect",
            Self::NotFound => "not_found",
            Self::Aborted => "aborted",
        }
    }
}

/// Summary of a finished session handed to observers.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Request identifier.
    pub request_id: RequestId,
    /// Delivery mode the session ran under.
    pub mode: DeliveryMode,
    /// Final status code, if one was sent.
    pub status: Option<StatusCode>,
    /// Number of physical writes.
    pub flush_count: u32,
    /// Total body bytes written.
    pub bytes_written: usize,
    /// Boundaries that ended on fallback or error markup.
    pub fallback_boundaries: Vec<String>,
    /// Timing marks for the session.
    pub timing: TimingContext,
}

/// Observer for terminal session events.
pub trait SessionObserver: Send + Sync {
    /// Called exactly once when a session ends.
    fn on_terminal(&self, event: &SessionEvent, report: &SessionReport);
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_terminal(&self, _event: &SessionEvent, _report: &SessionReport) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use SessionState::*;
        assert!(Opening.can_transition_to(EmittingShell));
        assert!(EmittingShell.can_transition_to(AwaitingMetadata));
        assert!(AwaitingMetadata.can_transition_to(SplicingMetadata));
        assert!(SplicingMetadata.can_transition_to(EmittingBody));
        assert!(EmittingBody.can_transition_to(Erroring));
        assert!(!EmittingBody.can_transition_to(AwaitingMetadata));
        assert!(!Closed.can_transition_to(Erroring));
    }

    #[test]
    fn test_timing_first_mark_wins() {
        let mut timing = TimingContext::new();
        timing.mark("first_flush");
        let first = timing.time_to_first_flush();
        std::thread::sleep(Duration::from_millis(2));
        timing.mark("first_flush");
        assert_eq!(timing.time_to_first_flush(), first);
        assert!(timing.time_to_metadata().is_none());
    }
}
