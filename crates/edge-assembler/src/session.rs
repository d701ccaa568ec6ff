//! Per-request session bookkeeping.

use std::collections::HashSet;

use edge_core::{
    DeliveryMode, EdgeError, Region, RegionSet, RequestId, SessionReport, SessionState,
    TimingContext,
};
use edge_metadata::MetadataReadiness;
use edge_streaming::BoundaryId;
use http::StatusCode;

use crate::outcome::RenderOutcome;

/// State of one response session.
///
/// Tracks which regions received metadata, which markers were consumed and
/// how many writes happened, so the assembler can enforce write-once rules.
#[derive(Debug, Clone)]
pub struct ResponseSession {
    mode: DeliveryMode,
    state: SessionState,
    outcome: Option<RenderOutcome>,
    readiness: MetadataReadiness,
    emitted: RegionSet,
    markers: RegionSet,
    status: Option<StatusCode>,
    flush_count: u32,
    bytes_written: usize,
    suspended: HashSet<BoundaryId>,
    fallback_boundaries: Vec<String>,
    timing: TimingContext,
}

impl ResponseSession {
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            state: SessionState::Opening,
            outcome: None,
            readiness: MetadataReadiness::Pending,
            emitted: RegionSet::empty(),
            markers: RegionSet::empty(),
            status: None,
            flush_count: 0,
            bytes_written: 0,
            suspended: HashSet::new(),
            fallback_boundaries: Vec::new(),
            timing: TimingContext::new(),
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Move to `next`. Staying in the current state is a no-op.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "invalid session transition");
            return false;
        }
        tracing::trace!(from = %self.state, to = %next, "session transition");
        self.state = next;
        true
    }

    /// Consume an insertion point. Returns `false` if it was already seen.
    pub fn consume_marker(&mut self, region: Region) -> bool {
        self.markers.insert(region)
    }

    pub fn saw_marker(&self, region: Region) -> bool {
        self.markers.contains(region)
    }

    /// Record that a region's metadata has been written.
    pub fn mark_emitted(&mut self, region: Region) -> Result<(), EdgeError> {
        if !self.emitted.insert(region) {
            return Err(EdgeError::RegionAlreadyEmitted(region));
        }
        Ok(())
    }

    pub fn emitted(&self) -> RegionSet {
        self.emitted
    }

    pub fn is_emitted(&self, region: Region) -> bool {
        self.emitted.contains(region)
    }

    pub fn set_readiness(&mut self, readiness: MetadataReadiness) {
        self.readiness = readiness;
    }

    pub fn readiness(&self) -> MetadataReadiness {
        self.readiness
    }

    pub fn set_outcome(&mut self, outcome: RenderOutcome) {
        self.outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Option<&RenderOutcome> {
        self.outcome.as_ref()
    }

    /// Record the committed status.
    pub fn commit_status(&mut self, status: StatusCode) -> Result<(), EdgeError> {
        if let Some(existing) = self.status {
            return Err(EdgeError::StatusCommitted(existing));
        }
        self.status = Some(status);
        Ok(())
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sync write counters from the sink.
    pub fn record_writes(&mut self, flush_count: u32, bytes_written: usize) {
        if self.flush_count == 0 && flush_count > 0 {
            self.timing.mark("first_flush");
        }
        self.flush_count = flush_count;
        self.bytes_written = bytes_written;
    }

    pub fn flush_count(&self) -> u32 {
        self.flush_count
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Remember a boundary whose fallback was written.
    pub fn note_suspended(&mut self, boundary: &BoundaryId) {
        self.suspended.insert(boundary.clone());
    }

    /// Resolve a suspended boundary. Returns `true` if it had a fallback out.
    pub fn resume(&mut self, boundary: &BoundaryId) -> bool {
        self.suspended.remove(boundary)
    }

    /// Record a boundary that ended on fallback or error markup.
    pub fn note_fallback(&mut self, boundary: &BoundaryId) {
        if !self.fallback_boundaries.iter().any(|b| b == boundary.as_str()) {
            self.fallback_boundaries.push(boundary.to_string());
        }
    }

    /// Boundaries still showing their fallback at close ended on it.
    pub fn settle_suspended(&mut self) {
        let mut remaining: Vec<BoundaryId> = self.suspended.drain().collect();
        remaining.sort();
        for boundary in remaining {
            self.note_fallback(&boundary);
        }
    }

    pub fn fallback_boundaries(&self) -> &[String] {
        &self.fallback_boundaries
    }

    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }

    pub fn timing_mut(&mut self) -> &mut TimingContext {
        &mut self.timing
    }

    /// Build the report handed to observers.
    pub fn report(&self, request_id: RequestId) -> SessionReport {
        SessionReport {
            request_id,
            mode: self.mode,
            status: self.status,
            flush_count: self.flush_count,
            bytes_written: self.bytes_written,
            fallback_boundaries: self.fallback_boundaries.clone(),
            timing: self.timing.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut session = ResponseSession::new(DeliveryMode::Streaming);
        assert!(session.transition(SessionState::EmittingShell));
        assert!(session.transition(SessionState::EmittingShell));
        assert!(!session.transition(SessionState::Opening));
        assert!(session.transition(SessionState::AwaitingMetadata));
        assert!(session.transition(SessionState::SplicingMetadata));
        assert!(session.transition(SessionState::EmittingBody));
        assert!(session.transition(SessionState::Closed));
        assert!(!session.transition(SessionState::Erroring));
        assert!(session.is_closed());
    }

    #[test]
    fn test_region_emitted_once() {
        let mut session = ResponseSession::new(DeliveryMode::Blocking);
        session.mark_emitted(Region::Head).unwrap();
        assert!(matches!(
            session.mark_emitted(Region::Head),
            Err(EdgeError::RegionAlreadyEmitted(Region::Head))
        ));
        assert!(session.is_emitted(Region::Head));
        assert!(!session.is_emitted(Region::Body));
    }

    #[test]
    fn test_status_committed_once() {
        let mut session = ResponseSession::new(DeliveryMode::Streaming);
        session.commit_status(StatusCode::OK).unwrap();
        assert!(session.commit_status(StatusCode::NOT_FOUND).is_err());
        assert_eq!(session.status(), Some(StatusCode::OK));
    }

    #[test]
    fn test_markers_consumed_once() {
        let mut session = ResponseSession::new(DeliveryMode::Streaming);
        assert!(session.consume_marker(Region::Body));
        assert!(!session.consume_marker(Region::Body));
        assert!(session.saw_marker(Region::Body));
        assert!(!session.saw_marker(Region::Head));
    }

    #[test]
    fn test_report() {
        let mut session = ResponseSession::new(DeliveryMode::Streaming);
        let boundary = BoundaryId::new("b1");
        session.note_suspended(&boundary);
        assert!(session.resume(&boundary));
        assert!(!session.resume(&boundary));
        session.note_fallback(&boundary);
        session.note_fallback(&boundary);
        session.record_writes(2, 40);

        let report = session.report(RequestId::from_string("req-1"));
        assert_eq!(report.flush_count, 2);
        assert_eq!(report.bytes_written, 40);
        assert_eq!(report.fallback_boundaries, vec!["b1".to_string()]);
        assert!(report.timing.time_to_first_flush().is_some());
    }
}
