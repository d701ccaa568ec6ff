//! Transport sink that commits the status line before the first body byte.

use std::fmt::Display;

use edge_core::EdgeError;
use futures::{Sink, SinkExt};
use http::{HeaderMap, StatusCode};

/// What the assembler is writing into.
///
/// A `Response` target carries a status line and headers; a `Duplex` target
/// is a raw byte stream with no status to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportTarget {
    Response,
    Duplex,
}

impl TransportTarget {
    /// Check if this target accepts a status code.
    pub fn supports_status_code(&self) -> bool {
        matches!(self, Self::Response)
    }
}

/// A frame handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// Status line and headers. Sent at most once, before any body.
    Head {
        status: StatusCode,
        headers: HeaderMap,
    },
    /// Body bytes; each frame is one flush.
    Body(Vec<u8>),
}

/// State of the response sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Nothing committed yet.
    Initial,
    /// Status committed, body may be written.
    HeadSent,
    /// Response has been completed.
    Completed,
}

/// Sink that enforces head-then-body ordering and counts flushes.
///
/// Generic over any `Sink<TransportFrame>`. Write failures are reported as
/// client disconnects.
pub struct ResponseSink<S, E>
where
    S: Sink<TransportFrame, Error = E> + Unpin,
    E: Display,
{
    inner: S,
    target: TransportTarget,
    state: SinkState,
    status: Option<StatusCode>,
    flush_count: u32,
    bytes_written: usize,
}

impl<S, E> ResponseSink<S, E>
where
    S: Sink<TransportFrame, Error = E> + Unpin,
    E: Display,
{
    /// Create a new response sink.
    pub fn new(sink: S, target: TransportTarget) -> Self {
        Self {
            inner: sink,
            target,
            state: SinkState::Initial,
            status: None,
            flush_count: 0,
            bytes_written: 0,
        }
    }

    /// Commit the status line. Must be called before any body bytes.
    ///
    /// On a duplex target the status is recorded but nothing is sent.
    pub async fn send_head(
        &mut self,
        status: StatusCode,
        headers: HeaderMap,
    ) -> Result<(), EdgeError> {
        match self.state {
            SinkState::Initial => {}
            SinkState::HeadSent => {
                return Err(EdgeError::StatusCommitted(
                    self.status.unwrap_or(StatusCode::OK),
                ))
            }
            SinkState::Completed => return Err(EdgeError::Completed),
        }

        if self.target.supports_status_code() {
            self.inner
                .send(TransportFrame::Head { status, headers })
                .await
                .map_err(|e| EdgeError::ClientDisconnect(e.to_string()))?;
        }
        self.status = Some(status);
        self.state = SinkState::HeadSent;

        Ok(())
    }

    /// Write and flush body bytes. The head must be committed first.
    pub async fn send_body(&mut self, bytes: Vec<u8>) -> Result<(), EdgeError> {
        match self.state {
            SinkState::Initial => {
                return Err(EdgeError::StreamError(
                    "body written before status was committed".to_string(),
                ))
            }
            SinkState::HeadSent => {}
            SinkState::Completed => return Err(EdgeError::Completed),
        }

        let len = bytes.len();
        self.inner
            .send(TransportFrame::Body(bytes))
            .await
            .map_err(|e| EdgeError::ClientDisconnect(e.to_string()))?;
        self.flush_count += 1;
        self.bytes_written += len;

        Ok(())
    }

    /// Complete the response and close the transport.
    pub async fn complete(&mut self) -> Result<(), EdgeError> {
        if self.state == SinkState::Completed {
            return Ok(());
        }
        self.state = SinkState::Completed;
        self.inner
            .close()
            .await
            .map_err(|e| EdgeError::ClientDisconnect(e.to_string()))
    }

    /// Check if the status line has been committed.
    pub fn is_committed(&self) -> bool {
        self.state != SinkState::Initial
    }

    /// Committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Number of body writes so far.
    pub fn flush_count(&self) -> u32 {
        self.flush_count
    }

    /// Total body bytes written.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// The transport target.
    pub fn target(&self) -> TransportTarget {
        self.target
    }

    /// Consume the sink and return the inner value.
    pub fn into_inner(self) -> S {
        self.inner
    }
}
