//! Error types shared across the assembler pipeline.

use http::StatusCode;

use crate::mode::Region;

/// Protocol and transport errors raised while assembling a response.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("client disconnected: {0}")]
    ClientDisconnect(String),

    #[error("status already committed as {0}")]
    StatusCommitted(StatusCode),

    #[error("{0} insertion point already consumed")]
    InsertionPointReused(Region),

    #[error("metadata for {0} region already emitted")]
    RegionAlreadyEmitted(Region),

    #[error("response already completed")]
    Completed,

    #[error("blocking response flushed {0} times")]
    BlockingFlushCount(u32),

    #[error("streaming error: {0}")]
    StreamError(String),
}

impl EdgeError {
    /// Check if this error means the client went away.
    ///
    /// Disconnects abandon the session and are not reported as page errors.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ClientDisconnect(_))
    }
}
