//! Render stream normalization and transport sinks.
//!
//! - `ContentChunk` - Typed renderer output
//! - `RenderStreamAdapter` - Lazy, finite, non-restartable chunk sequence
//! - `split_markers` - Insertion point extraction from raw markup
//! - `ResponseSink` - Status-then-body transport writer

mod adapter;
mod chunk;
mod markers;
mod sink;

pub use adapter::*;
pub use chunk::*;
pub use markers::*;
pub use sink::*;
