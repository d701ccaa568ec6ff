//! Public SDK for the streaming response assembler.
//!
//! This crate re-exports all platform functionality:
//!
//! ```ignore
//! use edge_sdk::prelude::*;
//!
//! let platform = Platform::new(PlatformConfig::load("edge.toml")?)?;
//!
//! async fn handle(platform: &Platform, ctx: RequestContext, sink: ResponseSink<Tx, E>) {
//!     let (metadata, feed) = MetadataChannel::new(route_tree(&ctx), RouteMetadata::default());
//!     let source = engine.render(&ctx, feed);
//!
//!     match platform.respond(&ctx, source, metadata, sink).await {
//!         Ok(session) => tracing::debug!(flushes = session.flush_count(), "done"),
//!         Err(e) if e.is_disconnect() => {}
//!         Err(e) => tracing::error!(error = %e, "response failed"),
//!     }
//! }
//! ```

mod config;
mod respond;

pub use config::*;
pub use respond::*;

pub use edge_assembler;
pub use edge_classifier;
pub use edge_core;
pub use edge_metadata;
pub use edge_observability;
pub use edge_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::*;
    pub use crate::respond::*;
    pub use edge_assembler::*;
    pub use edge_classifier::*;
    pub use edge_core::*;
    pub use edge_metadata::*;
    pub use edge_observability::*;
    pub use edge_streaming::*;
}
