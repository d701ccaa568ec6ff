//! Document metadata tracking for streamed responses.
//!
//! - `MetadataFragment` - Rendered title/meta/link markup for one region
//! - `RouteTree` - Parallel slot layout used to pick the active slot
//! - `MetadataChannel` / `MetadataFeed` - Readiness tracking with dedup

mod channel;
mod fragment;
mod tree;

pub use channel::*;
pub use fragment::*;
pub use tree::*;
