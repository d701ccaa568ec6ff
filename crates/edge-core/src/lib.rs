//! Core abstractions for the streaming response assembler.
//!
//! This crate provides the fundamental types shared by every stage:
//! - `DeliveryMode` - Streaming vs. blocking delivery
//! - `Region` / `RegionSet` - Document regions metadata is spliced into
//! - `RequestContext` - Request identity and classification signals
//! - `SessionState` / `TimingContext` - Session lifecycle tracking
//! - `SessionObserver` - Terminal event reporting

mod context;
mod error;
mod lifecycle;
mod mode;

pub use context::*;
pub use error::*;
pub use lifecycle::*;
pub use mode::*;
