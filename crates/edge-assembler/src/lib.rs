//! Response assembly for streaming and blocking delivery.
//!
//! This crate merges the render stream with the metadata channel:
//! - `ResponseAssembler` - The session state machine
//! - `OutcomeResolver` - Terminal outcome to status and body policy
//! - `ResponseSession` - Per-request bookkeeping and invariants

mod assembler;
mod config;
mod markup;
mod outcome;
mod session;

pub use assembler::*;
pub use config::*;
pub use markup::*;
pub use outcome::*;
pub use session::*;
