//! Client classification for delivery-mode selection.
//!
//! - `ClassifierConfig` - Serializable bot pattern lists
//! - `BotPatterns` - Patterns compiled once at startup
//! - `ClientClassifier` - Pure `RequestSignals -> DeliveryMode` mapping

mod classifier;
mod config;
mod patterns;

pub use classifier::*;
pub use config::*;
pub use patterns::*;
