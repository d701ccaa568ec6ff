//! Request signals to delivery mode.

use edge_core::{DeliveryMode, RequestSignals};

use crate::patterns::{BotFamily, BotPatterns};

/// What kind of client sent a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientClass {
    /// Regular browser (or anything unrecognised).
    Browser,
    /// Crawler that needs a fully-resolved document.
    HtmlLimitedBot,
    /// Bot that renders pages in a headless browser.
    HeadlessBot,
    /// Generic crawler matched by the catch-all patterns.
    GenericBot,
}

impl ClientClass {
    /// Delivery mode for this class of client.
    pub fn delivery_mode(&self) -> DeliveryMode {
        match self {
            Self::Browser => DeliveryMode::Streaming,
            Self::HtmlLimitedBot | Self::HeadlessBot | Self::GenericBot => DeliveryMode::Blocking,
        }
    }

    /// Check if the client is automated.
    pub fn is_bot(&self) -> bool {
        !matches!(self, Self::Browser)
    }
}

/// Maps request signals to a delivery mode.
///
/// Borrows patterns compiled once at startup; classification is pure and
/// deterministic.
#[derive(Debug, Clone, Copy)]
pub struct ClientClassifier<'a> {
    patterns: &'a BotPatterns,
}

impl<'a> ClientClassifier<'a> {
    /// Create a classifier over compiled patterns.
    pub fn new(patterns: &'a BotPatterns) -> Self {
        Self { patterns }
    }

    /// Detect the client class.
    ///
    /// A missing or blank user-agent is treated as a browser. The accept
    /// hint never turns a bot into a streaming client.
    pub fn detect(&self, signals: &RequestSignals) -> ClientClass {
        let Some(user_agent) = signals.user_agent() else {
            return ClientClass::Browser;
        };

        match self.patterns.match_family(user_agent) {
            Some(BotFamily::HtmlLimited) => ClientClass::HtmlLimitedBot,
            Some(BotFamily::Headless) => ClientClass::HeadlessBot,
            Some(BotFamily::Generic) => ClientClass::GenericBot,
            None => ClientClass::Browser,
        }
    }

    /// Classify a request into a delivery mode.
    pub fn classify(&self, signals: &RequestSignals) -> DeliveryMode {
        let class = self.detect(signals);
        tracing::debug!(?class, mode = %class.delivery_mode(), "classified client");
        class.delivery_mode()
    }
}
