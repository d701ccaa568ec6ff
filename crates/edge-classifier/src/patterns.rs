//! Compiled user-agent patterns.

use regex::{RegexSet, RegexSetBuilder};

use crate::config::ClassifierConfig;

/// Errors from compiling classifier patterns.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("invalid {family} pattern: {source}")]
    InvalidPattern {
        family: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Which family of automated client matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotFamily {
    HtmlLimited,
    Headless,
    Generic,
}

/// Bot patterns compiled once and shared read-only by every request.
#[derive(Debug, Clone)]
pub struct BotPatterns {
    html_limited: RegexSet,
    headless: RegexSet,
    generic: RegexSet,
    exact: Vec<String>,
}

impl BotPatterns {
    /// Compile a configuration.
    pub fn compile(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        Ok(Self {
            html_limited: build_set("html_limited", &config.html_limited_bots)?,
            headless: build_set("headless", &config.headless_bots)?,
            generic: build_set("generic", &config.generic_bots)?,
            exact: config
                .exact_agents
                .iter()
                .map(|a| a.trim().to_lowercase())
                .collect(),
        })
    }

    /// Find the bot family a user-agent belongs to.
    ///
    /// HTML-limited and exact matches take precedence over headless, which
    /// takes precedence over the generic catch-all.
    pub fn match_family(&self, user_agent: &str) -> Option<BotFamily> {
        let lowered = user_agent.trim().to_lowercase();
        if self.exact.iter().any(|a| *a == lowered) || self.html_limited.is_match(user_agent) {
            Some(BotFamily::HtmlLimited)
        } else if self.headless.is_match(user_agent) {
            Some(BotFamily::Headless)
        } else if self.generic.is_match(user_agent) {
            Some(BotFamily::Generic)
        } else {
            None
        }
    }

    /// Total number of patterns.
    pub fn len(&self) -> usize {
        self.html_limited.len() + self.headless.len() + self.generic.len() + self.exact.len()
    }

    /// Check if no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BotPatterns {
    fn default() -> Self {
        // The built-in lists are known-good regexes.
        Self::compile(&ClassifierConfig::default()).expect("default bot patterns compile")
    }
}

fn build_set(family: &'static str, patterns: &[String]) -> Result<RegexSet, ClassifierError> {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
        .map_err(|source| ClassifierError::InvalidPattern { family, source })
}
