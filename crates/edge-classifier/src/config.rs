//! Bot pattern configuration.

use serde::{Deserialize, Serialize};

/// Crawlers that only understand fully-rendered HTML.
pub const DEFAULT_HTML_LIMITED_BOTS: &[&str] = &[
    "Mediapartners-Google",
    "Chrome-Lighthouse",
    "Slurp",
    "DuckDuckBot",
    "baiduspider",
    "yandex",
    "sogou",
    "bitlybot",
    "tumblr",
    "vkShare",
    "quora link preview",
    "redditbot",
    "ia_archiver",
    "Bingbot",
    "BingPreview",
    "applebot",
    "facebookexternalhit",
    "facebookcatalog",
    "Twitterbot",
    "LinkedInBot",
    "Slackbot",
    "Discordbot",
    "WhatsApp",
    "SkypeUriPreview",
    "Yeti",
    "googleweblight",
];

/// Bots that execute the page in a headless renderer.
pub const DEFAULT_HEADLESS_BOTS: &[&str] = &["Googlebot(?:[^-]|$)", "Google-PageRenderer"];

/// Catch-all crawler patterns.
pub const DEFAULT_GENERIC_BOTS: &[&str] = &[r"\bbot\b", "crawler", "spider"];

/// Serializable classifier configuration.
///
/// Every entry is a regular expression matched case-insensitively anywhere in
/// the user-agent; `exact_agents` must match the whole (trimmed) string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Crawlers that need a fully-resolved document.
    pub html_limited_bots: Vec<String>,
    /// Headless-renderer bots.
    pub headless_bots: Vec<String>,
    /// Generic crawler patterns.
    pub generic_bots: Vec<String>,
    /// User-agents matched verbatim (case-insensitive).
    pub exact_agents: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            html_limited_bots: to_owned(DEFAULT_HTML_LIMITED_BOTS),
            headless_bots: to_owned(DEFAULT_HEADLESS_BOTS),
            generic_bots: to_owned(DEFAULT_GENERIC_BOTS),
            exact_agents: Vec::new(),
        }
    }
}

impl ClassifierConfig {
    /// Configuration with no patterns at all (everything streams).
    pub fn empty() -> Self {
        Self {
            html_limited_bots: Vec::new(),
            headless_bots: Vec::new(),
            generic_bots: Vec::new(),
            exact_agents: Vec::new(),
        }
    }

    /// Add an HTML-limited bot pattern.
    pub fn with_html_limited_bot(mut self, pattern: impl Into<String>) -> Self {
        self.html_limited_bots.push(pattern.into());
        self
    }

    /// Add an exact user-agent.
    pub fn with_exact_agent(mut self, agent: impl Into<String>) -> Self {
        self.exact_agents.push(agent.into());
        self
    }
}

fn to_owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|s| s.to_string()).collect()
}
