//! Assembler configuration.

use serde::{Deserialize, Serialize};

/// Markup the assembler uses when it has to produce content itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// `lang` attribute of generated documents.
    pub lang: String,
    /// Body of the not-found document.
    pub not_found_html: String,
    /// Body of the generic failure document.
    pub error_html: String,
    /// Markup for a failed boundary without its own error boundary markup.
    pub boundary_error_html: String,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            not_found_html: "<h1>404</h1><p>This page could not be found.</p>".to_string(),
            error_html: "<h1>500</h1><p>Internal Server Error.</p>".to_string(),
            boundary_error_html: r#"<div class="boundary-error">Something went wrong.</div>"#
                .to_string(),
        }
    }
}

impl AssemblerConfig {
    /// Set the not-found body.
    pub fn with_not_found_html(mut self, html: impl Into<String>) -> Self {
        self.not_found_html = html.into();
        self
    }

    /// Set the failure page body.
    pub fn with_error_html(mut self, html: impl Into<String>) -> Self {
        self.error_html = html.into();
        self
    }

    /// Set the default boundary error markup.
    pub fn with_boundary_error_html(mut self, html: impl Into<String>) -> Self {
        self.boundary_error_html = html.into();
        self
    }
}
