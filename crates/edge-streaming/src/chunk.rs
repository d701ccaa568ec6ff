//! Typed renderer output.

use std::fmt;

use edge_core::Region;

/// Identifies a suspense boundary within one render.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryId(pub String);

impl BoundaryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marker for the place where a region's metadata is spliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InsertionPoint {
    region: Region,
}

impl InsertionPoint {
    pub fn head() -> Self {
        Self {
            region: Region::Head,
        }
    }

    pub fn body() -> Self {
        Self {
            region: Region::Body,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }
}

/// Failures and navigation signals raised by the render engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// An error thrown while rendering.
    ///
    /// `fallback_html` is the catching error boundary's markup, if any.
    #[error("render error: {message}")]
    Thrown {
        message: String,
        fallback_html: Option<String>,
    },

    /// The requested resource does not exist.
    ///
    /// `fallback_html` is the nearest not-found boundary's markup, if any.
    #[error("not found")]
    NotFound { fallback_html: Option<String> },

    #[error("redirect to {target}")]
    Redirect { target: String, permanent: bool },

    #[error("render timed out")]
    Timeout,

    #[error("render stream ended without a terminal event")]
    Incomplete,
}

impl RenderError {
    /// Thrown error without boundary markup.
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown {
            message: message.into(),
            fallback_html: None,
        }
    }

    /// Not found without boundary markup.
    pub fn not_found() -> Self {
        Self::NotFound {
            fallback_html: None,
        }
    }

    /// Temporary redirect.
    pub fn redirect(target: impl Into<String>) -> Self {
        Self::Redirect {
            target: target.into(),
            permanent: false,
        }
    }

    /// Check if this error is a navigation signal (not-found or redirect).
    pub fn is_navigation(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Redirect { .. })
    }

    /// Check if this error can be contained by a boundary.
    ///
    /// Only thrown errors stay local; navigation signals and engine
    /// timeouts always end the whole stream.
    pub fn is_boundary_local(&self) -> bool {
        matches!(self, Self::Thrown { .. })
    }
}

/// A unit of renderer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentChunk {
    /// Static markup in source order.
    Html(String),
    /// Metadata insertion point.
    Marker(InsertionPoint),
    /// A boundary suspended; `html` is its loading markup.
    Fallback { boundary: BoundaryId, html: String },
    /// A suspended boundary finished rendering.
    Resolved { boundary: BoundaryId, html: String },
    /// A boundary failed (`Some`) or the whole stream failed (`None`).
    Failed {
        boundary: Option<BoundaryId>,
        error: RenderError,
    },
    /// The stream finished successfully.
    Done,
}

impl ContentChunk {
    pub fn html(html: impl Into<String>) -> Self {
        Self::Html(html.into())
    }

    pub fn fallback(boundary: &str, html: impl Into<String>) -> Self {
        Self::Fallback {
            boundary: BoundaryId::new(boundary),
            html: html.into(),
        }
    }

    pub fn resolved(boundary: &str, html: impl Into<String>) -> Self {
        Self::Resolved {
            boundary: BoundaryId::new(boundary),
            html: html.into(),
        }
    }

    pub fn boundary_failed(boundary: &str, error: RenderError) -> Self {
        Self::Failed {
            boundary: Some(BoundaryId::new(boundary)),
            error,
        }
    }

    pub fn failed(error: RenderError) -> Self {
        Self::Failed {
            boundary: None,
            error,
        }
    }

    /// Check if this chunk ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { boundary: None, .. })
    }

    /// The boundary this chunk belongs to, if any.
    pub fn boundary(&self) -> Option<&BoundaryId> {
        match self {
            Self::Fallback { boundary, .. } | Self::Resolved { boundary, .. } => Some(boundary),
            Self::Failed { boundary, .. } => boundary.as_ref(),
            _ => None,
        }
    }
}
