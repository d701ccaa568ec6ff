//! Terminal outcome resolution.
//!
//! Maps how a render ended onto a status code and a body policy, given
//! whether the status line is already on the wire.

use edge_core::{ErrorClass, SessionEvent};
use edge_streaming::{BoundaryId, RenderError};
use http::header::{HeaderValue, LOCATION};
use http::{HeaderMap, StatusCode};

use crate::config::AssemblerConfig;
use crate::markup;

/// Where a thrown error was caught.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorScope {
    /// No boundary caught it; the whole render failed.
    TopLevel,
    /// Caught by the named boundary.
    Boundary(BoundaryId),
}

/// How a render ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Success,
    ThrownError {
        message: String,
        scope: ErrorScope,
        fallback_html: Option<String>,
    },
    NotFound {
        fallback_html: Option<String>,
    },
    Redirect {
        target: String,
        permanent: bool,
    },
    Timeout,
    Incomplete,
}

impl RenderOutcome {
    /// Outcome for a render error raised at `boundary` (or top level).
    ///
    /// Only thrown errors stay inside a boundary; anything else is
    /// treated as top level regardless of where it was raised.
    pub fn from_error(boundary: Option<&BoundaryId>, error: &RenderError) -> Self {
        match error {
            RenderError::Thrown {
                message,
                fallback_html,
            } => Self::ThrownError {
                message: message.clone(),
                scope: match boundary {
                    Some(id) => ErrorScope::Boundary(id.clone()),
                    None => ErrorScope::TopLevel,
                },
                fallback_html: fallback_html.clone(),
            },
            RenderError::NotFound { fallback_html } => Self::NotFound {
                fallback_html: fallback_html.clone(),
            },
            RenderError::Redirect { target, permanent } => Self::Redirect {
                target: target.clone(),
                permanent: *permanent,
            },
            RenderError::Timeout => Self::Timeout,
            RenderError::Incomplete => Self::Incomplete,
        }
    }

    /// Check if this outcome ends the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::ThrownError {
                scope: ErrorScope::Boundary(_),
                ..
            }
        )
    }

    /// The terminal event reported for this outcome.
    pub fn event(&self) -> SessionEvent {
        match self {
            Self::Success
            | Self::ThrownError {
                scope: ErrorScope::Boundary(_),
                ..
            } => SessionEvent::Success,
            Self::ThrownError { message, .. } => SessionEvent::Error {
                class: ErrorClass::TopLevel,
                message: message.clone(),
            },
            Self::NotFound { .. } => SessionEvent::NotFound,
            Self::Redirect { target, .. } => SessionEvent::Redirect {
                target: target.clone(),
            },
            Self::Timeout => SessionEvent::Error {
                class: ErrorClass::Timeout,
                message: "render timed out".to_string(),
            },
            Self::Incomplete => SessionEvent::Error {
                class: ErrorClass::Incomplete,
                message: "render ended without a terminal event".to_string(),
            },
        }
    }

    fn error_class(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Incomplete => "incomplete",
            _ => "top_level",
        }
    }
}

/// Whether the status line has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Uncommitted,
    Committed(StatusCode),
}

/// What to do with the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPolicy {
    /// Keep the rendered document as is.
    Keep,
    /// Discard rendered output and send this body markup as a full document.
    Replace(String),
    /// Send no body.
    Empty,
    /// Substitute a boundary's content with this markup.
    BoundaryFallback { boundary: BoundaryId, html: String },
    /// Append this markup to what was already sent.
    Inject(String),
}

/// Status, headers and body policy for a terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub policy: BodyPolicy,
}

impl Resolution {
    fn new(status: StatusCode, policy: BodyPolicy) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            policy,
        }
    }
}

/// Resolves outcomes against the commit state of the response.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeResolver<'a> {
    config: &'a AssemblerConfig,
}

impl<'a> OutcomeResolver<'a> {
    pub fn new(config: &'a AssemblerConfig) -> Self {
        Self { config }
    }

    /// Resolve an outcome.
    ///
    /// Once committed, the status never changes and only injected markup is
    /// possible.
    pub fn resolve(&self, outcome: &RenderOutcome, commit: Commit) -> Resolution {
        let committed = match commit {
            Commit::Uncommitted => None,
            Commit::Committed(status) => Some(status),
        };

        match (outcome, committed) {
            (RenderOutcome::Success, status) => {
                Resolution::new(status.unwrap_or(StatusCode::OK), BodyPolicy::Keep)
            }
            (
                RenderOutcome::ThrownError {
                    scope: ErrorScope::Boundary(boundary),
                    fallback_html,
                    ..
                },
                status,
            ) => Resolution::new(
                status.unwrap_or(StatusCode::OK),
                BodyPolicy::BoundaryFallback {
                    boundary: boundary.clone(),
                    html: fallback_html
                        .clone()
                        .unwrap_or_else(|| self.config.boundary_error_html.clone()),
                },
            ),
            (RenderOutcome::NotFound { fallback_html }, None) => Resolution::new(
                StatusCode::NOT_FOUND,
                BodyPolicy::Replace(self.not_found_html(fallback_html.as_deref())),
            ),
            (RenderOutcome::NotFound { fallback_html }, Some(status)) => Resolution::new(
                status,
                BodyPolicy::Inject(markup::not_found_inline(&self.not_found_html(fallback_html.as_deref()))),
            ),
            (RenderOutcome::Redirect { target, permanent }, None) => {
                let status = if *permanent {
                    StatusCode::PERMANENT_REDIRECT
                } else {
                    StatusCode::TEMPORARY_REDIRECT
                };
                let mut resolution = Resolution::new(status, BodyPolicy::Empty);
                match HeaderValue::try_from(target.as_str()) {
                    Ok(value) => {
                        resolution.headers.insert(LOCATION, value);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, %target, "redirect target is not a valid header value");
                    }
                }
                resolution
            }
            (RenderOutcome::Redirect { target, .. }, Some(status)) => {
                Resolution::new(status, BodyPolicy::Inject(markup::redirect_refresh(target)))
            }
            (
                RenderOutcome::ThrownError { .. }
                | RenderOutcome::Timeout
                | RenderOutcome::Incomplete,
                None,
            ) => Resolution::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                BodyPolicy::Replace(self.config.error_html.clone()),
            ),
            (
                RenderOutcome::ThrownError { .. }
                | RenderOutcome::Timeout
                | RenderOutcome::Incomplete,
                Some(status),
            ) => Resolution::new(
                status,
                BodyPolicy::Inject(markup::error_indicator(outcome.error_class())),
            ),
        }
    }

    fn not_found_html(&self, fallback_html: Option<&str>) -> String {
        fallback_html
            .unwrap_or(&self.config.not_found_html)
            .to_string()
    }
}
