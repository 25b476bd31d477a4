//! Error types for the outreach engine.
//!
//! Library crates use [`OutreachError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! [`ProviderError`] is kept separate: it describes failures of external
//! collaborators (completion, search, fetch) and is recovered inside the
//! generation stages instead of being propagated.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all outreach operations.
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP client construction error.
    #[error("network error: {0}")]
    Network(String),

    /// The client context could not be resolved. Fatal to a run.
    #[error("client context not found: {client_id}")]
    ContextNotFound { client_id: String },

    /// The requested template does not exist. Fatal to a run.
    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    /// The template text cannot be assembled. Fatal to a run.
    #[error("malformed template '{name}': {reason}")]
    MalformedTemplate { name: String, reason: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad profile, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OutreachError>;

impl OutreachError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-template error.
    pub fn malformed_template(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts an orchestration run without retry.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            Self::ContextNotFound { .. }
                | Self::TemplateNotFound { .. }
                | Self::MalformedTemplate { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure of an external collaborator call (completion, search, fetch).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// The provider asked us to slow down.
    #[error("rate limited{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The call did not complete in time.
    #[error("timed out")]
    Timeout,

    /// The provider answered with something we cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure or a blocked target.
    #[error("network error: {0}")]
    Network(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl ProviderError {
    /// Map a `reqwest` transport error onto the collaborator taxonomy.
    pub fn from_transport(context: &str, err: &impl std::fmt::Display, is_timeout: bool) -> Self {
        if is_timeout {
            Self::Timeout
        } else {
            Self::Network(format!("{context}: {err}"))
        }
    }
}
