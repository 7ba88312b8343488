//! Error types for docqa.
//!
//! Library crates use [`DocQaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The external capability a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Reasoning,
    Search,
    Scrape,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reasoning => "reasoning",
            Self::Search => "search",
            Self::Scrape => "scrape",
        };
        f.write_str(name)
    }
}

/// Top-level error type for all docqa operations.
#[derive(Debug, thiserror::Error)]
pub enum DocQaError {
    /// A capability call did not complete within its time budget.
    #[error("{capability} timed out after {}ms", timeout.as_millis())]
    CapabilityTimeout {
        capability: Capability,
        timeout: Duration,
    },

    /// Connection or transport failure talking to a capability.
    #[error("{capability} unavailable: {message}")]
    CapabilityUnavailable {
        capability: Capability,
        message: String,
    },

    /// The capability answered, but not in a shape we can use.
    #[error("{capability} returned a malformed response: {message}")]
    CapabilityMalformedResponse {
        capability: Capability,
        message: String,
    },

    /// The domain allow-list is empty, so search has nothing to target.
    #[error("no documentation sites are configured")]
    NoAllowedDomainsConfigured,

    /// The reasoning loop ran out of iterations.
    #[error("reasoning loop stopped after {max} iterations")]
    LoopIterationExceeded { max: u32 },

    /// The whole request ran past its wall-clock deadline.
    #[error("request deadline of {}s exceeded", deadline.as_secs())]
    RequestDeadlineExceeded { deadline: Duration },

    /// Another request for the same session held the session past the wait budget.
    #[error("session {session_id} is busy with another request")]
    SessionBusy { session_id: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Tabular source or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, unsupported value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocQaError>;

impl DocQaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unavailable(capability: Capability, msg: impl Into<String>) -> Self {
        Self::CapabilityUnavailable {
            capability,
            message: msg.into(),
        }
    }

    pub fn malformed(capability: Capability, msg: impl Into<String>) -> Self {
        Self::CapabilityMalformedResponse {
            capability,
            message: msg.into(),
        }
    }

    /// Timeouts and transport failures; worth absorbing or retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CapabilityTimeout { .. } | Self::CapabilityUnavailable { .. }
        )
    }
}
