//! Error types for permission reconciliation.
//!
//! Errors are categorized so callers can tell a configuration mistake from a
//! resource that is already gone, and both from a failure of the remote API.

use std::fmt;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Desired state is malformed. Raised before any remote call.
    Validation,
    /// The remote resource or its permission subsystem does not exist.
    NotFound,
    /// Any other remote failure (network, auth, server error).
    Transient,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid configuration",
            Self::NotFound => "Resource not found",
            Self::Transient => "Remote API failure",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Validation => "Fix the permission entry in your config and try again",
            Self::NotFound => "The resource was removed remotely; run `grantsync refresh`",
            Self::Transient => "Check the Grafana URL and credentials, then re-run apply",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while fetching or converging permissions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Permission level string is not one of the known levels.
    #[error("unknown datasource permission: {0}")]
    UnknownPermission(String),

    /// Desired grant cannot be represented.
    #[error("invalid permission item: {0}")]
    InvalidGrant(String),

    /// Token declaration cannot be sent.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Remote resource is absent.
    #[error("{resource} not found")]
    NotFound {
        /// What was looked up, e.g. "datasource 4".
        resource: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Remote answered with something we cannot interpret.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create a not-found error for the named resource.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnknownPermission(_) | Error::InvalidGrant(_) | Error::InvalidToken(_) => {
                ErrorCategory::Validation
            }
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Http { .. } | Error::InvalidResponse(_) => ErrorCategory::Transient,
        }
    }

    /// Whether the remote reported the resource as absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Whether this error was raised before talking to the remote.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }
}
