//! # Error Taxonomy
//!
//! Closed set of failure kinds for the transport client and secret accessor.
//!
//! Callers branch on variants rather than string-matching messages:
//! - `NotFound` / `FieldNotFound` are expected outcomes, not logged as errors
//! - `Auth` surfaces only after the single re-authentication retry
//! - `Timeout` is kept distinct from `Transport` so a slow server can be
//!   told apart from an unreachable one

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the transport client and secret accessor.
///
/// Messages carry secret paths and server status codes, never credential
/// material or secret values.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No secret exists at the given path.
    #[error("no secret at '{path}'")]
    NotFound { path: String },

    /// The secret exists but does not contain the requested field.
    #[error("secret at '{path}' has no field '{field}'")]
    FieldNotFound { path: String, field: String },

    /// Credential exchange or token validation failed, after the single
    /// re-authentication retry.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request did not complete within the configured deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Network, TLS, or server-side failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl VaultError {
    /// True for the absence outcomes (`NotFound`, `FieldNotFound`).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::FieldNotFound { .. })
    }

    /// Label used for the operation-outcome metric.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::FieldNotFound { .. } => "not_found",
            Self::Auth(_) => "auth_error",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport_error",
        }
    }

    /// Classify a `reqwest` failure, stripping the URL from the message.
    pub(crate) fn from_reqwest(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(deadline)
        } else {
            Self::Transport(err.without_url().to_string())
        }
    }
}

/// Failures assembling the gateway configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error("failed to read {what} from {path}: {source}")]
    CredentialFile {
        what: &'static str,
        path: String,
        source: std::io::Error,
    },
}
