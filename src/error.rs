//! Error types for SentrySol

use std::io;

use thiserror::Error;

/// Result type alias for SentrySol
pub type Result<T> = std::result::Result<T, Error>;

/// SentrySol errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request input (rejected before any stream is opened)
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external collaborator failed or answered with an unexpected shape
    #[error("{collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        /// Collaborator name (e.g. "helius", "blocksec", "mistral")
        collaborator: &'static str,
        /// What went wrong
        message: String,
    },

    /// An invariant of the core computation was violated
    #[error("Aggregation fault: {0}")]
    Aggregation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a collaborator error
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator,
            message: message.into(),
        }
    }

    /// Attribute a failure to a collaborator, keeping an existing attribution
    #[must_use]
    pub fn into_unavailable(self, collaborator: &'static str) -> Self {
        match self {
            Self::CollaboratorUnavailable { .. } => self,
            other => Self::collaborator(collaborator, other.to_string()),
        }
    }

    /// Whether a retry could plausibly succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// HTTP status used when the error surfaces before a stream is opened
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::CollaboratorUnavailable { .. } | Self::Http(_) => 502,
            _ => 500,
        }
    }
}
