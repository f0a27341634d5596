//! Error types for carnet-login.

use thiserror::Error;

use crate::ledger::TokenScope;

/// Errors raised by the session, login and command layers.
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with a status >= 400.
    #[error("{message}")]
    Transport { status: u16, message: String },

    /// A stage of the login flow failed.
    #[error("login failed: {0}")]
    Login(String),

    /// The secure action challenge could not be completed.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Credentials or options are malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A token refresh call failed; the login flow has to run again.
    #[error("refreshing {scope} failed: {message}")]
    Refresh { scope: TokenScope, message: String },

    /// Network-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A page did not have the expected structure.
    #[error("unexpected page: {0}")]
    Html(String),

    #[error("{0}")]
    Unexpected(String),
}

impl Error {
    /// Status code for transport errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error came out of the login flow.
    pub fn is_login(&self) -> bool {
        matches!(self, Error::Login(_))
    }
}

/// Result type for carnet-login operations.
pub type Result<T> = std::result::Result<T, Error>;
