//! Error types for mergebot

use thiserror::Error;

/// Infrastructure errors: forge transport, auth, configuration
#[derive(Debug, Error)]
pub enum Error {
    /// GitLab answered with a non-success status
    #[error("GitLab API error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    GitLabApi {
        /// HTTP status code, if the request got that far
        status: Option<u16>,
        /// Error description
        message: String,
    },

    /// The request did not complete in time
    #[error("request timed out: {0}")]
    RequestTimeout(String),

    /// Any other HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// GitLab reported that its own rebase failed
    #[error("{0}")]
    RebaseFailed(String),

    /// GitLab did not finish the rebase within the allotted time
    #[error("GitLab rebase did not finish in time")]
    RebaseTimeout,

    /// Missing or invalid credentials
    #[error("authentication error: {0}")]
    Auth(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Invariant violation inside mergebot itself
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::GitLabApi {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Whether retrying the same request later may succeed.
    ///
    /// Request timeouts and 5xx responses qualify.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RequestTimeout(_) => true,
            Self::GitLabApi {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status of an API error, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::GitLabApi { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::RequestTimeout(e.to_string())
        } else if let Some(status) = e.status() {
            Self::api(status.as_u16(), e.to_string())
        } else {
            Self::Http(e)
        }
    }
}

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
