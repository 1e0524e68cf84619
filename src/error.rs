#![forbid(unsafe_code)]

//! Error taxonomy shared by the registry, the session helpers and the YouTube
//! client.

use oauth2::basic::BasicErrorResponse;
use oauth2::{HttpClientError, RequestTokenError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A registry entry, playlist, channel or session record is missing.
    #[error("{0} not found")]
    NotFound(String),

    /// A stored or received value has the wrong shape or fails a check.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid url of the playlist: \"{0}\" is not a link to playlist")]
    InvalidUrl(String),

    /// The remote API answered with a non-success status.
    #[error("YouTube API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| "unknown error".to_string());
                Self::Api { status, message }
            }
            ureq::Error::Transport(transport) => Self::Transport(transport.to_string()),
        }
    }
}

impl From<RequestTokenError<HttpClientError<ureq::Error>, BasicErrorResponse>> for Error {
    fn from(err: RequestTokenError<HttpClientError<ureq::Error>, BasicErrorResponse>) -> Self {
        match err {
            // Token endpoints answer grant errors with 400.
            RequestTokenError::ServerResponse(response) => Self::Api {
                status: 400,
                message: response.to_string(),
            },
            RequestTokenError::Parse(err, _) => Self::Transport(format!("token response: {err}")),
            other => Self::Transport(other.to_string()),
        }
    }
}
