//! Core error kinds, independent of transport.
//!
//! Use-case code returns [`Error`]; the HTTP layer maps each kind to a status
//! code and envelope error code in `api::response`.

use thiserror::Error;
use tracing::warn;

use crate::spotify::SpotifyError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range request parameters
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// No bound token, or the token was rejected upstream
    #[error("Not authenticated")]
    Unauthenticated,

    /// Upstream reports the resource as absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other upstream failure; the detail is logged, not surfaced
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Failure in the service itself
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable code used in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ValidationFailed(_) => "VALIDATION_ERROR",
            Error::Unauthenticated => "UNAUTHORIZED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::UpstreamFailure(_) | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to hand to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Error::ValidationFailed(msg) => msg.clone(),
            Error::Unauthenticated => "Authentication required".to_string(),
            Error::NotFound(what) => format!("{} not found", what),
            Error::UpstreamFailure(_) => "The streaming provider request failed".to_string(),
            Error::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<SpotifyError> for Error {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::Unauthorized => Error::Unauthenticated,
            SpotifyError::NotFound(what) => Error::NotFound(what),
            SpotifyError::Cancelled => Error::Internal("request cancelled".to_string()),
            other => {
                warn!(error = %other, "upstream call failed");
                Error::UpstreamFailure(other.to_string())
            }
        }
    }
}
