use crate::api::models::process::ProcessResponse;
use crate::gateway::ErrorKind;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed upload, unknown form field, or a request with no files
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload exceeds a configured limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Invalid or incomplete configuration
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Configuration { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => message.clone(),
            Error::Configuration { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }

    /// Upload-side errors are reported under the same kind as an empty batch
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => Some(ErrorKind::PreconditionFailed),
            Error::Configuration { .. } | Error::Other(_) => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Configuration { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::PayloadTooLarge { .. } => {
                tracing::warn!("Upload rejected: {}", self);
            }
            Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ProcessResponse::failure(self.kind(), self.user_message());
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
