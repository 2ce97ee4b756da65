//! The stable outcome type produced by the gateway for every processing request.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

/// Closed set of failure kinds a processing request can end in.
///
/// New upstream behaviours are mapped onto one of these kinds; the set does not grow ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The upstream service ran but declared failure (non-2xx status or `success: false`)
    UpstreamRejected,
    /// The upstream service declared success but provided no artifact
    EmptySuccess,
    /// The upstream reply could not be classified
    MalformedResponse,
    /// The upstream service could not be reached
    ServiceUnavailable,
    /// The upstream certificate could not be validated
    TlsConfigurationError,
    /// Any other transport-level failure, including timeouts
    UnknownTransportError,
    /// No files were supplied; rejected before any network call
    PreconditionFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UpstreamRejected => "upstream_rejected",
            ErrorKind::EmptySuccess => "empty_success",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::TlsConfigurationError => "tls_configuration_error",
            ErrorKind::UnknownTransportError => "unknown_transport_error",
            ErrorKind::PreconditionFailed => "precondition_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal failure with a message that is safe to show to the user.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub const NO_FILES_MESSAGE: &'static str = "No files uploaded";

    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn precondition_failed() -> Self {
        Self::new(ErrorKind::PreconditionFailed, Self::NO_FILES_MESSAGE)
    }
}

/// Outcome of one processing request. Exactly one variant is ever populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// The upstream returned the result file directly
    BinaryArtifact {
        bytes: Bytes,
        content_type: String,
        suggested_file_name: String,
    },
    /// The upstream returned a URL the caller must fetch separately (legacy shape)
    RedirectArtifact { url: String },
    Failure(Failure),
}

impl ProcessResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, ProcessResult::Failure(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ProcessResult::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Label used for logging and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            ProcessResult::BinaryArtifact { .. } => "binary_artifact",
            ProcessResult::RedirectArtifact { .. } => "redirect_artifact",
            ProcessResult::Failure(failure) => failure.kind.as_str(),
        }
    }
}

impl From<Failure> for ProcessResult {
    fn from(failure: Failure) -> Self {
        ProcessResult::Failure(failure)
    }
}
