use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::gateway::{ErrorKind, ProcessResult};

/// Result of a processing request, as returned to the browser.
///
/// On success exactly one of `binaryData` and `downloadUrl` is set. On failure neither is set
/// and `error` carries a message that can be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    /// Base64 encoded result file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Location of a result file the caller must fetch separately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ProcessResponse {
    pub fn failure(kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            binary_data: None,
            content_type: None,
            file_name: None,
            download_url: None,
            message: Some(message.clone()),
            error: Some(message),
            error_kind: kind,
        }
    }
}

impl From<ProcessResult> for ProcessResponse {
    fn from(result: ProcessResult) -> Self {
        match result {
            ProcessResult::BinaryArtifact {
                bytes,
                content_type,
                suggested_file_name,
            } => Self {
                success: true,
                binary_data: Some(STANDARD.encode(&bytes)),
                content_type: Some(content_type),
                file_name: Some(suggested_file_name),
                download_url: None,
                message: None,
                error: None,
                error_kind: None,
            },
            ProcessResult::RedirectArtifact { url } => Self {
                success: true,
                binary_data: None,
                content_type: None,
                file_name: None,
                download_url: Some(url),
                message: None,
                error: None,
                error_kind: None,
            },
            ProcessResult::Failure(failure) => Self::failure(Some(failure.kind), failure.message),
        }
    }
}
