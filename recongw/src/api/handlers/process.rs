use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use bytes::{Bytes, BytesMut};

use crate::{
    AppState,
    api::models::process::ProcessResponse,
    config::UploadConfig,
    errors::{Error, Result},
    gateway::{self, BatchError, ErrorKind, FileBatch, FileBuffer, FileRole, ProcessResult},
};

/// Forward a batch of files to the reconciliation service.
#[utoipa::path(
    post,
    path = "/process-files",
    tag = "processing",
    summary = "Process files",
    description = "Upload PDF and EML remittance files plus at most one XLSX ledger. The files are forwarded to the \
    document-reconciliation service and its reply is returned as a single result object.

Accepted form fields: `pdfFiles` (or `pdf`), `emlFiles` (or `eml`), `xlsxFile` (or `xlsx`).",
    request_body(
        content_type = "multipart/form-data",
        description = "Files to reconcile"
    ),
    responses(
        (status = 200, description = "Processing finished. `binaryData` or `downloadUrl` holds the result unless the service returned none.", body = ProcessResponse),
        (status = 400, description = "No files, an unknown form field, or a file with the wrong extension", body = ProcessResponse),
        (status = 413, description = "A file or the number of files exceeds the upload limits", body = ProcessResponse),
        (status = 502, description = "The reconciliation service rejected the files or returned an unreadable reply", body = ProcessResponse),
        (status = 503, description = "The reconciliation service could not be reached", body = ProcessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn process_files(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ProcessResponse>)> {
    let multipart = multipart.map_err(|e| Error::BadRequest { message: e.body_text() })?;
    let batch = read_batch(multipart, &state.config.uploads).await?;

    let result = gateway::process_batch(state.upstream.as_ref(), batch).await;

    Ok((status_for(&result), Json(result.into())))
}

fn status_for(result: &ProcessResult) -> StatusCode {
    match result.failure().map(|failure| failure.kind) {
        None | Some(ErrorKind::EmptySuccess) => StatusCode::OK,
        Some(ErrorKind::PreconditionFailed) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::ServiceUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(
            ErrorKind::UpstreamRejected
            | ErrorKind::MalformedResponse
            | ErrorKind::TlsConfigurationError
            | ErrorKind::UnknownTransportError,
        ) => StatusCode::BAD_GATEWAY,
    }
}

/// Read every file part of the upload into memory, enforcing the configured limits as the
/// parts stream in.
async fn read_batch(mut multipart: Multipart, limits: &UploadConfig) -> Result<FileBatch> {
    let mut batch = FileBatch::new();

    let mut parts_read = 0;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            // A zero-length body carries no parts at all
            Err(e) if parts_read == 0 && is_incomplete_stream(&e) => break,
            Err(e) => return Err(multipart_error(e)),
        };
        parts_read += 1;

        let field_name = field.name().unwrap_or("").to_string();
        let Some(role) = FileRole::from_form_field(&field_name) else {
            if field.file_name().is_none() {
                tracing::debug!(field = %field_name, "Ignoring text form field");
                continue;
            }
            return Err(Error::BadRequest {
                message: format!("Unexpected form field '{field_name}'"),
            });
        };

        let declared_name = field.file_name().map(|name| name.trim().to_string());
        let content_type = field.content_type().map(str::to_string);
        let content = read_field(field, limits.max_file_size).await?;

        // An untouched file input is submitted as a nameless, empty part
        if content.is_empty() && declared_name.as_deref().is_none_or(str::is_empty) {
            continue;
        }

        if role == FileRole::Xlsx && batch.xlsx_file().is_some() {
            return Err(Error::BadRequest {
                message: BatchError::DuplicateXlsx.to_string(),
            });
        }
        let index = batch.count(role) + 1;
        if index > limits.max_files(role) {
            return Err(Error::PayloadTooLarge {
                message: format!("Too many {role} files: at most {} may be uploaded", limits.max_files(role)),
            });
        }

        let file_name = declared_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| role.default_file_name(index));
        if limits.enforce_extensions && !role.matches_extension(&file_name) {
            return Err(Error::BadRequest {
                message: format!("'{file_name}' is not a {role} file"),
            });
        }

        tracing::debug!(role = %role, file_name = %file_name, bytes = content.len(), "Received file");
        batch
            .push(FileBuffer::new(role, file_name, content_type.as_deref(), content))
            .map_err(|e| Error::BadRequest { message: e.to_string() })?;
    }

    Ok(batch)
}

async fn read_field(mut field: Field<'_>, max_size: u64) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if (buffer.len() + chunk.len()) as u64 > max_size {
            return Err(Error::PayloadTooLarge {
                message: format!("File exceeds the maximum size of {max_size} bytes"),
            });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

fn is_incomplete_stream(e: &MultipartError) -> bool {
    e.body_text().contains("incomplete multipart stream")
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            message: "Upload exceeds the maximum request size".to_string(),
        }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", e.body_text()),
        }
    }
}
