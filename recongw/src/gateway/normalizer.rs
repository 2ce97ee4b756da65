//! Classification of raw upstream replies into a [`ProcessResult`].
//!
//! The upstream reply shape is not contractually fixed. It may be a file (CSV or opaque
//! bytes), a JSON envelope carrying a download URL or inline base64 data, a JSON error, or
//! something else entirely. [`normalize`] decides between these in a fixed precedence order:
//!
//! 1. non-2xx status → `UpstreamRejected`
//! 2. binary content type → `BinaryArtifact`
//! 3. JSON object → inspect `success`
//! 4. anything else → `MalformedResponse`
//!
//! The status is checked first so that an error page served as `application/octet-stream`
//! is never mistaken for a result file, and the content type is checked before the body is
//! decoded so that large binary payloads are never run through a JSON parser.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde_json::{Map, Value};

use super::result::{ErrorKind, Failure, ProcessResult};

/// File name suggested to the caller when the upstream does not declare one.
pub const DEFAULT_FILE_NAME: &str = "processed_data.csv";
/// Content type assumed for inline binary data that does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/csv";

const BINARY_CONTENT_TYPES: [&str; 2] = ["text/csv", "application/octet-stream"];
const GENERIC_FAILURE_MESSAGE: &str = "Error processing files";
const EMPTY_SUCCESS_MESSAGE: &str = "Processing complete, but no download URL was provided.";

/// The raw reply from the upstream service, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            content_disposition: None,
            body: body.into(),
        }
    }

    pub fn with_content_disposition(mut self, value: impl Into<String>) -> Self {
        self.content_disposition = Some(value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Classify an upstream reply. Total and side-effect free: every input maps to exactly one
/// [`ProcessResult`], and the same input always maps to the same result.
pub fn normalize(raw: &UpstreamResponse) -> ProcessResult {
    if !raw.is_success() {
        let message = json_object(&raw.body)
            .and_then(|object| declared_message(&object))
            .unwrap_or_else(|| format!("{GENERIC_FAILURE_MESSAGE}: upstream service responded with status {}", raw.status));
        return Failure::new(ErrorKind::UpstreamRejected, message).into();
    }

    if let Some(content_type) = raw.content_type.as_deref().filter(|value| is_binary_content_type(value)) {
        let suggested_file_name = raw
            .content_disposition
            .as_deref()
            .and_then(disposition_file_name)
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
        return ProcessResult::BinaryArtifact {
            bytes: raw.body.clone(),
            content_type: content_type.to_string(),
            suggested_file_name,
        };
    }

    let Some(object) = json_object(&raw.body) else {
        return Failure::new(
            ErrorKind::MalformedResponse,
            "The document processing service returned a response that is neither a file nor JSON",
        )
        .into();
    };

    match object.get("success") {
        Some(Value::Bool(true)) => declared_success(&object),
        Some(Value::Bool(false)) => {
            let message = declared_message(&object).unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
            Failure::new(ErrorKind::UpstreamRejected, message).into()
        }
        _ => Failure::new(
            ErrorKind::MalformedResponse,
            "The document processing service did not report whether processing succeeded",
        )
        .into(),
    }
}

fn declared_success(object: &Map<String, Value>) -> ProcessResult {
    if let Some(url) = string_field(object, "downloadUrl") {
        return ProcessResult::RedirectArtifact { url: url.to_string() };
    }

    if let Some(encoded) = string_field(object, "binaryData") {
        return match STANDARD.decode(encoded) {
            Ok(bytes) => ProcessResult::BinaryArtifact {
                bytes: Bytes::from(bytes),
                content_type: string_field(object, "contentType").unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
                suggested_file_name: string_field(object, "fileName")
                    .and_then(sanitize_file_name)
                    .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
            },
            Err(e) => Failure::new(
                ErrorKind::MalformedResponse,
                format!("The document processing service returned undecodable binary data: {e}"),
            )
            .into(),
        };
    }

    Failure::new(ErrorKind::EmptySuccess, EMPTY_SUCCESS_MESSAGE).into()
}

/// `text/csv` or `application/octet-stream`, ignoring case and parameters
fn is_binary_content_type(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    BINARY_CONTENT_TYPES.iter().any(|binary| value.starts_with(binary))
}

fn json_object(body: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Human-readable text from an upstream JSON body: `message` wins over `error`.
fn declared_message(object: &Map<String, Value>) -> Option<String> {
    string_field(object, "message")
        .or_else(|| string_field(object, "error"))
        .map(str::to_string)
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}

/// Extract the file name from a `Content-Disposition` header value. An RFC 6266 `filename*`
/// takes precedence over a plain `filename`.
fn disposition_file_name(header: &str) -> Option<String> {
    let params = disposition_params(header);
    let param = |name: &str| {
        params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    };

    param("filename*")
        .and_then(decode_extended_value)
        .and_then(|name| sanitize_file_name(&name))
        .or_else(|| param("filename").and_then(sanitize_file_name))
}

/// Split header parameters on `;`, honouring quoted strings and their backslash escapes.
fn disposition_params(header: &str) -> Vec<(String, String)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in header.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);

    segments
        .iter()
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Decode `charset'language'percent-encoded` (RFC 5987). Only UTF-8 is understood.
fn decode_extended_value(value: &str) -> Option<String> {
    let (charset, rest) = value.split_once('\'')?;
    let (_language, encoded) = rest.split_once('\'')?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    urlencoding::decode(encoded).ok().map(|name| name.into_owned())
}

/// Keep only the final path component so a declared name can never point elsewhere.
fn sanitize_file_name(name: &str) -> Option<String> {
    name.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
}
