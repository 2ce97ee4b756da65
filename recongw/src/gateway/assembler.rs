//! Builds the multipart payload sent to the upstream processing endpoint.
//!
//! Assembly is pure: no bytes are copied and no network call is made, so a failure here can
//! never leave a partial request on the wire.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use super::batch::FileBatch;
use super::result::Failure;

/// One file part of the outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    pub field_name: &'static str,
    pub file_name: String,
    pub content_type: String,
    pub content: Bytes,
}

/// The full outbound request body, in upstream field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPayload {
    parts: Vec<MultipartPart>,
}

impl MultipartPayload {
    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.parts.iter().map(|part| part.content.len()).sum()
    }

    /// Convert into the HTTP client's form type. Part bodies are handed over without copying.
    pub fn into_form(self) -> Result<Form, reqwest::Error> {
        let mut form = Form::new();
        for part in self.parts {
            let length = part.content.len() as u64;
            let body = Part::stream_with_length(part.content, length)
                .file_name(part.file_name)
                .mime_str(&part.content_type)?;
            form = form.part(part.field_name, body);
        }
        Ok(form)
    }
}

/// Assemble a batch into a multipart payload.
///
/// Every file is placed under its role's fixed upstream field name with its original name and
/// media type. An empty batch is rejected as `PreconditionFailed`.
pub fn assemble(batch: FileBatch) -> Result<MultipartPayload, Failure> {
    if batch.is_empty() {
        return Err(Failure::precondition_failed());
    }

    let parts = batch
        .into_files()
        .map(|file| {
            let (role, file_name, content_type, content) = file.into_parts();
            MultipartPart {
                field_name: role.field_name(),
                file_name,
                content_type,
                content,
            }
        })
        .collect();

    Ok(MultipartPayload { parts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::batch::{FileBuffer, FileRole};
    use crate::gateway::result::ErrorKind;

    fn sample_batch() -> FileBatch {
        let mut batch = FileBatch::new();
        batch
            .push(FileBuffer::new(FileRole::Xlsx, "ledger.xlsx", None, b"PK\x03\x04".to_vec()))
            .unwrap();
        batch
            .push(FileBuffer::new(FileRole::Pdf, "remittance-1.pdf", Some("application/pdf"), b"%PDF-1".to_vec()))
            .unwrap();
        batch
            .push(FileBuffer::new(FileRole::Eml, "advice.eml", Some("message/rfc822"), b"From: a".to_vec()))
            .unwrap();
        batch
            .push(FileBuffer::new(FileRole::Pdf, "remittance-2.pdf", Some("application/pdf"), b"%PDF-2".to_vec()))
            .unwrap();
        batch
    }

    #[test]
    fn test_empty_batch_is_precondition_failure() {
        let failure = assemble(FileBatch::new()).unwrap_err();
        assert_eq!(failure.kind, ErrorKind::PreconditionFailed);
        assert_eq!(failure.message, "No files uploaded");
    }

    #[test]
    fn test_parts_use_upstream_field_names_in_role_order() {
        let payload = assemble(sample_batch()).unwrap();

        let fields: Vec<(&str, &str)> = payload
            .parts()
            .iter()
            .map(|part| (part.field_name, part.file_name.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("pdf", "remittance-1.pdf"),
                ("pdf", "remittance-2.pdf"),
                ("eml", "advice.eml"),
                ("xlsx", "ledger.xlsx"),
            ]
        );
        assert_eq!(payload.len(), 4);
        assert_eq!(payload.total_bytes(), 6 + 6 + 7 + 4);
    }

    #[test]
    fn test_declared_media_types_are_preserved() {
        let payload = assemble(sample_batch()).unwrap();
        let types: Vec<&str> = payload.parts().iter().map(|part| part.content_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "application/pdf",
                "application/pdf",
                "message/rfc822",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ]
        );
    }

    #[test]
    fn test_content_is_shared_not_copied() {
        let content = Bytes::from(vec![7u8; 1024]);
        let batch = FileBatch::new()
            .with_file(FileBuffer::new(FileRole::Pdf, "big.pdf", None, content.clone()))
            .unwrap();

        let payload = assemble(batch).unwrap();
        assert_eq!(payload.parts()[0].content.as_ptr(), content.as_ptr());
    }

    #[test]
    fn test_any_non_empty_batch_converts_to_form() {
        for role in FileRole::ALL {
            let batch = FileBatch::new()
                .with_file(FileBuffer::new(role, "weird name ü", Some("bogus"), Vec::new()))
                .unwrap();
            let payload = assemble(batch).unwrap();
            assert!(payload.into_form().is_ok());
        }
    }
}
