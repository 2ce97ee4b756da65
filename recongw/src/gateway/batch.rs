//! In-memory file buffers and the batch they are submitted in.

use bytes::Bytes;
use mime_guess::mime::Mime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

/// Role a file plays in a reconciliation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    Pdf,
    Eml,
    Xlsx,
}

impl FileRole {
    pub const ALL: [FileRole; 3] = [FileRole::Pdf, FileRole::Eml, FileRole::Xlsx];

    /// Multipart field name the upstream service expects for this role.
    pub fn field_name(self) -> &'static str {
        match self {
            FileRole::Pdf => "pdf",
            FileRole::Eml => "eml",
            FileRole::Xlsx => "xlsx",
        }
    }

    pub fn extension(self) -> &'static str {
        self.field_name()
    }

    /// Resolve the role from an inbound form field. The browser UI labels its fields
    /// `pdfFiles`, `emlFiles` and `xlsxFile`; the bare upstream names are accepted too.
    pub fn from_form_field(name: &str) -> Option<Self> {
        match name {
            "pdfFiles" | "pdf" => Some(FileRole::Pdf),
            "emlFiles" | "eml" => Some(FileRole::Eml),
            "xlsxFile" | "xlsx" => Some(FileRole::Xlsx),
            _ => None,
        }
    }

    /// Whether `file_name` carries this role's extension (case-insensitive)
    pub fn matches_extension(self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension()))
    }

    /// Name used when the upload did not declare one. `index` is 1-based.
    pub fn default_file_name(self, index: usize) -> String {
        format!("{}_{}.{}", self.field_name(), index, self.extension())
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileRole::Pdf => "PDF",
            FileRole::Eml => "EML",
            FileRole::Xlsx => "XLSX",
        })
    }
}

/// One uploaded file, held in memory for the lifetime of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBuffer {
    role: FileRole,
    file_name: String,
    content_type: String,
    content: Bytes,
}

impl FileBuffer {
    /// Create a buffer. A declared media type that is missing or not a valid MIME type is
    /// replaced by the type guessed from the file extension.
    pub fn new(role: FileRole, file_name: impl Into<String>, content_type: Option<&str>, content: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let content_type = resolve_content_type(content_type, &file_name);
        Self {
            role,
            file_name,
            content_type,
            content: content.into(),
        }
    }

    pub fn role(&self) -> FileRole {
        self.role
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub(crate) fn into_parts(self) -> (FileRole, String, String, Bytes) {
        (self.role, self.file_name, self.content_type, self.content)
    }
}

fn resolve_content_type(declared: Option<&str>, file_name: &str) -> String {
    declared
        .map(str::trim)
        .filter(|value| value.parse::<Mime>().is_ok())
        .map(str::to_string)
        .unwrap_or_else(|| mime_guess::from_path(file_name).first_or_octet_stream().essence_str().to_string())
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("Only one XLSX file may be submitted")]
    DuplicateXlsx,
}

/// The files submitted in one processing request: any number of PDF and EML files plus at
/// most one XLSX file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBatch {
    pdf: Vec<FileBuffer>,
    eml: Vec<FileBuffer>,
    xlsx: Option<FileBuffer>,
}

impl FileBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file under its own role, preserving submission order within the role.
    pub fn push(&mut self, file: FileBuffer) -> Result<(), BatchError> {
        match file.role {
            FileRole::Pdf => self.pdf.push(file),
            FileRole::Eml => self.eml.push(file),
            FileRole::Xlsx => {
                if self.xlsx.is_some() {
                    return Err(BatchError::DuplicateXlsx);
                }
                self.xlsx = Some(file);
            }
        }
        Ok(())
    }

    pub fn with_file(mut self, file: FileBuffer) -> Result<Self, BatchError> {
        self.push(file)?;
        Ok(self)
    }

    pub fn pdf_files(&self) -> &[FileBuffer] {
        &self.pdf
    }

    pub fn eml_files(&self) -> &[FileBuffer] {
        &self.eml
    }

    pub fn xlsx_file(&self) -> Option<&FileBuffer> {
        self.xlsx.as_ref()
    }

    pub fn count(&self, role: FileRole) -> usize {
        match role {
            FileRole::Pdf => self.pdf.len(),
            FileRole::Eml => self.eml.len(),
            FileRole::Xlsx => usize::from(self.xlsx.is_some()),
        }
    }

    pub fn len(&self) -> usize {
        FileRole::ALL.iter().map(|role| self.count(*role)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.iter().map(FileBuffer::len).sum()
    }

    /// Files in upstream order: PDFs, then EMLs, then the XLSX file.
    pub fn iter(&self) -> impl Iterator<Item = &FileBuffer> {
        self.pdf.iter().chain(self.eml.iter()).chain(self.xlsx.iter())
    }

    pub fn into_files(self) -> impl Iterator<Item = FileBuffer> {
        self.pdf.into_iter().chain(self.eml).chain(self.xlsx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_form_field() {
        assert_eq!(FileRole::from_form_field("pdfFiles"), Some(FileRole::Pdf));
        assert_eq!(FileRole::from_form_field("pdf"), Some(FileRole::Pdf));
        assert_eq!(FileRole::from_form_field("emlFiles"), Some(FileRole::Eml));
        assert_eq!(FileRole::from_form_field("xlsxFile"), Some(FileRole::Xlsx));
        assert_eq!(FileRole::from_form_field("xlsx"), Some(FileRole::Xlsx));
        assert_eq!(FileRole::from_form_field("file"), None);
        assert_eq!(FileRole::from_form_field("PDF"), None);
    }

    #[test]
    fn test_matches_extension() {
        assert!(FileRole::Pdf.matches_extension("invoice.pdf"));
        assert!(FileRole::Pdf.matches_extension("INVOICE.PDF"));
        assert!(FileRole::Eml.matches_extension("mail.from.bank.eml"));
        assert!(!FileRole::Xlsx.matches_extension("ledger.xls"));
        assert!(!FileRole::Pdf.matches_extension("pdf"));
        assert!(!FileRole::Eml.matches_extension(""));
    }

    #[test]
    fn test_default_file_name() {
        assert_eq!(FileRole::Eml.default_file_name(3), "eml_3.eml");
    }

    #[test]
    fn test_declared_content_type_is_preserved() {
        let file = FileBuffer::new(FileRole::Eml, "a.eml", Some("application/octet-stream"), b"x".to_vec());
        assert_eq!(file.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_invalid_content_type_falls_back_to_extension() {
        let file = FileBuffer::new(FileRole::Pdf, "a.pdf", Some("not a mime"), b"%PDF".to_vec());
        assert_eq!(file.content_type(), "application/pdf");

        let file = FileBuffer::new(FileRole::Pdf, "a.pdf", None, b"%PDF".to_vec());
        assert_eq!(file.content_type(), "application/pdf");

        let file = FileBuffer::new(FileRole::Pdf, "noext", Some("  "), b"%PDF".to_vec());
        assert_eq!(file.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_batch_counts_and_order() {
        let batch = FileBatch::new()
            .with_file(FileBuffer::new(FileRole::Xlsx, "ledger.xlsx", None, b"xlsx".to_vec()))
            .unwrap()
            .with_file(FileBuffer::new(FileRole::Eml, "1.eml", None, b"eml".to_vec()))
            .unwrap()
            .with_file(FileBuffer::new(FileRole::Pdf, "1.pdf", None, b"pdf-1".to_vec()))
            .unwrap()
            .with_file(FileBuffer::new(FileRole::Pdf, "2.pdf", None, b"pdf-2".to_vec()))
            .unwrap();

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.count(FileRole::Pdf), 2);
        assert_eq!(batch.count(FileRole::Eml), 1);
        assert_eq!(batch.count(FileRole::Xlsx), 1);
        assert_eq!(batch.total_bytes(), 4 + 3 + 5 + 5);

        let names: Vec<&str> = batch.iter().map(FileBuffer::file_name).collect();
        assert_eq!(names, vec!["1.pdf", "2.pdf", "1.eml", "ledger.xlsx"]);
    }

    #[test]
    fn test_second_xlsx_is_rejected() {
        let mut batch = FileBatch::new();
        batch.push(FileBuffer::new(FileRole::Xlsx, "a.xlsx", None, b"a".to_vec())).unwrap();

        let err = batch.push(FileBuffer::new(FileRole::Xlsx, "b.xlsx", None, b"b".to_vec())).unwrap_err();
        assert_eq!(err, BatchError::DuplicateXlsx);
        assert_eq!(batch.xlsx_file().unwrap().file_name(), "a.xlsx");
    }

    #[test]
    fn test_empty_batch() {
        let batch = FileBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.total_bytes(), 0);
    }
}
