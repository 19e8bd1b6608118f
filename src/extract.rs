//! Text extraction for uploaded documents (plain text and PDF).
//!
//! The pipeline uses [`extract_text`], which never fails: any problem yields
//! an empty string and the request continues without the document. The HTTP
//! layer validates uploads up front with [`UploadedInput::from_upload`] and
//! [`extract_strict`] so it can tell the client what went wrong.

use std::path::{Path, PathBuf};

use crate::error::InputError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

/// Extraction error (no panic; the caller decides whether to degrade).
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("extraction task failed: {0}")]
    Join(String),
}

/// An uploaded artifact, before extraction.
#[derive(Debug, Clone)]
pub enum UploadedInput {
    Text(String),
    PdfBytes(Vec<u8>),
    PdfPath(PathBuf),
}

impl UploadedInput {
    /// Classify an uploaded file by extension. Only `.txt` and `.pdf` are
    /// accepted; empty files are rejected.
    pub fn from_upload(file_name: &str, bytes: Vec<u8>) -> Result<Self, InputError> {
        let extension = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "txt" | "pdf" => {}
            other => {
                let shown = if other.is_empty() { file_name } else { other };
                return Err(InputError::UnsupportedFileType(shown.to_string()));
            }
        }
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(InputError::EmptyFile);
        }

        if extension == "pdf" {
            Ok(UploadedInput::PdfBytes(bytes))
        } else {
            Ok(UploadedInput::Text(decode_text(bytes)))
        }
    }

    /// Classify a local file for the CLI by its extension.
    pub fn from_path(path: &Path) -> Result<Self, InputError> {
        let name = path.to_string_lossy().to_string();
        match path.extension().map(|e| e.to_string_lossy().to_lowercase()) {
            Some(ext) if ext == "pdf" => Ok(UploadedInput::PdfPath(path.to_path_buf())),
            Some(ext) if ext == "txt" => {
                let bytes = std::fs::read(path).map_err(|e| InputError::ExtractionFailed {
                    file: name.clone(),
                    reason: e.to_string(),
                })?;
                Self::from_upload(&name, bytes)
            }
            _ => Err(InputError::UnsupportedFileType(name)),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            UploadedInput::Text(_) => MIME_TEXT,
            UploadedInput::PdfBytes(_) | UploadedInput::PdfPath(_) => MIME_PDF,
        }
    }
}

/// Decode upload bytes as UTF-8, replacing invalid sequences and dropping a BOM.
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    text.trim_start_matches('\u{feff}').to_string()
}

/// Extract plain text; `""` on any failure or when nothing was uploaded.
pub async fn extract_text(input: Option<&UploadedInput>) -> String {
    let Some(input) = input else {
        return String::new();
    };
    match extract_strict(input).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                content_type = input.content_type(),
                error = %e,
                "text extraction failed; continuing without the document"
            );
            String::new()
        }
    }
}

/// Extract plain text, reporting why extraction failed.
///
/// PDF parsing runs on the blocking pool. Page texts come back in document
/// order.
pub async fn extract_strict(input: &UploadedInput) -> Result<String, ExtractError> {
    match input {
        UploadedInput::Text(text) => Ok(text.clone()),
        UploadedInput::PdfBytes(bytes) => {
            let bytes = bytes.clone();
            tokio::task::spawn_blocking(move || extract_pdf(&bytes))
                .await
                .map_err(|e| ExtractError::Join(e.to_string()))?
        }
        UploadedInput::PdfPath(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| ExtractError::Io {
                path: path.clone(),
                source: e,
            })?;
            tokio::task::spawn_blocking(move || extract_pdf(&bytes))
                .await
                .map_err(|e| ExtractError::Join(e.to_string()))?
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
