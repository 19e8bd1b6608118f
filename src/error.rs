//! Errors the caller must be able to tell apart.
//!
//! Plumbing uses `anyhow`; these enums mark the boundary where a failure
//! becomes a response the client sees.

use thiserror::Error;

/// Problems with what the client sent. Reported synchronously and never
/// reach the generation stage.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("uploaded file is empty")]
    EmptyFile,

    #[error("unsupported file type '{0}': only .txt and .pdf are accepted")]
    UnsupportedFileType(String),

    #[error("could not extract text from '{file}': {reason}")]
    ExtractionFailed { file: String, reason: String },

    #[error("invalid session id '{0}': use 1-64 letters, digits, '-' or '_'")]
    InvalidSessionId(String),

    #[error("malformed request: {0}")]
    Malformed(String),
}

impl InputError {
    /// Machine-readable code for the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            InputError::EmptyQuestion | InputError::Malformed(_) => "bad_request",
            InputError::EmptyFile => "empty_file",
            InputError::UnsupportedFileType(_) => "unsupported_file_type",
            InputError::ExtractionFailed { .. } => "extraction_failed",
            InputError::InvalidSessionId(_) => "invalid_session",
        }
    }
}

/// Failure of the generative-model collaborator. Never surfaces as an HTTP
/// error: the pipeline turns it into the fallback answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Upstream(#[from] anyhow::Error),

    #[error("generation timed out after {0}s")]
    Timeout(u64),

    #[error("model returned no usable text")]
    Empty,
}
