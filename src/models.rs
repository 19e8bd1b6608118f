//! Core data models shared across the retrieval and answer pipeline.
//!
//! These types represent the chunks, retrieved passages, context blocks and
//! answers that flow from the index through the assembler to the HTTP layer.

use serde::{Deserialize, Serialize};

/// A chunk of a source text, before or after embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk stored in a [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub id: String,
    pub chunk_index: i64,
    /// Originating file (relative path) or `"uploaded"`.
    pub source: String,
    pub text: String,
    pub hash: String,
    pub embedding: Vec<f32>,
}

/// A similarity-search hit. Lower `distance` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub distance: f32,
}

/// Label of a context block, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextLabel {
    UploadedDocument,
    LegalDefinitions,
    LegalProcedures,
}

impl ContextLabel {
    /// Heading used when the block is rendered into the prompt.
    pub fn heading(&self) -> &'static str {
        match self {
            ContextLabel::UploadedDocument => "Uploaded Document",
            ContextLabel::LegalDefinitions => "Legal Definitions",
            ContextLabel::LegalProcedures => "Legal Procedures",
        }
    }
}

/// A labeled, already-truncated unit of prompt context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub label: ContextLabel,
    pub text: String,
}

/// Which source primarily backed an answer.
///
/// The first four variants come out of context assembly; the rest mark
/// guardrail short-circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Uploaded,
    Base,
    Static,
    None,
    Greeting,
    Thanks,
    Clarify,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Uploaded => "uploaded",
            Mode::Base => "base",
            Mode::Static => "static",
            Mode::None => "none",
            Mode::Greeting => "greeting",
            Mode::Thanks => "thanks",
            Mode::Clarify => "clarify",
        }
    }

    pub fn is_guardrail(&self) -> bool {
        matches!(self, Mode::Greeting | Mode::Thanks | Mode::Clarify)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The response object returned for every question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub mode: Mode,
    pub sources: Vec<String>,
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    #[serde(default)]
    pub context: Vec<ContextBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
