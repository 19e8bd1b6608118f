//! The question-answering pipeline.
//!
//! ```text
//! query ──▶ guardrail ──(greeting/thanks/too short)──▶ canned reply
//!              │
//!              ▼
//!   extract upload ─▶ rebuild session index ─▶ assemble context
//!              │
//!              ▼
//!         generate answer ─▶ confidence ─▶ AnswerResult
//! ```
//!
//! [`Pipeline::ask_question_with_doc`] never fails: collaborator problems
//! degrade to less context or to the fallback answer.

use anyhow::Result;
use std::sync::Arc;

use crate::confidence;
use crate::config::{Config, ConfidenceConfig, GuardrailConfig};
use crate::context::ContextAssembler;
use crate::embedding::{self, EmbeddingProvider};
use crate::extract::{self, UploadedInput};
use crate::generate::{self, AnswerGenerator, GenerativeModel};
use crate::glossary::LegalGlossary;
use crate::guardrail::{self, Guard};
use crate::index::IndexProvider;
use crate::models::AnswerResult;
use crate::session::{RequestScope, SessionRegistry};

pub struct Pipeline {
    guardrail: GuardrailConfig,
    bands: ConfidenceConfig,
    indexes: Arc<IndexProvider>,
    assembler: ContextAssembler,
    generator: AnswerGenerator,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        indexes: Arc<IndexProvider>,
        glossary: Arc<LegalGlossary>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        Self {
            guardrail: config.guardrail.clone(),
            bands: config.confidence.clone(),
            assembler: ContextAssembler::new(
                indexes.clone(),
                glossary,
                config.context.clone(),
                config.retrieval.clone(),
            ),
            generator: AnswerGenerator::new(model, config.generation.clone()),
            indexes,
        }
    }

    pub fn indexes(&self) -> &Arc<IndexProvider> {
        &self.indexes
    }

    /// Answer `query`, optionally grounded in an uploaded document.
    ///
    /// The upload (if any) replaces the session's uploaded index before
    /// retrieval. `scope` must stay held for the whole call.
    pub async fn ask_question_with_doc(
        &self,
        query: &str,
        upload: Option<&UploadedInput>,
        scope: &mut RequestScope,
    ) -> AnswerResult {
        let guard = guardrail::classify(query, &self.guardrail);
        if let Some((reply, mode)) = guard.canned_reply() {
            tracing::info!(%mode, "guardrail reply");
            let (confidence, disclaimer) = confidence::assess(mode, false, &self.bands);
            return AnswerResult {
                answer: reply.to_string(),
                mode,
                sources: Vec::new(),
                confidence,
                disclaimer,
                context: Vec::new(),
                error: None,
            };
        }

        let query = match &guard {
            Guard::VagueArrest(rewritten) => {
                tracing::debug!(original = query, rewritten = %rewritten, "vague arrest question rewritten");
                rewritten.as_str()
            }
            _ => query.trim(),
        };

        let document_text = extract::extract_text(upload).await;
        if !document_text.trim().is_empty() {
            if let Err(e) = self.indexes.rebuild_uploaded(scope, &document_text).await {
                tracing::warn!(
                    session = scope.session_id().unwrap_or("-"),
                    error = %e,
                    "failed to index uploaded document; using its text only"
                );
            }
        } else if upload.is_some() {
            tracing::warn!("uploaded file produced no text");
        }

        let uploaded = self.indexes.uploaded(scope).await;
        let context = self.assembler.assemble(query, &document_text, uploaded).await;
        let generated = self.generator.answer(query, &context).await;
        let (confidence, disclaimer) =
            confidence::assess(context.mode, generated.fallback, &self.bands);

        tracing::info!(
            mode = %context.mode,
            confidence,
            sources = context.sources.len(),
            fallback = generated.fallback,
            "question answered"
        );

        AnswerResult {
            answer: generated.text,
            mode: context.mode,
            sources: context.sources,
            confidence,
            disclaimer,
            context: context.blocks,
            error: generated.error,
        }
    }
}

/// Everything a front end needs, built once at startup.
pub struct AppServices {
    pub config: Config,
    pub pipeline: Arc<Pipeline>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppServices {
    /// Build the providers named in `config`.
    ///
    /// Fails when the generation API key is missing or a provider cannot be
    /// constructed.
    pub fn from_config(config: Config) -> Result<Self> {
        let model = generate::create_model(&config.generation)?;
        let embedder = embedding::create_provider(&config.embedding)?;
        Ok(Self::with_providers(config, embedder, model))
    }

    /// Assemble services around already-built providers.
    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let indexes = Arc::new(IndexProvider::new(&config, embedder));
        Self::with_indexes(config, indexes, model)
    }

    pub fn with_indexes(
        config: Config,
        indexes: Arc<IndexProvider>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let glossary = Arc::new(LegalGlossary::builtin());
        let pipeline = Arc::new(Pipeline::new(&config, indexes, glossary, model));
        let sessions = Arc::new(SessionRegistry::with_expiry(
            config.server.session_idle(),
            config.index.uploads_dir.clone(),
        ));
        Self {
            config,
            pipeline,
            sessions,
        }
    }
}
