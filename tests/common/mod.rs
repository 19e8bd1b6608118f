#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nyaysetu::config::Config;
use nyaysetu::embedding::EmbeddingProvider;
use nyaysetu::generate::{GenerationParams, GenerativeModel};
use nyaysetu::index::{IndexKind, IndexProvider, VectorIndex};
use nyaysetu::pipeline::AppServices;

pub const MOCK_ANSWER: &str = "Mock legal answer grounded in the supplied context.";

const VOCABULARY: &[&str] = &[
    "tenant", "rent", "landlord", "eviction", "fir", "police", "bail", "arrest", "court",
];

/// Bag-of-keywords embedder: one axis per vocabulary word plus a catch-all
/// axis, normalized to unit length. Texts sharing no keyword are at squared
/// distance 2.0.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    /// Any batch containing this marker fails like an unavailable service.
    fail_marker: Mutex<Option<String>>,
}

impl KeywordEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_on(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut v: Vec<f32> = VOCABULARY
            .iter()
            .map(|term| words.iter().filter(|w| w.starts_with(term)).count() as f32)
            .collect();
        let other = if v.iter().all(|x| *x == 0.0) { 1.0 } else { 0.0 };
        v.push(other);

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-mock"
    }
    fn dims(&self) -> usize {
        VOCABULARY.len() + 1
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref() {
            if texts.iter().any(|t| t.contains(marker)) {
                anyhow::bail!("embedding service error 503: unavailable");
            }
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Generative model mock that records every prompt.
pub struct RecordingModel {
    reply: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
    pub params: Mutex<Vec<GenerationParams>>,
}

impl RecordingModel {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerativeModel for RecordingModel {
    fn name(&self) -> &str {
        "recording-mock"
    }
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.params.lock().unwrap().push(params.clone());
        self.reply.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

/// Services with mock providers. `base_docs` (if any) become the base index;
/// uploads are persisted under `uploads_dir`.
pub struct Harness {
    pub services: Arc<AppServices>,
    pub embedder: Arc<KeywordEmbedder>,
    pub model: Arc<RecordingModel>,
    pub _uploads: tempfile::TempDir,
}

pub async fn harness(base_docs: &[(&str, &str)], model: RecordingModel) -> Harness {
    harness_with(Config::default(), base_docs, model).await
}

pub async fn harness_with(
    mut config: Config,
    base_docs: &[(&str, &str)],
    model: RecordingModel,
) -> Harness {
    let uploads = tempfile::tempdir().unwrap();
    config.index.uploads_dir = uploads.path().to_path_buf();
    config.index.base_path = uploads.path().join("no-base.sqlite");

    let embedder = Arc::new(KeywordEmbedder::default());
    let base = if base_docs.is_empty() {
        None
    } else {
        let docs: Vec<(String, String)> = base_docs
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        let index = VectorIndex::build(IndexKind::Base, embedder.as_ref(), &docs, 800, 100, 64)
            .await
            .unwrap();
        Some(Arc::new(index))
    };
    // Building the base index is setup, not part of any request.
    embedder.calls.store(0, Ordering::SeqCst);

    let indexes = Arc::new(IndexProvider::new(&config, embedder.clone()).with_base(base));
    let model = Arc::new(model);
    let services = AppServices::with_indexes(config, indexes, model.clone());

    Harness {
        services: Arc::new(services),
        embedder,
        model,
        _uploads: uploads,
    }
}

pub fn legal_corpus() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "crpc/fir.txt",
            "An FIR is lodged at the police station. The police must register an FIR for a cognizable offence.",
        ),
        (
            "crpc/bail.txt",
            "Bail may be sought from the court after arrest. Courts weigh bail conditions carefully.",
        ),
    ]
}
