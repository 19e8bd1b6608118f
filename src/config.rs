//! TOML configuration.
//!
//! One file holds the whole policy table: index locations, chunking sizes,
//! retrieval depth and distance cutoff, context budgets, guardrail thresholds,
//! the embedding and generation providers, and the confidence bands. Every
//! section has defaults, so a partial file (or none at all, via
//! [`load_or_default`]) yields the canonical policy.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub guardrail: GuardrailConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Sessions unused for this long are forgotten and their uploaded
    /// index files deleted.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

impl ServerConfig {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_session_idle_secs() -> u64 {
    3600
}

/// Where the persisted indexes live.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Prebuilt, read-only knowledge index.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// Directory holding one index file per upload session.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    /// Corpus directory consumed by `nyay index build`.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            uploads_dir: default_uploads_dir(),
            source_dir: default_source_dir(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./data/base_index.sqlite")
}
fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_source_dir() -> PathBuf {
    PathBuf::from("./data/legal_docs")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

/// Character-based chunk sizes for the two index kinds.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_base_chunk_chars")]
    pub base_chunk_chars: usize,
    #[serde(default = "default_base_overlap_chars")]
    pub base_overlap_chars: usize,
    #[serde(default = "default_upload_chunk_chars")]
    pub upload_chunk_chars: usize,
    #[serde(default = "default_upload_overlap_chars")]
    pub upload_overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            base_chunk_chars: default_base_chunk_chars(),
            base_overlap_chars: default_base_overlap_chars(),
            upload_chunk_chars: default_upload_chunk_chars(),
            upload_overlap_chars: default_upload_overlap_chars(),
        }
    }
}

fn default_base_chunk_chars() -> usize {
    800
}
fn default_base_overlap_chars() -> usize {
    100
}
fn default_upload_chunk_chars() -> usize {
    1000
}
fn default_upload_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest chunks requested per search.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Squared-L2 cutoff; results at or above it are dropped.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
    #[serde(default = "default_true")]
    pub filter_by_distance: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            distance_threshold: default_distance_threshold(),
            filter_by_distance: true,
        }
    }
}

impl RetrievalConfig {
    /// The active distance cutoff, or `None` when filtering is switched off.
    pub fn threshold(&self) -> Option<f32> {
        self.filter_by_distance.then_some(self.distance_threshold)
    }
}

fn default_k() -> usize {
    3
}
fn default_distance_threshold() -> f32 {
    1.2
}
fn default_true() -> bool {
    true
}

/// Per-block character budgets.
#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_document_chars")]
    pub document_chars: usize,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            document_chars: default_document_chars(),
            chunk_chars: default_chunk_chars(),
        }
    }
}

fn default_document_chars() -> usize {
    1500
}
fn default_chunk_chars() -> usize {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardrailConfig {
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_vague_arrest_max_words")]
    pub vague_arrest_max_words: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            min_query_chars: default_min_query_chars(),
            vague_arrest_max_words: default_vague_arrest_max_words(),
        }
    }
}

fn default_min_query_chars() -> usize {
    3
}
fn default_vague_arrest_max_words() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `gemini` or `huggingface`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Endpoint override (required shape differs per provider).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    /// Gemini thinking budget; `0` disables thinking so short budgets still
    /// produce visible text. A negative value leaves `thinkingConfig` out of
    /// the request, for models that must think.
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: Option<i64>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,
    #[serde(default)]
    pub tiers: TokenTiers,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            url: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
            thinking_budget: default_thinking_budget(),
            timeout_secs: default_generation_timeout_secs(),
            max_retries: default_generation_retries(),
            min_answer_chars: default_min_answer_chars(),
            tiers: TokenTiers::default(),
        }
    }
}

impl GenerationConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => bail!("{} environment variable not set", self.api_key_env),
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_top_p() -> f32 {
    0.85
}
fn default_repetition_penalty() -> f32 {
    1.15
}
fn default_thinking_budget() -> Option<i64> {
    Some(0)
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_generation_retries() -> u32 {
    2
}
fn default_min_answer_chars() -> usize {
    15
}

/// Three-step output budget keyed on the query's word count.
#[derive(Debug, Deserialize, Clone)]
pub struct TokenTiers {
    #[serde(default = "default_short_max_words")]
    pub short_max_words: usize,
    #[serde(default = "default_short_tokens")]
    pub short_tokens: u32,
    #[serde(default = "default_medium_max_words")]
    pub medium_max_words: usize,
    #[serde(default = "default_medium_tokens")]
    pub medium_tokens: u32,
    #[serde(default = "default_long_tokens")]
    pub long_tokens: u32,
}

impl Default for TokenTiers {
    fn default() -> Self {
        Self {
            short_max_words: default_short_max_words(),
            short_tokens: default_short_tokens(),
            medium_max_words: default_medium_max_words(),
            medium_tokens: default_medium_tokens(),
            long_tokens: default_long_tokens(),
        }
    }
}

fn default_short_max_words() -> usize {
    8
}
fn default_short_tokens() -> u32 {
    150
}
fn default_medium_max_words() -> usize {
    20
}
fn default_medium_tokens() -> u32 {
    250
}
fn default_long_tokens() -> u32 {
    450
}

/// Confidence bands per answer source.
#[derive(Debug, Deserialize, Clone)]
pub struct ConfidenceConfig {
    #[serde(default = "default_uploaded_band")]
    pub uploaded: u8,
    #[serde(default = "default_base_band")]
    pub base: u8,
    #[serde(rename = "static", default = "default_static_band")]
    pub glossary: u8,
    #[serde(default = "default_none_band")]
    pub none: u8,
    #[serde(default = "default_guardrail_band")]
    pub guardrail: u8,
    /// Reported when generation failed and the fallback answer was used.
    #[serde(default = "default_fallback_band")]
    pub fallback: u8,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            uploaded: default_uploaded_band(),
            base: default_base_band(),
            glossary: default_static_band(),
            none: default_none_band(),
            guardrail: default_guardrail_band(),
            fallback: default_fallback_band(),
            disclaimer: default_disclaimer(),
        }
    }
}

fn default_uploaded_band() -> u8 {
    95
}
fn default_base_band() -> u8 {
    85
}
fn default_static_band() -> u8 {
    70
}
fn default_none_band() -> u8 {
    50
}
fn default_guardrail_band() -> u8 {
    100
}
fn default_fallback_band() -> u8 {
    30
}
fn default_disclaimer() -> String {
    "AI-generated informational response. Not legal advice.".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise falls back to the built-in policy.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    tracing::warn!(
        path = %path.display(),
        "config file not found, using built-in defaults"
    );
    let config = Config::default();
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.server.session_idle_secs == 0 {
        bail!("server.session_idle_secs must be > 0");
    }

    // Chunking
    let c = &config.chunking;
    if c.base_chunk_chars == 0 || c.upload_chunk_chars == 0 {
        bail!("chunking sizes must be > 0");
    }
    if c.base_overlap_chars >= c.base_chunk_chars {
        bail!("chunking.base_overlap_chars must be smaller than base_chunk_chars");
    }
    if c.upload_overlap_chars >= c.upload_chunk_chars {
        bail!("chunking.upload_overlap_chars must be smaller than upload_chunk_chars");
    }

    // Retrieval and context
    if config.retrieval.k == 0 {
        bail!("retrieval.k must be >= 1");
    }
    if config.context.document_chars == 0 || config.context.chunk_chars == 0 {
        bail!("context budgets must be > 0");
    }

    // Generation
    let g = &config.generation;
    match g.provider.as_str() {
        "gemini" | "huggingface" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be gemini or huggingface.",
            other
        ),
    }
    if g.provider == "huggingface" && g.url.is_none() {
        bail!("generation.url must be specified when provider is 'huggingface'");
    }
    let t = &g.tiers;
    if t.short_max_words >= t.medium_max_words {
        bail!("generation.tiers.short_max_words must be below medium_max_words");
    }
    if !(t.short_tokens <= t.medium_tokens && t.medium_tokens <= t.long_tokens) {
        bail!("generation.tiers token budgets must not decrease with query length");
    }

    // Confidence bands
    let b = &config.confidence;
    if !(b.uploaded >= b.base && b.base >= b.glossary && b.glossary >= b.none) {
        bail!("confidence bands must satisfy uploaded >= base >= static >= none");
    }
    if [b.uploaded, b.guardrail, b.fallback].iter().any(|v| *v > 100) {
        bail!("confidence bands must be within 0..=100");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.retrieval.threshold(), Some(1.2));
        assert_eq!(config.context.document_chars, 1500);
        assert_eq!(config.confidence.uploaded, 95);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [retrieval]
            k = 5
            filter_by_distance = false

            [confidence]
            static = 65
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.retrieval.threshold(), None);
        assert_eq!(config.confidence.glossary, 65);
        assert_eq!(config.chunking.base_chunk_chars, 800);
        assert_eq!(config.generation.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_rejects_non_monotonic_bands() {
        let mut config = Config::default();
        config.confidence.glossary = 90;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("uploaded >= base"));
    }

    #[test]
    fn test_rejects_decreasing_token_tiers() {
        let mut config = Config::default();
        config.generation.tiers.long_tokens = 100;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_overlap_not_below_chunk_size() {
        let mut config = Config::default();
        config.chunking.upload_overlap_chars = 1000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_huggingface_requires_url() {
        let mut config = Config::default();
        config.generation.provider = "huggingface".to_string();
        assert!(validate(&config).is_err());
        config.generation.url = Some("http://localhost:8080".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nyay.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0:9000\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/nyay.example.toml");
        let config = load_config(&path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.server.bind, defaults.server.bind);
        assert_eq!(config.server.session_idle(), defaults.server.session_idle());
        assert_eq!(config.retrieval.threshold(), defaults.retrieval.threshold());
        assert_eq!(config.generation.thinking_budget, Some(0));
        assert_eq!(config.confidence.glossary, defaults.confidence.glossary);
        assert_eq!(config.confidence.disclaimer, defaults.confidence.disclaimer);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }
}
