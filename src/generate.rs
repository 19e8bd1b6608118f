//! Answer generation.
//!
//! [`AnswerGenerator`] turns a question plus assembled context into a short,
//! plain-text answer: it builds the prompt, sizes the output budget from the
//! question length, calls the configured [`GenerativeModel`] under a deadline
//! and cleans the result. Any failure becomes the fixed fallback answer; it is
//! never an error for the caller.
//!
//! Two providers are supported:
//! - **[`GeminiModel`]**: Generative Language REST API (`generateContent`).
//! - **[`HuggingFaceModel`]**: a text-generation-inference endpoint.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{GenerationConfig, TokenTiers};
use crate::context::AssembledContext;
use crate::embedding::send_with_retry;
use crate::error::GenerationError;

pub const SYSTEM_INSTRUCTION: &str = "\
You are a professional Indian legal assistant.

Guidelines:
- Use the provided context as the primary source when it is relevant.
- Never cite a statute, section or case that does not appear in the context.
- When the context is missing or incomplete, rely on your general knowledge of Indian law.
- If you are still unsure, say that you are not certain and recommend consulting a qualified lawyer.
- Be clear, practical and concise.";

pub const FALLBACK_ANSWER: &str = "I am unable to provide a clear legal answer based on the \
available information. Please consult a qualified legal professional.";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Sampling and length settings for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

/// A text-in, text-out model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// What the pipeline receives back from generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    /// `true` when [`FALLBACK_ANSWER`] was substituted.
    pub fallback: bool,
    pub error: Option<String>,
}

pub struct AnswerGenerator {
    model: Arc<dyn GenerativeModel>,
    config: GenerationConfig,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn GenerativeModel>, config: GenerationConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &Arc<dyn GenerativeModel> {
        &self.model
    }

    pub fn params_for(&self, query: &str) -> GenerationParams {
        GenerationParams {
            max_tokens: token_budget(query, &self.config.tiers),
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            repetition_penalty: self.config.repetition_penalty,
        }
    }

    pub async fn answer(&self, query: &str, context: &AssembledContext) -> GeneratedAnswer {
        let prompt = build_prompt(&context.render(), query);
        let params = self.params_for(query);

        match self.call(&prompt, &params).await {
            Ok(text) => GeneratedAnswer {
                text,
                fallback: false,
                error: None,
            },
            Err(e) => {
                tracing::warn!(model = self.model.name(), error = %e, "generation failed; using fallback answer");
                GeneratedAnswer {
                    text: FALLBACK_ANSWER.to_string(),
                    fallback: true,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn call(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError> {
        let deadline = Duration::from_secs(self.config.timeout_secs);
        let raw = tokio::time::timeout(deadline, self.model.generate(prompt, params))
            .await
            .map_err(|_| GenerationError::Timeout(self.config.timeout_secs))??;

        let cleaned = clean_answer(&raw);
        if cleaned.chars().count() < self.config.min_answer_chars {
            return Err(GenerationError::Empty);
        }
        Ok(cleaned)
    }
}

/// Output token budget: a step function of the query's word count.
pub fn token_budget(query: &str, tiers: &TokenTiers) -> u32 {
    let words = query.split_whitespace().count();
    if words <= tiers.short_max_words {
        tiers.short_tokens
    } else if words <= tiers.medium_max_words {
        tiers.medium_tokens
    } else {
        tiers.long_tokens
    }
}

pub fn build_prompt(rendered_context: &str, query: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\n\nQuestion:\n{}\n",
        SYSTEM_INSTRUCTION, rendered_context, query
    )
}

/// Strip Markdown emphasis, headings and code ticks; collapse whitespace.
pub fn clean_answer(raw: &str) -> String {
    let stripped = raw
        .replace("**", "")
        .replace("__", "")
        .replace(['*', '#', '`'], "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============ Gemini ============

pub struct GeminiModel {
    model: String,
    base_url: String,
    api_key: String,
    thinking_budget: Option<i64>,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            thinking_budget: config.thinking_budget,
            max_retries: config.max_retries,
            client,
        })
    }

    fn request_body(&self, prompt: &str, params: &GenerationParams) -> serde_json::Value {
        let mut generation_config = json!({
            "temperature": params.temperature,
            "topP": params.top_p,
            "maxOutputTokens": params.max_tokens,
            "frequencyPenalty": params.repetition_penalty - 1.0,
        });
        if let Some(budget) = self.thinking_budget.filter(|b| *b >= 0) {
            generation_config["thinkingConfig"] = json!({ "thinkingBudget": budget });
        }
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt, params));

        let json = send_with_retry(request, self.max_retries, "Gemini").await?;
        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let Some(parts) = json["candidates"][0]["content"]["parts"].as_array() else {
        let reason = json["candidates"][0]["finishReason"]
            .as_str()
            .or_else(|| json["promptFeedback"]["blockReason"].as_str())
            .unwrap_or("no candidates");
        bail!("Gemini returned no text ({})", reason);
    };
    Ok(parts
        .iter()
        .filter(|p| !p["thought"].as_bool().unwrap_or(false))
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

// ============ Hugging Face ============

pub struct HuggingFaceModel {
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HuggingFaceModel {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.url required for huggingface provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl GenerativeModel for HuggingFaceModel {
    fn name(&self) -> &str {
        &self.url
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "repetition_penalty": params.repetition_penalty,
                "return_full_text": false,
            }
        });
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body);

        let json = send_with_retry(request, self.max_retries, "Hugging Face").await?;
        parse_hf_response(&json)
    }
}

fn parse_hf_response(json: &serde_json::Value) -> Result<String> {
    let text = json[0]["generated_text"]
        .as_str()
        .or_else(|| json["generated_text"].as_str());
    match text {
        Some(t) => Ok(t.to_string()),
        None => bail!("Invalid Hugging Face response: missing generated_text"),
    }
}

// ============ Factory ============

/// Build the configured model. A missing API key is a startup error.
pub fn create_model(config: &GenerationConfig) -> Result<Arc<dyn GenerativeModel>> {
    let api_key = config.api_key()?;
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiModel::new(config, api_key)?)),
        "huggingface" => Ok(Arc::new(HuggingFaceModel::new(config, api_key)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
