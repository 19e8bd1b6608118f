//! Query guardrails, evaluated before any retrieval or model call.
//!
//! Order: greeting, thanks, too short, vague arrest question, normal. The
//! first three short-circuit the pipeline with a canned reply; the vague
//! arrest case rewrites the query and lets the pipeline continue.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::GuardrailConfig;
use crate::models::Mode;

pub const GREETING_REPLY: &str = "Hello! I am NyaySetu AI. How can I assist you?";
pub const THANKS_REPLY: &str =
    "You're welcome! Feel free to ask if you have any other legal questions.";
pub const CLARIFY_REPLY: &str =
    "Could you please elaborate on your legal question so I can help you better?";

/// Replacement for short arrest questions such as "arrest?" or "arrested what now".
pub const CANONICAL_ARREST_QUERY: &str =
    "What are the legal rights of a person who has been arrested in India?";

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:hi+|hel+o+|hey+|namaste+|namaskar+|good\s+(?:morning|afternoon|evening))(?:\s+there)?[\s!.,?]*$",
    )
    .expect("greeting regex is valid")
});

static THANKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:thanks|thank\s+you|thank\s+u|thx|dhanyavad|shukriya)\b")
        .expect("thanks regex is valid")
});

/// Guardrail verdict for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Greeting,
    Thanks,
    TooShort,
    /// Continue with this query in place of the user's.
    VagueArrest(String),
    Normal,
}

impl Guard {
    /// The canned reply and mode for verdicts that end the request.
    pub fn canned_reply(&self) -> Option<(&'static str, Mode)> {
        match self {
            Guard::Greeting => Some((GREETING_REPLY, Mode::Greeting)),
            Guard::Thanks => Some((THANKS_REPLY, Mode::Thanks)),
            Guard::TooShort => Some((CLARIFY_REPLY, Mode::Clarify)),
            Guard::VagueArrest(_) | Guard::Normal => None,
        }
    }
}

pub fn classify(query: &str, config: &GuardrailConfig) -> Guard {
    let q = query.trim().to_lowercase();

    if GREETING_RE.is_match(&q) {
        return Guard::Greeting;
    }
    if THANKS_RE.is_match(&q) {
        return Guard::Thanks;
    }
    if q.chars().count() < config.min_query_chars {
        return Guard::TooShort;
    }

    let words: Vec<&str> = q
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < config.vague_arrest_max_words && words.iter().any(|w| w.starts_with("arrest"))
    {
        return Guard::VagueArrest(CANONICAL_ARREST_QUERY.to_string());
    }

    Guard::Normal
}
