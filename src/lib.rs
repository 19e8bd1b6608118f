//! # NyaySetu
//!
//! Retrieval-augmented question answering for Indian legal queries.
//!
//! A question (optionally with an uploaded `.txt`/`.pdf` document) passes
//! through guardrails, is grounded in context from the uploaded document, a
//! prebuilt legal index or a small glossary, and is answered by a generative
//! model with a confidence score that reflects where the context came from.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌─────────────────────┐
//! │ HTTP/CLI  │──▶│ Guardrail  │──▶│ Extract + Retrieve  │
//! │ (server)  │   └────────────┘   │ upload / base / glos│
//! └───────────┘                    └─────────┬───────────┘
//!                                            ▼
//!               ┌────────────┐   ┌─────────────────────┐
//!               │ Confidence │◀──│ Context ▶ Generate  │
//!               └────────────┘   └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and policy table |
//! | [`models`] | Shared data types |
//! | [`error`] | Input and generation error types |
//! | [`guardrail`] | Greeting/thanks/too-short/vague-arrest classification |
//! | [`glossary`] | Static legal term definitions |
//! | [`extract`] | Text extraction from uploads |
//! | [`chunk`] | Recursive character chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index build, persistence and search |
//! | [`session`] | Per-session uploaded index ownership |
//! | [`context`] | Context assembly and mode selection |
//! | [`generate`] | Prompting and generative model providers |
//! | [`confidence`] | Confidence bands and disclaimer |
//! | [`pipeline`] | End-to-end question answering |
//! | [`server`] | HTTP API |
//! | [`index_cmd`] | Offline base index builder |
//! | [`ask_cmd`] | One-shot CLI question |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Index file schema |

pub mod ask_cmd;
pub mod chunk;
pub mod confidence;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod glossary;
pub mod guardrail;
pub mod index;
pub mod index_cmd;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod session;
