//! Context assembly.
//!
//! Gathers the uploaded document, glossary definitions and retrieved chunks
//! into ordered, labeled, truncated [`ContextBlock`]s and decides which
//! source backed the answer.
//!
//! Retrieval reads from the session's uploaded index when one exists and
//! from the base index otherwise, never both. Mode tie-break:
//!
//! | condition | mode |
//! |-----------|------|
//! | document text or uploaded hits | `uploaded` |
//! | base hits | `base` |
//! | glossary match | `static` |
//! | nothing | `none` (sentinel block) |

use std::sync::Arc;

use crate::config::{ContextConfig, RetrievalConfig};
use crate::glossary::{LegalGlossary, GLOSSARY_SOURCE};
use crate::index::{IndexProvider, VectorIndex, UPLOADED_SOURCE};
use crate::models::{ContextBlock, ContextLabel, Mode, RetrievedChunk};

pub const NO_CONTEXT_SENTINEL: &str = "No relevant legal context found";

/// The merged context for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub blocks: Vec<ContextBlock>,
    pub mode: Mode,
    pub sources: Vec<String>,
}

impl AssembledContext {
    /// Prompt rendering: `[Heading]\ntext` per block, blank line between.
    pub fn render(&self) -> String {
        render_blocks(&self.blocks)
    }
}

/// Everything one request retrieved, before merging.
#[derive(Debug, Default, Clone)]
pub struct Gathered {
    pub document_text: String,
    pub definitions: Option<String>,
    pub uploaded_hits: Vec<RetrievedChunk>,
    pub base_hits: Vec<RetrievedChunk>,
}

pub struct ContextAssembler {
    indexes: Arc<IndexProvider>,
    glossary: Arc<LegalGlossary>,
    budgets: ContextConfig,
    retrieval: RetrievalConfig,
}

impl ContextAssembler {
    pub fn new(
        indexes: Arc<IndexProvider>,
        glossary: Arc<LegalGlossary>,
        budgets: ContextConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            indexes,
            glossary,
            budgets,
            retrieval,
        }
    }

    /// Search the right index for `query` and merge with the document text
    /// and glossary.
    pub async fn assemble(
        &self,
        query: &str,
        document_text: &str,
        uploaded: Option<Arc<VectorIndex>>,
    ) -> AssembledContext {
        let k = self.retrieval.k;
        let threshold = self.retrieval.threshold();

        let mut gathered = Gathered {
            document_text: document_text.to_string(),
            definitions: self.glossary.definitions(query),
            ..Default::default()
        };

        match uploaded {
            Some(index) => {
                gathered.uploaded_hits = self.indexes.search(&index, query, k, threshold).await;
            }
            None => {
                if let Some(base) = self.indexes.base().await {
                    gathered.base_hits = self.indexes.search(&base, query, k, threshold).await;
                }
            }
        }

        tracing::debug!(
            document_chars = gathered.document_text.chars().count(),
            uploaded_hits = gathered.uploaded_hits.len(),
            base_hits = gathered.base_hits.len(),
            glossary = gathered.definitions.is_some(),
            "context gathered"
        );

        merge(gathered, &self.budgets)
    }
}

/// Order, truncate and label what was gathered.
pub fn merge(gathered: Gathered, budgets: &ContextConfig) -> AssembledContext {
    let Gathered {
        document_text,
        definitions,
        uploaded_hits,
        base_hits,
    } = gathered;

    let has_document = !document_text.trim().is_empty();
    let mode = if has_document || !uploaded_hits.is_empty() {
        Mode::Uploaded
    } else if !base_hits.is_empty() {
        Mode::Base
    } else if definitions.is_some() {
        Mode::Static
    } else {
        Mode::None
    };

    let mut blocks = Vec::new();
    let mut sources: Vec<String> = Vec::new();
    let mut add_source = |s: &str| {
        if !sources.iter().any(|existing| existing == s) {
            sources.push(s.to_string());
        }
    };

    if has_document {
        blocks.push(ContextBlock {
            label: ContextLabel::UploadedDocument,
            text: truncate_chars(&document_text, budgets.document_chars).to_string(),
        });
        add_source(UPLOADED_SOURCE);
    }

    if let Some(defs) = definitions {
        blocks.push(ContextBlock {
            label: ContextLabel::LegalDefinitions,
            text: defs,
        });
        add_source(GLOSSARY_SOURCE);
    }

    let hits = if uploaded_hits.is_empty() {
        base_hits
    } else {
        uploaded_hits
    };
    for hit in hits {
        add_source(&hit.source);
        blocks.push(ContextBlock {
            label: ContextLabel::LegalProcedures,
            text: truncate_chars(&hit.text, budgets.chunk_chars).to_string(),
        });
    }

    if blocks.is_empty() {
        blocks.push(ContextBlock {
            label: ContextLabel::LegalProcedures,
            text: NO_CONTEXT_SENTINEL.to_string(),
        });
    }

    AssembledContext {
        blocks,
        mode,
        sources,
    }
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

pub fn render_blocks(blocks: &[ContextBlock]) -> String {
    blocks
        .iter()
        .map(|b| format!("[{}]\n{}", b.label.heading(), b.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            source: source.to_string(),
            distance: 0.1,
        }
    }

    fn budgets() -> ContextConfig {
        ContextConfig {
            document_chars: 10,
            chunk_chars: 4,
        }
    }

    #[test]
    fn test_truncate_at_budget_boundaries() {
        let text = "abcdefghij";
        assert_eq!(truncate_chars(text, 9), "abcdefghi");
        assert_eq!(truncate_chars(text, 10), text);
        assert_eq!(truncate_chars(text, 11), text);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "धारा १५४";
        assert_eq!(truncate_chars(text, 4), "धारा");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_document_outranks_everything() {
        let ctx = merge(
            Gathered {
                document_text: "Lease agreement text that is long".to_string(),
                definitions: Some("Bail def.".to_string()),
                uploaded_hits: vec![hit(UPLOADED_SOURCE, "tenant clause")],
                base_hits: vec![],
            },
            &budgets(),
        );
        assert_eq!(ctx.mode, Mode::Uploaded);
        let labels: Vec<ContextLabel> = ctx.blocks.iter().map(|b| b.label).collect();
        assert_eq!(
            labels,
            vec![
                ContextLabel::UploadedDocument,
                ContextLabel::LegalDefinitions,
                ContextLabel::LegalProcedures
            ]
        );
        assert_eq!(ctx.blocks[0].text, "Lease agre");
        assert_eq!(ctx.blocks[2].text, "tena");
        assert_eq!(ctx.sources, vec!["uploaded", "glossary"]);
    }

    #[test]
    fn test_base_hits_outrank_glossary() {
        let ctx = merge(
            Gathered {
                definitions: Some("FIR def.".to_string()),
                base_hits: vec![hit("crpc.txt", "FIR"), hit("crpc.txt", "bail")],
                ..Default::default()
            },
            &budgets(),
        );
        assert_eq!(ctx.mode, Mode::Base);
        assert_eq!(ctx.sources, vec!["glossary", "crpc.txt"]);
        assert_eq!(ctx.blocks.len(), 3);
    }

    #[test]
    fn test_glossary_only_is_static() {
        let ctx = merge(
            Gathered {
                definitions: Some("FIR is recorded under Section 154 CrPC.".to_string()),
                ..Default::default()
            },
            &budgets(),
        );
        assert_eq!(ctx.mode, Mode::Static);
        assert_eq!(ctx.blocks.len(), 1);
        // Definitions are not clipped to the chunk budget.
        assert_eq!(ctx.blocks[0].text, "FIR is recorded under Section 154 CrPC.");
    }

    #[test]
    fn test_nothing_yields_sentinel() {
        let ctx = merge(Gathered::default(), &budgets());
        assert_eq!(ctx.mode, Mode::None);
        assert!(ctx.sources.is_empty());
        assert_eq!(ctx.blocks.len(), 1);
        assert_eq!(ctx.blocks[0].label, ContextLabel::LegalProcedures);
        assert_eq!(ctx.blocks[0].text, NO_CONTEXT_SENTINEL);
    }

    #[test]
    fn test_whitespace_document_is_ignored() {
        let ctx = merge(
            Gathered {
                document_text: " \n\t".to_string(),
                ..Default::default()
            },
            &budgets(),
        );
        assert_eq!(ctx.mode, Mode::None);
    }

    #[test]
    fn test_render() {
        let blocks = vec![
            ContextBlock {
                label: ContextLabel::LegalDefinitions,
                text: "A".to_string(),
            },
            ContextBlock {
                label: ContextLabel::LegalProcedures,
                text: "B".to_string(),
            },
        ];
        assert_eq!(
            render_blocks(&blocks),
            "[Legal Definitions]\nA\n\n[Legal Procedures]\nB"
        );
    }
}
