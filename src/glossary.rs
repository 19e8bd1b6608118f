//! Static legal term glossary.
//!
//! The last-resort context tier: a handful of terms with one-sentence
//! definitions, matched against the query as whole words or phrases. "FIR"
//! matches "What is an FIR?" but not "firm".

/// Source identifier reported for glossary contributions.
pub const GLOSSARY_SOURCE: &str = "glossary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
}

/// Lower-cased term words kept next to the entry for matching.
#[derive(Debug, Clone)]
struct CompiledEntry {
    entry: GlossaryEntry,
    words: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LegalGlossary {
    entries: Vec<CompiledEntry>,
}

const BUILTIN_TERMS: &[(&str, &str)] = &[
    ("fir", "FIR is recorded under Section 154 CrPC."),
    ("bail", "Bail allows temporary release under CrPC provisions."),
    ("ipc", "IPC 1860 defines criminal offences."),
    (
        "anticipatory bail",
        "Anticipatory bail is granted under Section 438 CrPC in anticipation of arrest.",
    ),
    (
        "crpc",
        "CrPC 1973 lays down the procedure for criminal investigation and trial.",
    ),
    (
        "cognizable",
        "A cognizable offence allows police to arrest without a warrant and register an FIR.",
    ),
    (
        "chargesheet",
        "A chargesheet is the final police report filed under Section 173 CrPC.",
    ),
];

impl Default for LegalGlossary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LegalGlossary {
    /// The fixed term table shipped with the service.
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN_TERMS.iter().map(|(term, definition)| GlossaryEntry {
            term: term.to_string(),
            definition: definition.to_string(),
        }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = GlossaryEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| CompiledEntry {
                words: words(&entry.term),
                entry,
            })
            .filter(|c| !c.words.is_empty())
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose term occurs in `query`, in table order.
    pub fn lookup(&self, query: &str) -> Vec<&GlossaryEntry> {
        let query_words = words(query);
        self.entries
            .iter()
            .filter(|c| {
                query_words
                    .windows(c.words.len())
                    .any(|window| window == c.words.as_slice())
            })
            .map(|c| &c.entry)
            .collect()
    }

    /// All matching definitions joined with a space, or `None`.
    pub fn definitions(&self, query: &str) -> Option<String> {
        let matched = self.lookup(query);
        if matched.is_empty() {
            return None;
        }
        Some(
            matched
                .iter()
                .map(|e| e.definition.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fir_matches_whole_word_only() {
        let g = LegalGlossary::builtin();
        assert_eq!(
            g.definitions("What is an FIR?").as_deref(),
            Some("FIR is recorded under Section 154 CrPC.")
        );
        assert!(g.definitions("How do I register a firm?").is_none());
    }

    #[test]
    fn test_bail_definition_mentions_crpc() {
        let g = LegalGlossary::builtin();
        let defs = g.definitions("What is bail?").unwrap();
        assert!(defs.contains("CrPC"));
    }

    #[test]
    fn test_phrase_and_single_word_both_match() {
        let g = LegalGlossary::builtin();
        let terms: Vec<&str> = g
            .lookup("Can I get anticipatory bail?")
            .iter()
            .map(|e| e.term.as_str())
            .collect();
        assert_eq!(terms, vec!["bail", "anticipatory bail"]);
    }

    #[test]
    fn test_multiple_terms_joined_with_space() {
        let g = LegalGlossary::builtin();
        let defs = g.definitions("fir and ipc").unwrap();
        assert_eq!(
            defs,
            "FIR is recorded under Section 154 CrPC. IPC 1860 defines criminal offences."
        );
    }

    #[test]
    fn test_custom_entries() {
        let g = LegalGlossary::from_entries(vec![GlossaryEntry {
            term: "Lok Adalat".to_string(),
            definition: "A people's court for settlement.".to_string(),
        }]);
        assert_eq!(g.len(), 1);
        assert!(g.definitions("what does a lok adalat do").is_some());
        assert!(g.definitions("lok sabha").is_none());
    }
}
