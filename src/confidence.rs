//! Confidence scoring from the answer's source.

use crate::config::ConfidenceConfig;
use crate::models::Mode;

/// Confidence for an answer produced in `mode`.
pub fn score(mode: Mode, bands: &ConfidenceConfig) -> u8 {
    match mode {
        Mode::Uploaded => bands.uploaded,
        Mode::Base => bands.base,
        Mode::Static => bands.glossary,
        Mode::None => bands.none,
        Mode::Greeting | Mode::Thanks | Mode::Clarify => bands.guardrail,
    }
}

/// Confidence and disclaimer for a finished answer. Generation fallbacks
/// drop to the fallback band; guardrail replies carry no disclaimer.
pub fn assess(mode: Mode, used_fallback: bool, bands: &ConfidenceConfig) -> (u8, Option<String>) {
    let confidence = if used_fallback && !mode.is_guardrail() {
        bands.fallback
    } else {
        score(mode, bands)
    };
    let disclaimer = (!mode.is_guardrail()).then(|| bands.disclaimer.clone());
    (confidence, disclaimer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands() {
        let bands = ConfidenceConfig::default();
        assert_eq!(score(Mode::Uploaded, &bands), 95);
        assert_eq!(score(Mode::Base, &bands), 85);
        assert_eq!(score(Mode::Static, &bands), 70);
        assert_eq!(score(Mode::None, &bands), 50);
        assert_eq!(score(Mode::Greeting, &bands), 100);
    }

    #[test]
    fn test_ordering_follows_source_strength() {
        let bands = ConfidenceConfig::default();
        let ordered = [Mode::Uploaded, Mode::Base, Mode::Static, Mode::None];
        for pair in ordered.windows(2) {
            assert!(score(pair[0], &bands) >= score(pair[1], &bands));
        }
    }

    #[test]
    fn test_fallback_and_disclaimer() {
        let bands = ConfidenceConfig::default();
        let (c, d) = assess(Mode::Base, true, &bands);
        assert_eq!(c, 30);
        assert_eq!(
            d.as_deref(),
            Some("AI-generated informational response. Not legal advice.")
        );

        let (c, d) = assess(Mode::Thanks, false, &bands);
        assert_eq!(c, 100);
        assert!(d.is_none());
    }
}
