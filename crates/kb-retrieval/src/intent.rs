//! Question intent classification (spec §4.4): a cheap heuristic, not a
//! model call — good enough to pick a ranking bias and a confidence
//! posture, overridable by the caller via `intent_hint`.

use kb_core::ChunkType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SpecLookup,
    UspLookup,
    Comparison,
    Faq,
    General,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::SpecLookup => "spec_lookup",
            Intent::UspLookup => "usp_lookup",
            Intent::Comparison => "comparison",
            Intent::Faq => "faq",
            Intent::General => "general",
        }
    }

    /// Chunk type this intent favors when ranking semantic matches.
    pub fn preferred_chunk_type(self) -> Option<ChunkType> {
        match self {
            Intent::SpecLookup => Some(ChunkType::SpecRow),
            Intent::UspLookup => Some(ChunkType::Usp),
            Intent::Comparison => Some(ChunkType::Comparison),
            Intent::Faq => Some(ChunkType::Faq),
            Intent::General => None,
        }
    }
}

const COMPARISON_MARKERS: &[&str] = &["vs", "versus", "compare", "compared to", "better than", "or the"];
const USP_MARKERS: &[&str] = &["why should", "why buy", "best", "advantage", "stand out", "unique"];
const FAQ_MARKERS: &[&str] = &["warranty", "maintenance", "financing", "how do i", "can i", "what happens if"];
const SPEC_MARKERS: &[&str] =
    &["spec", "specification", "dimension", "capacity", "engine", "horsepower", "torque", "mileage", "how much", "how many", "what is the"];

/// Classifies `question` into an [`Intent`]. `product_count` nudges
/// ambiguous questions toward [`Intent::Comparison`] when more than one
/// product is in scope. `hint`, when present, always wins.
pub fn classify(question: &str, product_count: usize, hint: Option<Intent>) -> Intent {
    if let Some(hint) = hint {
        return hint;
    }
    let lower = question.to_lowercase();

    if product_count > 1 || COMPARISON_MARKERS.iter().any(|m| lower.contains(m)) {
        return Intent::Comparison;
    }
    if USP_MARKERS.iter().any(|m| lower.contains(m)) {
        return Intent::UspLookup;
    }
    if FAQ_MARKERS.iter().any(|m| lower.contains(m)) {
        return Intent::Faq;
    }
    if SPEC_MARKERS.iter().any(|m| lower.contains(m)) {
        return Intent::SpecLookup;
    }
    Intent::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_always_wins() {
        assert_eq!(classify("what's the horsepower?", 1, Some(Intent::Faq)), Intent::Faq);
    }

    #[test]
    fn multiple_products_force_comparison() {
        assert_eq!(classify("tell me about these", 2, None), Intent::Comparison);
    }

    #[test]
    fn comparison_marker_detected() {
        assert_eq!(classify("RAV4 vs CR-V fuel economy", 1, None), Intent::Comparison);
    }

    #[test]
    fn spec_marker_detected() {
        assert_eq!(classify("what is the towing capacity?", 1, None), Intent::SpecLookup);
    }

    #[test]
    fn usp_marker_detected() {
        assert_eq!(classify("why should I buy this over a sedan?", 1, None), Intent::UspLookup);
    }

    #[test]
    fn faq_marker_detected() {
        assert_eq!(classify("what's covered under warranty?", 1, None), Intent::Faq);
    }

    #[test]
    fn unmatched_question_is_general() {
        assert_eq!(classify("tell me something interesting", 1, None), Intent::General);
    }
}
