//! Keyword-stage scoring (spec §4.4): scores `spec_view_latest` rows
//! against the question's keywords before ever touching the vector
//! store. The exact weights are a heuristic — the spec pins only the
//! threshold behavior and the relative ordering (exact > partial,
//! simple queries rewarded, complex queries penalized, diminishing
//! returns on saturation) — so these constants are a documented design
//! choice, not a guess to hide.

use kb_core::{SpecPayload, SpecViewRow};

/// Below this, a candidate fuzzy match doesn't count at all. Mirrors the
/// alias-matching threshold used for spec item lookups.
const FUZZY_MATCH_THRESHOLD: f64 = 0.85;

const EXACT_MATCH_BONUS: f32 = 0.3;
const PARTIAL_MATCH_BONUS: f32 = 0.1;
const SIMPLE_QUERY_BONUS: f32 = 0.2;
const COMPLEX_QUERY_PENALTY: f32 = 0.1;
const SATURATION_CAP: f32 = 0.3;

/// A `spec_view` row scored against a set of keywords, paired with the
/// keyword hits that produced its score (for ranking/explanation).
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub row: SpecViewRow,
    pub score: f32,
}

/// Outcome of the keyword stage: the rows that matched at all, sorted by
/// descending score, plus an overall confidence in `[0, 1]` used to
/// decide whether the semantic fallback is needed.
#[derive(Debug, Clone)]
pub struct KeywordMatch {
    pub rows: Vec<ScoredRow>,
    pub confidence: f32,
}

fn haystack(row: &SpecViewRow) -> String {
    let value = match &row.value {
        SpecPayload::Numeric(n) => n.to_string(),
        SpecPayload::Text(t) => t.clone(),
    };
    let mut parts = vec![row.category.to_lowercase(), row.specification.to_lowercase(), value.to_lowercase()];
    if let Some(kf) = &row.key_features {
        parts.push(kf.to_lowercase());
    }
    parts.join(" ")
}

/// Per-row, per-keyword match strength: exact substring, fuzzy (jaro-
/// winkler against the row's specification name), or none.
fn keyword_score(keyword: &str, row_text: &str, specification: &str) -> f32 {
    if row_text.contains(keyword) {
        return EXACT_MATCH_BONUS;
    }
    let similarity = strsim::jaro_winkler(keyword, &specification.to_lowercase());
    if similarity >= FUZZY_MATCH_THRESHOLD {
        return PARTIAL_MATCH_BONUS;
    }
    0.0
}

/// Scores every row against `keywords`, applies the query-complexity
/// bonus/penalty and a diminishing-returns saturation bonus for rows
/// matching many keywords, and derives an overall confidence as the
/// normalized best score among matched rows.
pub fn score_rows(rows: Vec<SpecViewRow>, keywords: &[String]) -> KeywordMatch {
    if keywords.is_empty() {
        return KeywordMatch { rows: Vec::new(), confidence: 0.0 };
    }

    let query_bonus = if keywords.len() <= 2 {
        SIMPLE_QUERY_BONUS
    } else if keywords.len() > 4 {
        -COMPLEX_QUERY_PENALTY
    } else {
        0.0
    };

    let mut scored = Vec::new();
    for row in rows {
        let text = haystack(&row);
        let mut hits = 0usize;
        let mut raw_score = 0.0f32;
        for keyword in keywords {
            let s = keyword_score(keyword, &text, &row.specification);
            if s > 0.0 {
                hits += 1;
                raw_score += s;
            }
        }
        if hits == 0 {
            continue;
        }
        // Diminishing returns: each match past the first contributes
        // half as much toward the saturation bonus as the one before it.
        let saturation = SATURATION_CAP * (1.0 - 0.5f32.powi(hits as i32 - 1));
        let score = (raw_score + query_bonus + saturation).clamp(0.0, 1.0);
        scored.push(ScoredRow { row, score });
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let confidence = scored.first().map(|s| s.score).unwrap_or(0.0);
    KeywordMatch { rows: scored, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::{CampaignVariantId, ProductId};

    fn row(specification: &str, value: &str) -> SpecViewRow {
        SpecViewRow {
            product_id: ProductId::new(),
            campaign_variant_id: CampaignVariantId::new(),
            category: "Engine".to_string(),
            specification: specification.to_string(),
            value: SpecPayload::Text(value.to_string()),
            unit: None,
            confidence: 1.0,
            key_features: None,
            variant_availability: None,
            explanation: None,
        }
    }

    #[test]
    fn exact_match_scores_higher_than_no_match() {
        let rows = vec![row("Towing Capacity", "3500 lbs"), row("Paint Color", "Pearl White")];
        let result = score_rows(rows, &["towing".to_string()]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].row.specification, "Towing Capacity");
    }

    #[test]
    fn simple_query_gets_a_bonus_over_complex() {
        let rows = vec![row("Towing Capacity", "3500 lbs")];
        let simple = score_rows(rows.clone(), &["towing".to_string()]);
        let complex = score_rows(
            rows,
            &["towing".to_string(), "a".repeat(3), "b".repeat(3), "c".repeat(3), "d".repeat(3)],
        );
        assert!(simple.confidence > complex.confidence);
    }

    #[test]
    fn no_keyword_hits_yields_zero_confidence() {
        let rows = vec![row("Paint Color", "Pearl White")];
        let result = score_rows(rows, &["towing".to_string()]);
        assert!(result.rows.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn empty_keywords_short_circuits() {
        let result = score_rows(vec![row("Towing Capacity", "3500 lbs")], &[]);
        assert!(result.rows.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn multiple_hits_saturate_with_diminishing_returns() {
        let rows = vec![row("Towing Capacity", "3500 lbs heavy duty")];
        let one_kw = score_rows(rows.clone(), &["towing".to_string()]);
        let two_kw = score_rows(rows, &["towing".to_string(), "duty".to_string()]);
        assert!(two_kw.rows[0].score > one_kw.rows[0].score);
    }
}
