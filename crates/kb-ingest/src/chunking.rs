//! Row-level chunking (spec §4.2, "the central innovation"): every data
//! row becomes exactly one canonical key-value text block, hashed for
//! dedup.

use crate::markdown::TableRow;
use sha2::{Digest, Sha256};

/// `Category: …` / `Sub-Category: …` / `Specification: …` / `Value: …`
/// plus any present optional fields, one per line, trimmed of trailing
/// punctuation.
pub fn canonical_text(row: &TableRow) -> String {
    let mut lines = Vec::new();
    if let Some(category) = &row.parent_category {
        lines.push(format!("Category: {}", trim_trailing_punctuation(category)));
    }
    if let Some(sub_category) = &row.sub_category {
        lines.push(format!("Sub-Category: {}", trim_trailing_punctuation(sub_category)));
    }
    lines.push(format!("Specification: {}", trim_trailing_punctuation(&row.specification)));
    lines.push(format!("Value: {}", trim_trailing_punctuation(&row.value)));
    if let Some(unit) = &row.unit {
        lines.push(format!("Unit: {}", trim_trailing_punctuation(unit)));
    }
    if let Some(kf) = &row.key_features {
        lines.push(format!("Key Features: {}", trim_trailing_punctuation(kf)));
    }
    if let Some(va) = &row.variant_availability {
        lines.push(format!("Variant Availability: {}", trim_trailing_punctuation(va)));
    }
    lines.join("\n")
}

fn trim_trailing_punctuation(s: &str) -> String {
    collapse_whitespace(s.trim_end_matches(['.', ',', ';', ' ']))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 of the lowercased, whitespace-collapsed canonical text —
/// the dedup key (invariant I2).
pub fn content_hash(canonical: &str) -> String {
    let normalized = collapse_whitespace(canonical).to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_documented_dedup_hash() {
        let row = TableRow {
            parent_category: Some("Exterior".to_string()),
            sub_category: Some("Colors".to_string()),
            specification: "Color".to_string(),
            value: "Pearl Metallic Gallant Red".to_string(),
            variant_availability: Some("Standard".to_string()),
            ..Default::default()
        };
        let text = canonical_text(&row);
        let hash = content_hash(&text);
        let expected_input = "category: exterior\nsub-category: colors\nspecification: color\n\
            value: pearl metallic gallant red\nvariant availability: standard";
        let expected = {
            let digest = Sha256::digest(expected_input.as_bytes());
            hex::encode(digest)
        };
        assert_eq!(hash, expected);
    }

    #[test]
    fn identical_rows_across_documents_hash_identically() {
        let row_a = TableRow {
            parent_category: Some("Exterior".to_string()),
            specification: "Color".to_string(),
            value: "Red".to_string(),
            ..Default::default()
        };
        let row_b = TableRow {
            parent_category: Some("exterior".to_string()),
            specification: "color".to_string(),
            value: "red".to_string(),
            ..Default::default()
        };
        assert_eq!(content_hash(&canonical_text(&row_a)), content_hash(&canonical_text(&row_b)));
    }
}
