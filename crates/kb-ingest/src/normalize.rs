//! Specification normalization (spec §4.2): classifies a row's value as
//! numeric or text and pairs it with its category/item lookup keys. Unit
//! normalization across locales (km/l vs mpg) is explicitly out of scope
//! here — the core only ever compares within matching units (spec §9).

use crate::markdown::TableRow;
use kb_core::SpecPayload;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct ParsedSpec {
    pub category_name: String,
    pub sub_category: Option<String>,
    pub display_name: String,
    pub payload: SpecPayload,
    pub unit: Option<String>,
    pub variant_availability: Option<String>,
    pub key_features: Option<String>,
    pub source_page: i32,
    pub line_number: i32,
}

fn leading_decimal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+(?:\.\d+)?").unwrap())
}

/// Classifies `value` as numeric when it starts with a (possibly
/// negative, possibly decimal) number, in which case any trailing text
/// is treated as the unit when the row didn't already carry one in its
/// own `Unit` column; otherwise the whole value is stored as text.
fn classify(value: &str, column_unit: Option<&str>) -> (SpecPayload, Option<String>) {
    let trimmed = value.trim();
    if let Some(m) = leading_decimal_re().find(trimmed) {
        if let Ok(n) = m.as_str().parse::<f64>() {
            let remainder = trimmed[m.end()..].trim();
            let unit = column_unit
                .map(str::to_string)
                .or_else(|| if remainder.is_empty() { None } else { Some(remainder.to_string()) });
            return (SpecPayload::Numeric(n), unit);
        }
    }
    (SpecPayload::Text(trimmed.to_string()), column_unit.map(str::to_string))
}

/// Builds a [`ParsedSpec`] from a parsed table row and the page it came
/// from. Rows with no category (shouldn't occur after continuation
/// inheritance, but defensively) fall back to "General".
pub fn parse_spec(row: &TableRow, page_number: i32) -> ParsedSpec {
    let (payload, unit) = classify(&row.value, row.unit.as_deref());
    ParsedSpec {
        category_name: row.parent_category.clone().unwrap_or_else(|| "General".to_string()),
        sub_category: row.sub_category.clone(),
        display_name: row.specification.trim().to_string(),
        payload,
        unit,
        variant_availability: row.variant_availability.clone(),
        key_features: row.key_features.clone(),
        source_page: page_number,
        line_number: row.line_number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_decimal_with_unit_column_is_numeric() {
        let row = TableRow {
            parent_category: Some("Engine".to_string()),
            specification: "Fuel Efficiency".to_string(),
            value: "25.49".to_string(),
            unit: Some("km/l".to_string()),
            ..Default::default()
        };
        let spec = parse_spec(&row, 1);
        assert_eq!(spec.payload, SpecPayload::Numeric(25.49));
        assert_eq!(spec.unit.as_deref(), Some("km/l"));
    }

    #[test]
    fn merged_value_and_unit_are_split() {
        let row = TableRow {
            parent_category: Some("Engine".to_string()),
            specification: "Displacement".to_string(),
            value: "2.487 L".to_string(),
            ..Default::default()
        };
        let spec = parse_spec(&row, 1);
        assert_eq!(spec.payload, SpecPayload::Numeric(2.487));
        assert_eq!(spec.unit.as_deref(), Some("L"));
    }

    #[test]
    fn non_numeric_value_is_text() {
        let row = TableRow {
            parent_category: Some("Exterior".to_string()),
            specification: "Color".to_string(),
            value: "Pearl Metallic".to_string(),
            ..Default::default()
        };
        let spec = parse_spec(&row, 1);
        assert_eq!(spec.payload, SpecPayload::Text("Pearl Metallic".to_string()));
    }

    #[test]
    fn missing_category_falls_back_to_general() {
        let row = TableRow {
            specification: "Note".to_string(),
            value: "n/a".to_string(),
            ..Default::default()
        };
        assert_eq!(parse_spec(&row, 1).category_name, "General");
    }
}
