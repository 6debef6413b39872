//! YAML front matter (spec §4.2, §6): a mapping of string keys to scalar
//! values at the top of the Markdown document, delimited by `---` lines.
//! Recognized keys populate [`FrontMatter`]; anything else is dropped —
//! the PDF→Markdown extractor is the only writer of this format and its
//! contract only names these seven fields.

use kb_core::ExtraFields;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub country_code: Option<String>,
    pub model_year: Option<i32>,
    pub condition: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub extra: ExtraFields,
}

/// Splits `---\n<yaml>\n---\n<body>` into its front matter and body.
/// Documents with no leading `---` fence are treated as having empty
/// front matter (spec §8: "Empty front matter still produces a valid
/// document source").
pub fn split_front_matter(markdown: &str) -> (FrontMatter, &str) {
    let trimmed = markdown.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed.strip_prefix("---") else {
        return (FrontMatter::default(), markdown);
    };
    let rest = rest.trim_start_matches(['\r', '\n']);
    let Some(end) = find_closing_fence(rest) else {
        return (FrontMatter::default(), markdown);
    };
    let (yaml, body) = rest.split_at(end);
    let body = body.trim_start_matches("---").trim_start_matches(['\r', '\n']);
    (parse_front_matter(yaml), body)
}

fn find_closing_fence(rest: &str) -> Option<usize> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn parse_front_matter(yaml: &str) -> FrontMatter {
    let raw: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml).unwrap_or_default();
    let mut fm = FrontMatter::default();
    for (key, value) in raw {
        match key.as_str() {
            "domain" => fm.domain = scalar_string(&value),
            "subdomain" => fm.subdomain = scalar_string(&value),
            "country_code" => fm.country_code = scalar_string(&value),
            "model_year" => fm.model_year = value.as_i64().map(|v| v as i32),
            "condition" => fm.condition = scalar_string(&value),
            "make" => fm.make = scalar_string(&value),
            "model" => fm.model = scalar_string(&value),
            other => {
                if let Ok(json) = serde_json::to_value(&value) {
                    fm.extra.insert(other, json);
                }
            }
        }
    }
    fm
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_keys() {
        let md = "---\ndomain: automotive\nmake: Toyota\nmodel: Camry\nmodel_year: 2024\n---\n# body";
        let (fm, body) = split_front_matter(md);
        assert_eq!(fm.make.as_deref(), Some("Toyota"));
        assert_eq!(fm.model_year, Some(2024));
        assert_eq!(body.trim(), "# body");
    }

    #[test]
    fn missing_fence_yields_empty_front_matter() {
        let md = "# Just a document\nNo front matter here.";
        let (fm, body) = split_front_matter(md);
        assert_eq!(fm, FrontMatter::default());
        assert_eq!(body, md);
    }

    #[test]
    fn unrecognized_keys_land_in_extra() {
        let md = "---\ndomain: automotive\ntrim_package: XSE\n---\nbody";
        let (fm, _) = split_front_matter(md);
        assert_eq!(fm.extra.get("trim_package"), Some(&serde_json::json!("XSE")));
    }
}
