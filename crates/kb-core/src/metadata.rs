//! A small sum type for known metadata fields plus a bounded free-form map
//! (design note §9): "Free-form metadata dictionaries are replaced by a
//! small sum type for known fields plus a bounded free-form map, to avoid
//! accidental schema divergence."

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on the number of free-form keys any `ExtraFields` map may
/// carry. Guards against ingestion input silently growing an unbounded
/// document per row.
pub const MAX_EXTRA_FIELDS: usize = 16;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtraFields(BTreeMap<String, serde_json::Value>);

impl ExtraFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key, silently dropping the insert (and returning `false`)
    /// once `MAX_EXTRA_FIELDS` is reached for keys not already present.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) -> bool {
        let key = key.into();
        if !self.0.contains_key(&key) && self.0.len() >= MAX_EXTRA_FIELDS {
            return false;
        }
        self.0.insert(key, value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// Known fields for a `spec_row` chunk's metadata (spec §4.2), plus a
/// bounded catch-all for anything the parser found but this schema
/// doesn't yet model explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SpecRowMetadata {
    pub parent_category: Option<String>,
    pub sub_category: Option<String>,
    pub specification_type: String,
    pub value: String,
    pub unit: Option<String>,
    pub variant_availability: Option<String>,
    pub source_doc_id: Option<uuid::Uuid>,
    pub source_page: Option<i32>,
    pub line_number: Option<i32>,
    #[serde(default)]
    pub parsed_spec_ids: Vec<uuid::Uuid>,
    #[serde(default)]
    pub extra: ExtraFields,
}

/// Chunk metadata is either a structured `spec_row` record or a bounded
/// free-form map for the other chunk types (feature_block, usp, faq,
/// comparison, global).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkMetadata {
    SpecRow(SpecRowMetadata),
    FreeForm(ExtraFields),
}

impl ChunkMetadata {
    pub fn parsed_spec_ids(&self) -> &[uuid::Uuid] {
        match self {
            ChunkMetadata::SpecRow(m) => &m.parsed_spec_ids,
            ChunkMetadata::FreeForm(_) => &[],
        }
    }

    pub fn merge_parsed_spec_ids(&mut self, ids: impl IntoIterator<Item = uuid::Uuid>) {
        if let ChunkMetadata::SpecRow(m) = self {
            for id in ids {
                if !m.parsed_spec_ids.contains(&id) {
                    m.parsed_spec_ids.push(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_fields_caps_at_bound() {
        let mut extra = ExtraFields::new();
        for i in 0..MAX_EXTRA_FIELDS {
            assert!(extra.insert(format!("k{i}"), serde_json::json!(i)));
        }
        assert!(!extra.insert("overflow", serde_json::json!("x")));
        assert_eq!(extra.len(), MAX_EXTRA_FIELDS);
    }

    #[test]
    fn extra_fields_allows_overwrite_at_bound() {
        let mut extra = ExtraFields::new();
        for i in 0..MAX_EXTRA_FIELDS {
            extra.insert(format!("k{i}"), serde_json::json!(i));
        }
        assert!(extra.insert("k0", serde_json::json!("replaced")));
        assert_eq!(extra.get("k0"), Some(&serde_json::json!("replaced")));
    }

    #[test]
    fn merge_parsed_spec_ids_dedups() {
        let id = uuid::Uuid::new_v4();
        let mut meta = ChunkMetadata::SpecRow(SpecRowMetadata {
            specification_type: "Color".into(),
            value: "Pearl".into(),
            ..Default::default()
        });
        meta.merge_parsed_spec_ids([id, id]);
        assert_eq!(meta.parsed_spec_ids(), &[id]);
    }
}
