//! Domain entities for the brochure knowledge engine (spec §3).
//!
//! These are plain data types shared by every crate in the workspace;
//! `kb-storage` is the only crate that knows how to persist them.

use crate::ids::{
    CampaignVariantId, ComparisonRowId, DocumentSourceId, DriftAlertId, FeatureBlockId,
    IngestionJobId, KnowledgeChunkId, LineageEventId, ProductId, SpecCategoryId, SpecItemId,
    SpecValueId, TenantId,
};
use crate::metadata::ChunkMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Sandbox,
    Pro,
    Enterprise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub plan: Plan,
    pub settings: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shareability {
    Private,
    Tenant,
    Public,
}

impl Shareability {
    /// Shareability forms a total order `Private < Tenant < Public`
    /// (used by invariant I6 and the comparison materializer, spec §4.6).
    pub fn rank(self) -> u8 {
        match self {
            Shareability::Private => 0,
            Shareability::Tenant => 1,
            Shareability::Public => 2,
        }
    }

    pub fn min(self, other: Shareability) -> Shareability {
        if self.rank() <= other.rank() {
            self
        } else {
            other
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub segment: Option<String>,
    pub body_type: Option<String>,
    pub model_year: Option<i32>,
    pub is_public_benchmark: bool,
    pub default_campaign_variant_id: Option<CampaignVariantId>,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignVariant {
    pub id: CampaignVariantId,
    pub product_id: ProductId,
    pub tenant_id: TenantId,
    pub locale: String,
    pub trim: Option<String>,
    pub market: Option<String>,
    pub status: CampaignStatus,
    pub version: i32,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_through: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSource {
    pub id: DocumentSourceId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub campaign_variant_id: Option<CampaignVariantId>,
    pub storage_uri: String,
    pub sha256: String,
    pub extractor_version: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecCategory {
    pub id: SpecCategoryId,
    pub name: String,
    pub display_order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecDataType {
    Text,
    Numeric,
    Boolean,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecItem {
    pub id: SpecItemId,
    pub category_id: SpecCategoryId,
    pub display_name: String,
    pub unit: Option<String>,
    pub data_type: SpecDataType,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecValueStatus {
    Active,
    Conflict,
    Deprecated,
}

/// A spec value's numeric/text payload. Invariant I5: exactly one of the
/// two is set, enforced by construction rather than by two `Option` fields
/// that could both be `Some`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SpecPayload {
    Numeric(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecValue {
    pub id: SpecValueId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub campaign_variant_id: CampaignVariantId,
    pub spec_item_id: SpecItemId,
    pub payload: SpecPayload,
    pub unit: Option<String>,
    pub confidence: f32,
    pub status: SpecValueStatus,
    pub source_doc_id: Option<DocumentSourceId>,
    pub source_page: Option<i32>,
    pub version: i32,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_through: Option<DateTime<Utc>>,
    pub key_features: Option<String>,
    pub variant_availability: Option<String>,
    pub explanation: Option<String>,
    pub explanation_failed: bool,
}

impl SpecValue {
    pub fn value_text(&self) -> Option<&str> {
        match &self.payload {
            SpecPayload::Text(s) => Some(s),
            SpecPayload::Numeric(_) => None,
        }
    }

    pub fn value_numeric(&self) -> Option<f64> {
        match &self.payload {
            SpecPayload::Numeric(n) => Some(*n),
            SpecPayload::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureBlockType {
    Feature,
    Usp,
    Accessory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBlock {
    pub id: FeatureBlockId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub campaign_variant_id: Option<CampaignVariantId>,
    pub block_type: FeatureBlockType,
    pub body: String,
    pub priority: i32,
    pub tags: Vec<String>,
    pub shareability: Shareability,
    pub embedding_vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    SpecRow,
    FeatureBlock,
    Usp,
    Faq,
    Comparison,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Complete,
    Incomplete,
    RetryNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkVisibility {
    Private,
    Shared,
    Benchmark,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: KnowledgeChunkId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub campaign_variant_id: Option<CampaignVariantId>,
    pub chunk_type: ChunkType,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding_vector: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub embedding_version: Option<String>,
    pub content_hash: Option<String>,
    pub completion_status: CompletionStatus,
    pub visibility: ChunkVisibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonVerdict {
    PrimaryBetter,
    SecondaryBetter,
    Equal,
    CannotCompare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub id: ComparisonRowId,
    pub primary_product_id: ProductId,
    pub secondary_product_id: ProductId,
    pub dimension: String,
    pub primary_value: Option<String>,
    pub secondary_value: Option<String>,
    pub verdict: ComparisonVerdict,
    pub narrative: Option<String>,
    pub shareability: Shareability,
    pub source_primary_spec_id: Option<SpecValueId>,
    pub source_secondary_spec_id: Option<SpecValueId>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Failed,
    Succeeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: IngestionJobId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub campaign_variant_id: CampaignVariantId,
    pub status: JobStatus,
    pub error_payload: Option<JsonValue>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageAction {
    Created,
    Updated,
    Deleted,
    Reconciled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEvent {
    pub id: LineageEventId,
    pub tenant_id: TenantId,
    pub resource_type: String,
    pub resource_id: String,
    pub action: LineageAction,
    pub payload: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftAlertType {
    StaleCampaign,
    ConflictDetected,
    HashChanged,
    EmbeddingVersionMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftAlertStatus {
    Open,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftAlert {
    pub id: DriftAlertId,
    pub tenant_id: TenantId,
    pub alert_type: DriftAlertType,
    pub status: DriftAlertStatus,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub details: JsonValue,
}

/// A row of the `spec_view_latest` materialized/plain view (spec §3):
/// active SpecValues joined to their published CampaignVariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecViewRow {
    pub product_id: ProductId,
    pub campaign_variant_id: CampaignVariantId,
    pub category: String,
    pub specification: String,
    pub value: SpecPayload,
    pub unit: Option<String>,
    pub confidence: f32,
    pub key_features: Option<String>,
    pub variant_availability: Option<String>,
    pub explanation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shareability_min_is_symmetric() {
        assert_eq!(
            Shareability::Private.min(Shareability::Public),
            Shareability::Public.min(Shareability::Private)
        );
        assert_eq!(Shareability::Private.min(Shareability::Tenant), Shareability::Private);
    }

    #[test]
    fn spec_value_payload_is_exclusive() {
        let numeric = SpecPayload::Numeric(2.487);
        assert!(matches!(numeric, SpecPayload::Numeric(_)));
    }
}
