//! Repository capability set (spec §4.1): a narrow trait per aggregate,
//! implemented once for Postgres (production) and once for SQLite (the
//! "development embedded SQL engine"). Schema differences — materialized
//! vs. plain view, array vs. JSON columns — are hidden behind these
//! traits; callers never see which backend they're talking to.

use async_trait::async_trait;
use kb_core::{
    CampaignStatus, CampaignVariant, CampaignVariantId, ComparisonRow, ComparisonRowId,
    DocumentSource, DocumentSourceId, DriftAlert, DriftAlertId, DriftAlertStatus, DriftAlertType,
    FeatureBlock, FeatureBlockId, IngestionJob, IngestionJobId, JobStatus, KbResult,
    KnowledgeChunk, KnowledgeChunkId, LineageAction, LineageEvent, LineageEventId, Product,
    ProductId, SpecCategory, SpecItem, SpecValue, SpecValueId, SpecViewRow, Tenant, TenantId,
};
use serde_json::Value as JsonValue;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, tenant: &Tenant) -> KbResult<()>;
    async fn get(&self, id: TenantId) -> KbResult<Tenant>;
    async fn get_by_name(&self, name: &str) -> KbResult<Option<Tenant>>;
    /// Every tenant, used by the drift runner when invoked without a
    /// `tenant` filter (spec §6: `Drift check {tenant?}`).
    async fn list(&self) -> KbResult<Vec<Tenant>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, product: &Product) -> KbResult<()>;
    async fn get(&self, tenant: TenantId, id: ProductId) -> KbResult<Product>;
    async fn get_by_name(&self, tenant: TenantId, name: &str) -> KbResult<Option<Product>>;
    async fn list(&self, tenant: TenantId) -> KbResult<Vec<Product>>;
    /// Products that are benchmarkable against `product` for comparisons
    /// (spec §4.6): public benchmarks, or products shared with `tenant`.
    async fn list_comparable(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<Product>>;
    /// Updates which campaign variant retrieval treats as "currently
    /// serving" for this product. Called by the publisher on publish
    /// (points at the newly-published variant) and rollback (points
    /// back at the variant being reactivated).
    async fn set_default_campaign_variant(
        &self,
        tenant: TenantId,
        product: ProductId,
        campaign_variant: Option<CampaignVariantId>,
    ) -> KbResult<()>;
}

#[async_trait]
pub trait CampaignVariantRepository: Send + Sync {
    async fn create_draft(&self, variant: &CampaignVariant) -> KbResult<()>;
    async fn get(&self, tenant: TenantId, id: CampaignVariantId) -> KbResult<CampaignVariant>;
    async fn find_draft(
        &self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<Option<CampaignVariant>>;
    async fn find_published(
        &self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<Option<CampaignVariant>>;
    async fn find_latest_archived(
        &self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<Option<CampaignVariant>>;
    /// Every currently published variant for a tenant, used by the drift
    /// runner to evaluate `stale_campaign` against each one's age.
    async fn list_published(&self, tenant: TenantId) -> KbResult<Vec<CampaignVariant>>;
    async fn set_status(
        &self,
        id: CampaignVariantId,
        status: CampaignStatus,
        version: i32,
        effective_from: Option<chrono::DateTime<chrono::Utc>>,
        effective_through: Option<chrono::DateTime<chrono::Utc>>,
    ) -> KbResult<()>;
    /// Acquire the publish serialization lock for `(product, locale, trim,
    /// market)` (spec §5: "Publish is serialized ... via an advisory lock
    /// or SELECT-FOR-UPDATE"). Held for the lifetime of the returned guard.
    async fn lock_for_publish<'a>(
        &'a self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<Box<dyn PublishGuard + 'a>>;
}

/// RAII handle representing a held publish lock; dropping it releases the
/// lock (transaction rollback/commit for Postgres, mutex guard for SQLite).
#[async_trait]
pub trait PublishGuard: Send {
    async fn commit(self: Box<Self>) -> KbResult<()>;
}

#[async_trait]
pub trait DocumentSourceRepository: Send + Sync {
    async fn create(&self, doc: &DocumentSource) -> KbResult<()>;
    async fn find_by_hash(&self, tenant: TenantId, sha256: &str) -> KbResult<Option<DocumentSource>>;
    async fn get(&self, tenant: TenantId, id: DocumentSourceId) -> KbResult<DocumentSource>;
    /// Upload history for a product, newest first; used by the drift
    /// runner to detect `hash_changed` (spec §4.7) by comparing the two
    /// most recent uploads for the same campaign variant.
    async fn list_for_product(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<DocumentSource>>;
}

#[async_trait]
pub trait SpecCatalogRepository: Send + Sync {
    async fn find_or_create_category(&self, name: &str) -> KbResult<SpecCategory>;
    async fn find_or_create_item(
        &self,
        category_id: kb_core::SpecCategoryId,
        display_name: &str,
        aliases_hint: &[String],
    ) -> KbResult<SpecItem>;
    /// Looked up by the comparison materializer to name a dimension from
    /// the `spec_item_id` on an active `SpecValue` (spec §4.6).
    async fn get_item(&self, id: kb_core::SpecItemId) -> KbResult<SpecItem>;
}

#[async_trait]
pub trait SpecValueRepository: Send + Sync {
    async fn upsert(&self, value: &SpecValue) -> KbResult<SpecValueId>;
    async fn get(&self, tenant: TenantId, id: SpecValueId) -> KbResult<SpecValue>;
    /// Rows of `spec_view_latest` for the given published variant, scoped
    /// to `tenant` and optionally filtered by product.
    async fn spec_view(
        &self,
        tenant: TenantId,
        products: &[ProductId],
        campaign_variant: CampaignVariantId,
    ) -> KbResult<Vec<SpecViewRow>>;
    /// Active spec values for a product's currently published variant,
    /// used by the comparison materializer (spec §4.6).
    async fn active_for_published(
        &self,
        tenant: TenantId,
        product: ProductId,
    ) -> KbResult<Vec<SpecValue>>;
    /// Spec values sharing the same `spec_item_id` and `campaign_variant_id`
    /// with `status=active` — used by the drift runner to detect conflicts.
    async fn find_conflicts(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<Vec<SpecValue>>>;
}

#[async_trait]
pub trait FeatureBlockRepository: Send + Sync {
    async fn create(&self, block: &FeatureBlock) -> KbResult<()>;
    async fn list_for_variant(
        &self,
        tenant: TenantId,
        campaign_variant: CampaignVariantId,
    ) -> KbResult<Vec<FeatureBlock>>;
}

#[async_trait]
pub trait KnowledgeChunkRepository: Send + Sync {
    async fn find_by_content_hash(
        &self,
        tenant: TenantId,
        hash: &str,
    ) -> KbResult<Option<KnowledgeChunk>>;
    async fn insert(&self, chunk: &KnowledgeChunk) -> KbResult<()>;
    async fn update_metadata_and_embedding(&self, chunk: &KnowledgeChunk) -> KbResult<()>;
    async fn get(&self, tenant: TenantId, id: KnowledgeChunkId) -> KbResult<KnowledgeChunk>;
    async fn list_for_tenant(&self, tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>>;
    async fn list_incomplete(&self, tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>>;
    async fn list_embedding_versions(
        &self,
        tenant: TenantId,
    ) -> KbResult<Vec<(Option<String>, Option<String>, i64)>>;
}

#[async_trait]
pub trait ComparisonRepository: Send + Sync {
    /// Idempotent upsert keyed by `(primary, secondary, dimension,
    /// shareability)` (spec §3 unique key); reruns replace prior rows.
    async fn upsert(&self, row: &ComparisonRow) -> KbResult<()>;
    async fn list(
        &self,
        primary: ProductId,
        secondary: ProductId,
        dimensions: Option<&[String]>,
    ) -> KbResult<Vec<ComparisonRow>>;
    async fn delete_for_product(&self, product: ProductId) -> KbResult<()>;
}

#[async_trait]
pub trait IngestionJobRepository: Send + Sync {
    async fn create(&self, job: &IngestionJob) -> KbResult<()>;
    async fn set_status(
        &self,
        id: IngestionJobId,
        status: JobStatus,
        error_payload: Option<JsonValue>,
    ) -> KbResult<()>;
    async fn get(&self, tenant: TenantId, id: IngestionJobId) -> KbResult<IngestionJob>;
    /// The most recent non-terminal job for `(tenant, product, campaign)`,
    /// used to serialize ingestion (spec §5).
    async fn find_running(
        &self,
        tenant: TenantId,
        product: ProductId,
        campaign: CampaignVariantId,
    ) -> KbResult<Option<IngestionJob>>;
}

#[async_trait]
pub trait LineageRepository: Send + Sync {
    async fn append(
        &self,
        tenant: TenantId,
        resource_type: &str,
        resource_id: &str,
        action: LineageAction,
        payload: JsonValue,
    ) -> KbResult<LineageEventId>;
    async fn list_for_resource(
        &self,
        tenant: TenantId,
        resource_type: &str,
        resource_id: &str,
    ) -> KbResult<Vec<LineageEvent>>;
}

#[async_trait]
pub trait DriftRepository: Send + Sync {
    async fn open_alert(
        &self,
        tenant: TenantId,
        alert_type: DriftAlertType,
        details: JsonValue,
    ) -> KbResult<DriftAlertId>;
    async fn list(&self, tenant: TenantId, status: Option<DriftAlertStatus>) -> KbResult<Vec<DriftAlert>>;
    async fn set_status(&self, id: DriftAlertId, status: DriftAlertStatus) -> KbResult<()>;
}

/// Tenant-scoped purge: cascades across all tenant-owned tables and
/// returns per-table counts (spec §4.7).
#[async_trait]
pub trait PurgeRepository: Send + Sync {
    async fn purge_tenant(&self, tenant: TenantId) -> KbResult<std::collections::BTreeMap<String, u64>>;
}

/// Bundle of every repository a caller needs, so call sites take one
/// `Arc<dyn Repositories>` instead of nine separate trait objects.
pub trait Repositories: Send + Sync {
    fn tenants(&self) -> &dyn TenantRepository;
    fn products(&self) -> &dyn ProductRepository;
    fn campaigns(&self) -> &dyn CampaignVariantRepository;
    fn documents(&self) -> &dyn DocumentSourceRepository;
    fn spec_catalog(&self) -> &dyn SpecCatalogRepository;
    fn spec_values(&self) -> &dyn SpecValueRepository;
    fn feature_blocks(&self) -> &dyn FeatureBlockRepository;
    fn chunks(&self) -> &dyn KnowledgeChunkRepository;
    fn comparisons(&self) -> &dyn ComparisonRepository;
    fn jobs(&self) -> &dyn IngestionJobRepository;
    fn lineage(&self) -> &dyn LineageRepository;
    fn drift(&self) -> &dyn DriftRepository;
    fn purge(&self) -> &dyn PurgeRepository;
}
