//! Retrieval router (spec §4.4): keyword stage against `spec_view`
//! first, semantic fallback through the vector store only when keyword
//! confidence falls short, hierarchical grouping of the result, and a
//! TTL cache over the semantic path.

use crate::cache::{SemanticCache, DEFAULT_TTL};
use crate::intent::{classify, Intent};
use crate::keywords::extract_keywords;
use crate::scoring::{score_rows, ScoredRow};
use kb_core::{
    CampaignVariantId, ChunkMetadata, ChunkType, KbError, KbResult, KnowledgeChunk, ProductId,
    SpecViewRow, TenantId,
};
use kb_embedding::{EmbeddingProvider, EmbeddingRequest};
use kb_storage::Repositories;
use kb_vector::{VectorAdapter, VectorFilter};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Structured rows score at least this high before the semantic fallback
/// is skipped entirely (spec §4.4 default threshold).
pub const KEYWORD_CONFIDENCE_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub tenant: TenantId,
    pub product_ids: Vec<ProductId>,
    pub campaign_variant_id: Option<CampaignVariantId>,
    pub question: String,
    pub max_chunks: usize,
    pub intent_hint: Option<Intent>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SemanticChunk {
    pub chunk_id: kb_core::KnowledgeChunkId,
    pub chunk_type: ChunkType,
    pub text: String,
    pub similarity: f32,
    pub parent_category: Option<String>,
    pub sub_category: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SemanticGroup {
    pub parent_category: Option<String>,
    pub sub_category: Option<String>,
    pub chunks: Vec<SemanticChunk>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrieveResponse {
    pub intent: Intent,
    pub structured_facts: Vec<SpecViewRow>,
    pub semantic_groups: Vec<SemanticGroup>,
    pub keyword_confidence: f32,
    pub latency_ms: u64,
    /// Set when the vector store failed and the router fell back to
    /// structured-only results.
    pub degraded: bool,
}

#[derive(Clone)]
struct CachedSemantic {
    groups: Vec<SemanticGroup>,
}

pub struct RetrievalRouter {
    repos: Arc<dyn Repositories>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorAdapter>,
    embedding_model: String,
    embedding_version: String,
    confidence_threshold: f32,
    cache: SemanticCache<CachedSemantic>,
}

impl RetrievalRouter {
    pub fn new(
        repos: Arc<dyn Repositories>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorAdapter>,
        embedding_model: impl Into<String>,
        embedding_version: impl Into<String>,
    ) -> Self {
        Self {
            repos,
            embedder,
            vectors,
            embedding_model: embedding_model.into(),
            embedding_version: embedding_version.into(),
            confidence_threshold: KEYWORD_CONFIDENCE_THRESHOLD,
            cache: SemanticCache::new(DEFAULT_TTL),
        }
    }

    /// Drops every cached semantic response. Call on publish, rollback,
    /// or purge — anything that can change what retrieval would return.
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate_all().await;
    }

    pub async fn retrieve(&self, req: RetrieveRequest) -> KbResult<RetrieveResponse> {
        let start = Instant::now();
        let intent = classify(&req.question, req.product_ids.len(), req.intent_hint);
        let keywords = extract_keywords(&req.question);

        let structured = self.collect_structured_facts(&req).await?;
        let keyword_match = score_rows(structured, &keywords);

        if keyword_match.confidence >= self.confidence_threshold {
            return Ok(RetrieveResponse {
                intent,
                structured_facts: keyword_match.rows.into_iter().map(|r| r.row).collect(),
                semantic_groups: Vec::new(),
                keyword_confidence: keyword_match.confidence,
                latency_ms: start.elapsed().as_millis() as u64,
                degraded: false,
            });
        }

        let cache_key = self.cache_key(&req, intent);
        let semantic_result = self
            .cache
            .get_or_compute(&cache_key, || self.run_semantic_search(&req, intent))
            .await;

        let (semantic_groups, degraded) = match semantic_result {
            Ok(cached) => (cached.groups, false),
            Err(e) => {
                warn!(error = %e, "semantic retrieval failed, degrading to structured-only");
                (Vec::new(), true)
            }
        };

        Ok(RetrieveResponse {
            intent,
            structured_facts: keyword_match.rows.into_iter().map(ScoredRow::into_inner).collect(),
            semantic_groups,
            keyword_confidence: keyword_match.confidence,
            latency_ms: start.elapsed().as_millis() as u64,
            degraded,
        })
    }

    /// Builds the `spec_view` row set for every requested product, each
    /// scoped to an explicit override (if given) or that product's own
    /// currently-serving variant. Products with neither are skipped —
    /// there is nothing published to show yet.
    async fn collect_structured_facts(&self, req: &RetrieveRequest) -> KbResult<Vec<SpecViewRow>> {
        let mut rows = Vec::new();
        for product_id in &req.product_ids {
            let Some(variant) = self.resolve_campaign_variant(req.tenant, *product_id, req.campaign_variant_id).await?
            else {
                continue;
            };
            let product_rows =
                self.repos.spec_values().spec_view(req.tenant, &[*product_id], variant).await?;
            rows.extend(product_rows);
        }
        Ok(rows)
    }

    /// Resolves which published campaign variant should scope queries
    /// for `product`. An explicit `override_id` that no longer points at
    /// a published variant falls back to the last published variant of
    /// the same (product, locale, trim, market); absent an override, the
    /// product's own `default_campaign_variant_id` (kept current by the
    /// publisher on publish/rollback) is used.
    async fn resolve_campaign_variant(
        &self,
        tenant: TenantId,
        product: ProductId,
        override_id: Option<CampaignVariantId>,
    ) -> KbResult<Option<CampaignVariantId>> {
        if let Some(id) = override_id {
            match self.repos.campaigns().get(tenant, id).await {
                Ok(variant) if variant.status == kb_core::CampaignStatus::Published => {
                    return Ok(Some(variant.id));
                }
                Ok(variant) => {
                    let fallback = self
                        .repos
                        .campaigns()
                        .find_published(
                            tenant,
                            variant.product_id,
                            &variant.locale,
                            variant.trim.as_deref(),
                            variant.market.as_deref(),
                        )
                        .await?;
                    return Ok(fallback.map(|v| v.id));
                }
                Err(KbError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        let product = self.repos.products().get(tenant, product).await?;
        Ok(product.default_campaign_variant_id)
    }

    async fn run_semantic_search(
        &self,
        req: &RetrieveRequest,
        intent: Intent,
    ) -> KbResult<CachedSemantic> {
        let query = EmbeddingRequest {
            model: self.embedding_model.clone(),
            version: self.embedding_version.clone(),
            texts: vec![req.question.clone()],
        };
        let batch = self.embedder.embed(query).await?;
        let query_vector = batch.vectors.first().cloned().ok_or_else(|| {
            KbError::Internal(anyhow::anyhow!("embedding provider returned no vector for the query"))
        })?;

        let top_k = (req.max_chunks * 2).max(10);
        let filter = VectorFilter {
            tenant_id: Some(req.tenant),
            product_ids: req.product_ids.clone(),
            campaign_variant_id: req.campaign_variant_id,
            chunk_type: None,
        };

        let matches =
            self.vectors.search(&query_vector, &self.embedding_model, &self.embedding_version, &filter, top_k).await?;

        let mut chunks = Vec::with_capacity(matches.len());
        for m in matches {
            match self.repos.chunks().get(req.tenant, m.chunk_id).await {
                Ok(chunk) => chunks.push((chunk, m.similarity)),
                Err(KbError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let ranked = rank(chunks, intent, req.max_chunks);
        Ok(CachedSemantic { groups: group_hierarchically(ranked) })
    }

    fn cache_key(&self, req: &RetrieveRequest, intent: Intent) -> String {
        let mut product_ids: Vec<String> = req.product_ids.iter().map(|p| p.to_string()).collect();
        product_ids.sort();
        format!(
            "{}|{}|{}|{}|{}|{}",
            req.tenant,
            product_ids.join(","),
            req.campaign_variant_id.map(|c| c.to_string()).unwrap_or_default(),
            req.question.trim().to_lowercase(),
            req.max_chunks,
            intent.as_str()
        )
    }
}

/// Combines ANN similarity with a metadata-affinity boost (intent-
/// matched chunk type, priority on feature-block-sourced chunks) and
/// keeps the top `max_chunks`.
fn rank(chunks: Vec<(KnowledgeChunk, f32)>, intent: Intent, max_chunks: usize) -> Vec<SemanticChunk> {
    let preferred = intent.preferred_chunk_type();
    let mut scored: Vec<(f32, SemanticChunk)> = chunks
        .into_iter()
        .map(|(chunk, similarity)| {
            let mut affinity = similarity;
            if preferred == Some(chunk.chunk_type) {
                affinity += 0.05;
            }
            let (parent_category, sub_category) = match &chunk.metadata {
                ChunkMetadata::SpecRow(m) => (m.parent_category.clone(), m.sub_category.clone()),
                ChunkMetadata::FreeForm(_) => (None, None),
            };
            (
                affinity,
                SemanticChunk {
                    chunk_id: chunk.id,
                    chunk_type: chunk.chunk_type,
                    text: chunk.text,
                    similarity,
                    parent_category,
                    sub_category,
                },
            )
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(max_chunks).map(|(_, chunk)| chunk).collect()
}

/// Groups `spec_row` chunks by `parent_category` then `sub_category`
/// (alphabetically); everything else (feature/USP/FAQ/comparison
/// chunks) stays ungrouped, in rank order, as its own pass-through group.
fn group_hierarchically(chunks: Vec<SemanticChunk>) -> Vec<SemanticGroup> {
    let mut grouped: Vec<SemanticGroup> = Vec::new();
    let mut ungrouped = Vec::new();

    for chunk in chunks {
        if chunk.chunk_type == ChunkType::SpecRow {
            if let Some(group) = grouped
                .iter_mut()
                .find(|g| g.parent_category == chunk.parent_category && g.sub_category == chunk.sub_category)
            {
                group.chunks.push(chunk);
            } else {
                grouped.push(SemanticGroup {
                    parent_category: chunk.parent_category.clone(),
                    sub_category: chunk.sub_category.clone(),
                    chunks: vec![chunk],
                });
            }
        } else {
            ungrouped.push(chunk);
        }
    }

    grouped.sort_by(|a, b| {
        a.parent_category
            .cmp(&b.parent_category)
            .then_with(|| a.sub_category.cmp(&b.sub_category))
    });

    if !ungrouped.is_empty() {
        grouped.push(SemanticGroup { parent_category: None, sub_category: None, chunks: ungrouped });
    }

    grouped
}

impl ScoredRow {
    fn into_inner(self) -> SpecViewRow {
        self.row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kb_core::{
        CampaignStatus, CampaignVariant, ChunkMetadata as KCChunkMetadata, CompletionStatus, KnowledgeChunkId,
        Product, SpecPayload, SpecRowMetadata, SpecValue, SpecValueId,
    };
    use kb_embedding::StubEmbeddingProvider;
    use kb_storage::traits::{
        CampaignVariantRepository, ComparisonRepository, DocumentSourceRepository, DriftRepository,
        FeatureBlockRepository, IngestionJobRepository, KnowledgeChunkRepository, LineageRepository,
        ProductRepository, PublishGuard, PurgeRepository, SpecCatalogRepository, SpecValueRepository,
        TenantRepository,
    };
    use kb_vector::InMemoryVectorAdapter;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProducts {
        products: Mutex<Vec<Product>>,
    }

    #[async_trait]
    impl ProductRepository for FakeProducts {
        async fn create(&self, _p: &Product) -> KbResult<()> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn get(&self, _tenant: TenantId, id: ProductId) -> KbResult<Product> {
            self.products
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("product".to_string()))
        }
        async fn get_by_name(&self, _tenant: TenantId, _name: &str) -> KbResult<Option<Product>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn list(&self, _tenant: TenantId) -> KbResult<Vec<Product>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn list_comparable(&self, _tenant: TenantId, _product: ProductId) -> KbResult<Vec<Product>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn set_default_campaign_variant(
            &self,
            _tenant: TenantId,
            _product: ProductId,
            _campaign_variant: Option<CampaignVariantId>,
        ) -> KbResult<()> {
            unimplemented!("not exercised by retrieval tests")
        }
    }

    #[derive(Default)]
    struct FakeCampaigns {
        variants: Mutex<Vec<CampaignVariant>>,
    }

    struct NoopGuard;

    #[async_trait]
    impl PublishGuard for NoopGuard {
        async fn commit(self: Box<Self>) -> KbResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl CampaignVariantRepository for FakeCampaigns {
        async fn create_draft(&self, _variant: &CampaignVariant) -> KbResult<()> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn get(&self, _tenant: TenantId, id: CampaignVariantId) -> KbResult<CampaignVariant> {
            self.variants
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("campaign variant".to_string()))
        }
        async fn find_draft(
            &self,
            _tenant: TenantId,
            _product: ProductId,
            _locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Option<CampaignVariant>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn find_published(
            &self,
            _tenant: TenantId,
            product: ProductId,
            locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Option<CampaignVariant>> {
            Ok(self
                .variants
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.product_id == product && v.locale == locale && v.status == CampaignStatus::Published)
                .cloned())
        }
        async fn find_latest_archived(
            &self,
            _tenant: TenantId,
            _product: ProductId,
            _locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Option<CampaignVariant>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn list_published(&self, _tenant: TenantId) -> KbResult<Vec<CampaignVariant>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn set_status(
            &self,
            _id: CampaignVariantId,
            _status: CampaignStatus,
            _version: i32,
            _effective_from: Option<chrono::DateTime<chrono::Utc>>,
            _effective_through: Option<chrono::DateTime<chrono::Utc>>,
        ) -> KbResult<()> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn lock_for_publish<'a>(
            &'a self,
            _tenant: TenantId,
            _product: ProductId,
            _locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Box<dyn PublishGuard + 'a>> {
            Ok(Box::new(NoopGuard))
        }
    }

    #[derive(Default)]
    struct FakeSpecValues {
        rows: Mutex<Vec<SpecViewRow>>,
    }

    #[async_trait]
    impl SpecValueRepository for FakeSpecValues {
        async fn upsert(&self, _value: &SpecValue) -> KbResult<SpecValueId> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn get(&self, _tenant: TenantId, _id: SpecValueId) -> KbResult<SpecValue> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn spec_view(
            &self,
            _tenant: TenantId,
            products: &[ProductId],
            campaign_variant: CampaignVariantId,
        ) -> KbResult<Vec<SpecViewRow>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| products.contains(&r.product_id) && r.campaign_variant_id == campaign_variant)
                .cloned()
                .collect())
        }
        async fn active_for_published(&self, _tenant: TenantId, _product: ProductId) -> KbResult<Vec<SpecValue>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn find_conflicts(&self, _tenant: TenantId, _product: ProductId) -> KbResult<Vec<Vec<SpecValue>>> {
            unimplemented!("not exercised by retrieval tests")
        }
    }

    #[derive(Default)]
    struct FakeChunks {
        chunks: Mutex<Vec<KnowledgeChunk>>,
    }

    #[async_trait]
    impl KnowledgeChunkRepository for FakeChunks {
        async fn find_by_content_hash(&self, _tenant: TenantId, _hash: &str) -> KbResult<Option<KnowledgeChunk>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn insert(&self, _chunk: &KnowledgeChunk) -> KbResult<()> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn update_metadata_and_embedding(&self, _chunk: &KnowledgeChunk) -> KbResult<()> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn get(&self, _tenant: TenantId, id: KnowledgeChunkId) -> KbResult<KnowledgeChunk> {
            self.chunks
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("chunk".to_string()))
        }
        async fn list_for_tenant(&self, _tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn list_incomplete(&self, _tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>> {
            unimplemented!("not exercised by retrieval tests")
        }
        async fn list_embedding_versions(
            &self,
            _tenant: TenantId,
        ) -> KbResult<Vec<(Option<String>, Option<String>, i64)>> {
            unimplemented!("not exercised by retrieval tests")
        }
    }

    struct FakeRepos {
        products: FakeProducts,
        campaigns: FakeCampaigns,
        spec_values: FakeSpecValues,
        chunks: FakeChunks,
    }

    impl Repositories for FakeRepos {
        fn tenants(&self) -> &dyn TenantRepository {
            unimplemented!("not exercised by retrieval tests")
        }
        fn products(&self) -> &dyn ProductRepository {
            &self.products
        }
        fn campaigns(&self) -> &dyn CampaignVariantRepository {
            &self.campaigns
        }
        fn documents(&self) -> &dyn DocumentSourceRepository {
            unimplemented!("not exercised by retrieval tests")
        }
        fn spec_catalog(&self) -> &dyn SpecCatalogRepository {
            unimplemented!("not exercised by retrieval tests")
        }
        fn spec_values(&self) -> &dyn SpecValueRepository {
            &self.spec_values
        }
        fn feature_blocks(&self) -> &dyn FeatureBlockRepository {
            unimplemented!("not exercised by retrieval tests")
        }
        fn chunks(&self) -> &dyn KnowledgeChunkRepository {
            &self.chunks
        }
        fn comparisons(&self) -> &dyn ComparisonRepository {
            unimplemented!("not exercised by retrieval tests")
        }
        fn jobs(&self) -> &dyn IngestionJobRepository {
            unimplemented!("not exercised by retrieval tests")
        }
        fn lineage(&self) -> &dyn LineageRepository {
            unimplemented!("not exercised by retrieval tests")
        }
        fn drift(&self) -> &dyn DriftRepository {
            unimplemented!("not exercised by retrieval tests")
        }
        fn purge(&self) -> &dyn PurgeRepository {
            unimplemented!("not exercised by retrieval tests")
        }
    }

    fn published_variant(product: ProductId) -> CampaignVariant {
        CampaignVariant {
            id: CampaignVariantId::new(),
            product_id: product,
            tenant_id: TenantId::new(),
            locale: "en-US".to_string(),
            trim: None,
            market: None,
            status: CampaignStatus::Published,
            version: 1,
            effective_from: Some(chrono::Utc::now()),
            effective_through: None,
        }
    }

    fn spec_row(product: ProductId, variant: CampaignVariantId, specification: &str, value: &str) -> SpecViewRow {
        SpecViewRow {
            product_id: product,
            campaign_variant_id: variant,
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

    async fn router_with(
        products: Vec<Product>,
        variants: Vec<CampaignVariant>,
        rows: Vec<SpecViewRow>,
        chunks: Vec<KnowledgeChunk>,
    ) -> (RetrievalRouter, Arc<InMemoryVectorAdapter>) {
        let repos: Arc<dyn Repositories> = Arc::new(FakeRepos {
            products: FakeProducts { products: Mutex::new(products) },
            campaigns: FakeCampaigns { variants: Mutex::new(variants) },
            spec_values: FakeSpecValues { rows: Mutex::new(rows) },
            chunks: FakeChunks { chunks: Mutex::new(chunks) },
        });
        let vectors = Arc::new(InMemoryVectorAdapter::new());
        let embedder = Arc::new(StubEmbeddingProvider::new(8));
        let router = RetrievalRouter::new(repos, embedder, vectors.clone(), "stub", "v1");
        (router, vectors)
    }

    #[tokio::test]
    async fn high_keyword_confidence_skips_semantic_search() {
        let tenant = TenantId::new();
        let product = ProductId::new();
        let variant = published_variant(product);
        let mut towing = spec_row(product, variant.id, "Towing Capacity", "3500 lbs");
        towing.product_id = product;

        let mut product_entity = Product {
            id: product,
            tenant_id: tenant,
            name: "Ranger".to_string(),
            segment: None,
            body_type: None,
            model_year: None,
            is_public_benchmark: false,
            default_campaign_variant_id: Some(variant.id),
            metadata: serde_json::json!({}),
        };
        product_entity.id = product;

        let (router, _vectors) =
            router_with(vec![product_entity], vec![variant.clone()], vec![towing], vec![]).await;

        let resp = router
            .retrieve(RetrieveRequest {
                tenant,
                product_ids: vec![product],
                campaign_variant_id: None,
                question: "what is the towing capacity?".to_string(),
                max_chunks: 5,
                intent_hint: None,
            })
            .await
            .unwrap();

        assert!(resp.keyword_confidence >= KEYWORD_CONFIDENCE_THRESHOLD);
        assert!(resp.semantic_groups.is_empty());
        assert_eq!(resp.structured_facts.len(), 1);
    }

    #[tokio::test]
    async fn low_keyword_confidence_falls_back_to_semantic_search() {
        let tenant = TenantId::new();
        let product = ProductId::new();
        let variant = published_variant(product);

        let product_entity = Product {
            id: product,
            tenant_id: tenant,
            name: "Ranger".to_string(),
            segment: None,
            body_type: None,
            model_year: None,
            is_public_benchmark: false,
            default_campaign_variant_id: Some(variant.id),
            metadata: serde_json::json!({}),
        };

        let chunk = KnowledgeChunk {
            id: KnowledgeChunkId::new(),
            tenant_id: tenant,
            product_id: product,
            campaign_variant_id: Some(variant.id),
            chunk_type: ChunkType::SpecRow,
            text: "Category: Engine\nSpecification: Horsepower\nValue: 310 hp".to_string(),
            metadata: KCChunkMetadata::SpecRow(SpecRowMetadata {
                parent_category: Some("Engine".to_string()),
                sub_category: None,
                specification_type: "numeric".to_string(),
                value: "310".to_string(),
                unit: Some("hp".to_string()),
                variant_availability: None,
                source_doc_id: None,
                source_page: None,
                line_number: None,
                parsed_spec_ids: Vec::new(),
                extra: Default::default(),
            }),
            embedding_vector: None,
            embedding_model: None,
            embedding_version: None,
            content_hash: None,
            completion_status: CompletionStatus::Complete,
            visibility: kb_core::ChunkVisibility::Private,
        };

        let (router, vectors) =
            router_with(vec![product_entity], vec![variant.clone()], vec![], vec![chunk.clone()]).await;

        vectors
            .upsert(vec![kb_vector::VectorEntry {
                chunk_id: chunk.id,
                tenant_id: tenant,
                product_id: product,
                campaign_variant_id: Some(variant.id),
                chunk_type: ChunkType::SpecRow,
                model: "stub".to_string(),
                version: "v1".to_string(),
                vector: StubEmbeddingProvider::new(8)
                    .embed(kb_embedding::EmbeddingRequest {
                        model: "stub".to_string(),
                        version: "v1".to_string(),
                        texts: vec![chunk.text.clone()],
                    })
                    .await
                    .unwrap()
                    .vectors
                    .remove(0),
            }])
            .await
            .unwrap();

        let resp = router
            .retrieve(RetrieveRequest {
                tenant,
                product_ids: vec![product],
                campaign_variant_id: None,
                question: "tell me something about this vehicle".to_string(),
                max_chunks: 5,
                intent_hint: None,
            })
            .await
            .unwrap();

        assert!(resp.keyword_confidence < KEYWORD_CONFIDENCE_THRESHOLD);
        assert!(!resp.degraded);
        assert_eq!(resp.semantic_groups.iter().map(|g| g.chunks.len()).sum::<usize>(), 1);
    }

    #[tokio::test]
    async fn missing_published_variant_yields_no_structured_facts() {
        let tenant = TenantId::new();
        let product = ProductId::new();
        let product_entity = Product {
            id: product,
            tenant_id: tenant,
            name: "Ranger".to_string(),
            segment: None,
            body_type: None,
            model_year: None,
            is_public_benchmark: false,
            default_campaign_variant_id: None,
            metadata: serde_json::json!({}),
        };

        let (router, _vectors) = router_with(vec![product_entity], vec![], vec![], vec![]).await;

        let resp = router
            .retrieve(RetrieveRequest {
                tenant,
                product_ids: vec![product],
                campaign_variant_id: None,
                question: "what is the towing capacity?".to_string(),
                max_chunks: 5,
                intent_hint: None,
            })
            .await
            .unwrap();

        assert!(resp.structured_facts.is_empty());
    }
}
