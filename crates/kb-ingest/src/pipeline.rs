//! Ingestion orchestration (spec §4.2, §5): turns one Markdown brochure
//! into `SpecValue`/`FeatureBlock`/`KnowledgeChunk` rows bound to a draft
//! campaign variant, embeds the new chunks, and tracks the whole run as
//! one `IngestionJob`.

use crate::chunking::{canonical_text, content_hash};
use crate::front_matter::split_front_matter;
use crate::markdown::{parse_pages, Page, TableRow};
use crate::normalize::parse_spec;
use chrono::Utc;
use kb_core::{
    CampaignStatus, CampaignVariant, CampaignVariantId, ChunkMetadata, ChunkType, ChunkVisibility,
    CompletionStatus, DocumentSource, FeatureBlock, FeatureBlockType, IngestionJob, JobStatus,
    KbError, KbResult, KnowledgeChunk, Product, ProductId, Shareability, SpecPayload,
    SpecRowMetadata, SpecValue, SpecValueId, SpecValueStatus, TenantId,
};
use kb_embedding::{EmbeddingBatch, EmbeddingProvider, EmbeddingRequest};
use kb_storage::Repositories;
use kb_vector::{VectorAdapter, VectorEntry};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

/// Spec §4.2: "chunks are embedded in batches of 50-100".
const EMBED_BATCH_SIZE: usize = 80;

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub tenant: TenantId,
    pub product: ProductId,
    pub locale: String,
    pub trim: Option<String>,
    pub market: Option<String>,
    pub markdown: String,
    pub source_uri: String,
    pub extractor_version: Option<String>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestOutcome {
    pub job_id: Option<kb_core::IngestionJobId>,
    pub campaign_variant_id: Option<CampaignVariantId>,
    pub spec_values_written: u64,
    pub feature_blocks_written: u64,
    pub chunks_new: u64,
    pub chunks_deduped: u64,
    pub chunks_incomplete: u64,
}

/// Drives one brochure through parse → chunk → dedup → embed → persist.
/// Holds no per-call state beyond the repository bundle and the embedding
/// configuration; every ingest call is independent.
pub struct IngestionPipeline {
    repos: Arc<dyn Repositories>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorAdapter>,
    embedding_model: String,
    embedding_version: String,
}

impl IngestionPipeline {
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
        }
    }

    pub async fn ingest(&self, req: IngestRequest) -> KbResult<IngestOutcome> {
        let product = self.repos.products().get(req.tenant, req.product).await?;
        let sha256 = hex::encode(Sha256::digest(req.markdown.as_bytes()));

        if !req.overwrite {
            if let Some(existing) = self.repos.documents().find_by_hash(req.tenant, &sha256).await? {
                if existing.product_id == req.product {
                    return Err(KbError::Conflict(
                        "identical document already ingested for this product; pass overwrite to reingest".to_string(),
                    ));
                }
            }
        }

        let campaign = self.find_or_create_draft(&req).await?;

        let running = self.repos.jobs().find_running(req.tenant, req.product, campaign.id).await?;
        if let Some(running) = running {
            if !req.overwrite {
                return Err(KbError::Conflict(
                    "an ingestion job is already running for this campaign variant".to_string(),
                ));
            }
            warn!(job_id = %running.id, "overwrite requested, superseding running ingestion job");
            self.repos
                .jobs()
                .set_status(running.id, JobStatus::Failed, Some(serde_json::json!({"reason": "superseded by overwrite"})))
                .await?;
        }

        let job = IngestionJob {
            id: kb_core::IngestionJobId::new(),
            tenant_id: req.tenant,
            product_id: req.product,
            campaign_variant_id: campaign.id,
            status: JobStatus::Running,
            error_payload: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        };
        self.repos.jobs().create(&job).await?;

        match self.run(&req, &product, &campaign, &sha256).await {
            Ok(mut outcome) => {
                self.repos.jobs().set_status(job.id, JobStatus::Succeeded, None).await?;
                outcome.job_id = Some(job.id);
                outcome.campaign_variant_id = Some(campaign.id);
                self.repos
                    .lineage()
                    .append(
                        req.tenant,
                        "campaign_variant",
                        &campaign.id.to_string(),
                        kb_core::LineageAction::Updated,
                        serde_json::json!({
                            "action": "ingest",
                            "spec_values_written": outcome.spec_values_written,
                            "feature_blocks_written": outcome.feature_blocks_written,
                            "chunks_new": outcome.chunks_new,
                            "chunks_deduped": outcome.chunks_deduped,
                            "chunks_incomplete": outcome.chunks_incomplete,
                        }),
                    )
                    .await?;
                info!(
                    job_id = %job.id,
                    campaign_variant_id = %campaign.id,
                    spec_values = outcome.spec_values_written,
                    chunks_new = outcome.chunks_new,
                    chunks_deduped = outcome.chunks_deduped,
                    "ingestion job succeeded"
                );
                Ok(outcome)
            }
            Err(err) => {
                let _ = self
                    .repos
                    .jobs()
                    .set_status(job.id, JobStatus::Failed, Some(serde_json::json!({"error": err.to_string()})))
                    .await;
                Err(err)
            }
        }
    }

    async fn find_or_create_draft(&self, req: &IngestRequest) -> KbResult<CampaignVariant> {
        let campaigns = self.repos.campaigns();
        if let Some(draft) = campaigns
            .find_draft(req.tenant, req.product, &req.locale, req.trim.as_deref(), req.market.as_deref())
            .await?
        {
            return Ok(draft);
        }
        let published = campaigns
            .find_published(req.tenant, req.product, &req.locale, req.trim.as_deref(), req.market.as_deref())
            .await?;
        let variant = CampaignVariant {
            id: CampaignVariantId::new(),
            product_id: req.product,
            tenant_id: req.tenant,
            locale: req.locale.clone(),
            trim: req.trim.clone(),
            market: req.market.clone(),
            status: CampaignStatus::Draft,
            version: published.map(|p| p.version).unwrap_or(1),
            effective_from: None,
            effective_through: None,
        };
        campaigns.create_draft(&variant).await?;
        Ok(variant)
    }

    async fn run(
        &self,
        req: &IngestRequest,
        product: &Product,
        campaign: &CampaignVariant,
        sha256: &str,
    ) -> KbResult<IngestOutcome> {
        let (_front_matter, body) = split_front_matter(&req.markdown);
        let pages = parse_pages(body);

        let doc = DocumentSource {
            id: kb_core::DocumentSourceId::new(),
            tenant_id: req.tenant,
            product_id: req.product,
            campaign_variant_id: Some(campaign.id),
            storage_uri: req.source_uri.clone(),
            sha256: sha256.to_string(),
            extractor_version: req.extractor_version.clone(),
            uploaded_at: Utc::now(),
        };
        self.repos.documents().create(&doc).await?;

        let visibility = default_visibility(product);
        let shareability = default_shareability(product);

        let mut outcome = IngestOutcome::default();
        let mut pending: Vec<KnowledgeChunk> = Vec::new();

        for page in &pages {
            self.ingest_spec_rows(req, campaign, &doc, page, visibility, &mut outcome, &mut pending).await?;
            self.ingest_bullets(
                req,
                campaign,
                &page.key_features,
                FeatureBlockType::Feature,
                ChunkType::FeatureBlock,
                shareability,
                visibility,
                &mut outcome,
                &mut pending,
            )
            .await?;
            self.ingest_bullets(
                req,
                campaign,
                &page.usps,
                FeatureBlockType::Usp,
                ChunkType::Usp,
                shareability,
                visibility,
                &mut outcome,
                &mut pending,
            )
            .await?;
        }

        self.embed_pending(&mut pending, &mut outcome).await?;

        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest_spec_rows(
        &self,
        req: &IngestRequest,
        campaign: &CampaignVariant,
        doc: &DocumentSource,
        page: &Page,
        visibility: ChunkVisibility,
        outcome: &mut IngestOutcome,
        pending: &mut Vec<KnowledgeChunk>,
    ) -> KbResult<()> {
        for row in &page.spec_rows {
            let parsed = parse_spec(row, page.page_number);
            let canonical = canonical_text(row);
            let hash = content_hash(&canonical);

            let category = self.repos.spec_catalog().find_or_create_category(&parsed.category_name).await?;
            let item = self
                .repos
                .spec_catalog()
                .find_or_create_item(category.id, &parsed.display_name, &[])
                .await?;

            let spec_value = SpecValue {
                id: SpecValueId::new(),
                tenant_id: req.tenant,
                product_id: req.product,
                campaign_variant_id: campaign.id,
                spec_item_id: item.id,
                payload: parsed.payload.clone(),
                unit: parsed.unit.clone(),
                confidence: 1.0,
                status: SpecValueStatus::Active,
                source_doc_id: Some(doc.id),
                source_page: Some(parsed.source_page),
                version: 1,
                effective_from: None,
                effective_through: None,
                key_features: parsed.key_features.clone(),
                variant_availability: parsed.variant_availability.clone(),
                explanation: None,
                explanation_failed: false,
            };
            let spec_value_id = self.repos.spec_values().upsert(&spec_value).await?;
            outcome.spec_values_written += 1;

            self.upsert_chunk(
                req,
                campaign,
                doc,
                row,
                &parsed,
                &hash,
                &canonical,
                spec_value_id,
                visibility,
                outcome,
                pending,
            )
            .await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert_chunk(
        &self,
        req: &IngestRequest,
        campaign: &CampaignVariant,
        doc: &DocumentSource,
        row: &TableRow,
        parsed: &crate::normalize::ParsedSpec,
        hash: &str,
        canonical: &str,
        spec_value_id: SpecValueId,
        visibility: ChunkVisibility,
        outcome: &mut IngestOutcome,
        pending: &mut Vec<KnowledgeChunk>,
    ) -> KbResult<()> {
        if let Some(mut existing) = self.repos.chunks().find_by_content_hash(req.tenant, hash).await? {
            existing.metadata.merge_parsed_spec_ids([spec_value_id.0]);
            self.repos.chunks().update_metadata_and_embedding(&existing).await?;
            outcome.chunks_deduped += 1;
            return Ok(());
        }

        let value_text = match &parsed.payload {
            SpecPayload::Numeric(n) => n.to_string(),
            SpecPayload::Text(t) => t.clone(),
        };
        let mut metadata = SpecRowMetadata {
            parent_category: row.parent_category.clone(),
            sub_category: row.sub_category.clone(),
            specification_type: parsed.display_name.clone(),
            value: value_text,
            unit: parsed.unit.clone(),
            variant_availability: parsed.variant_availability.clone(),
            source_doc_id: Some(doc.id.0),
            source_page: Some(parsed.source_page),
            line_number: Some(row.line_number),
            parsed_spec_ids: Vec::new(),
            extra: Default::default(),
        };
        metadata.parsed_spec_ids.push(spec_value_id.0);

        let chunk = KnowledgeChunk {
            id: kb_core::KnowledgeChunkId::new(),
            tenant_id: req.tenant,
            product_id: req.product,
            campaign_variant_id: Some(campaign.id),
            chunk_type: ChunkType::SpecRow,
            text: canonical.to_string(),
            metadata: ChunkMetadata::SpecRow(metadata),
            embedding_vector: None,
            embedding_model: None,
            embedding_version: None,
            content_hash: Some(hash.to_string()),
            completion_status: CompletionStatus::Incomplete,
            visibility,
        };
        self.repos.chunks().insert(&chunk).await?;
        outcome.chunks_new += 1;
        pending.push(chunk);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest_bullets(
        &self,
        req: &IngestRequest,
        campaign: &CampaignVariant,
        bullets: &[String],
        block_type: FeatureBlockType,
        chunk_type: ChunkType,
        shareability: Shareability,
        visibility: ChunkVisibility,
        outcome: &mut IngestOutcome,
        pending: &mut Vec<KnowledgeChunk>,
    ) -> KbResult<()> {
        for (priority, body) in bullets.iter().enumerate() {
            let block = FeatureBlock {
                id: kb_core::FeatureBlockId::new(),
                tenant_id: req.tenant,
                product_id: req.product,
                campaign_variant_id: Some(campaign.id),
                block_type,
                body: body.clone(),
                priority: priority as i32,
                tags: Vec::new(),
                shareability,
                embedding_vector: None,
            };
            self.repos.feature_blocks().create(&block).await?;
            outcome.feature_blocks_written += 1;

            let hash = content_hash(body);
            if self.repos.chunks().find_by_content_hash(req.tenant, &hash).await?.is_some() {
                outcome.chunks_deduped += 1;
                continue;
            }

            let chunk = KnowledgeChunk {
                id: kb_core::KnowledgeChunkId::new(),
                tenant_id: req.tenant,
                product_id: req.product,
                campaign_variant_id: Some(campaign.id),
                chunk_type,
                text: body.clone(),
                metadata: ChunkMetadata::FreeForm(Default::default()),
                embedding_vector: None,
                embedding_model: None,
                embedding_version: None,
                content_hash: Some(hash),
                completion_status: CompletionStatus::Incomplete,
                visibility,
            };
            self.repos.chunks().insert(&chunk).await?;
            outcome.chunks_new += 1;
            pending.push(chunk);
        }
        Ok(())
    }

    /// Embeds `pending` in batches of [`EMBED_BATCH_SIZE`]. A batch that
    /// fails with a transient dependency error leaves its chunks
    /// `incomplete` (picked up later by the retry sweep) without aborting
    /// the job; a dimension mismatch is fatal and aborts it (invariant I4).
    async fn embed_pending(&self, pending: &mut [KnowledgeChunk], outcome: &mut IngestOutcome) -> KbResult<()> {
        for batch in pending.chunks_mut(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let request = EmbeddingRequest {
                model: self.embedding_model.clone(),
                version: self.embedding_version.clone(),
                texts,
            };
            match self.embedder.embed(request).await {
                Ok(EmbeddingBatch { model, version, vectors, .. }) => {
                    let mut entries = Vec::with_capacity(batch.len());
                    for (chunk, vector) in batch.iter_mut().zip(vectors.into_iter()) {
                        chunk.embedding_vector = Some(vector.clone());
                        chunk.embedding_model = Some(model.clone());
                        chunk.embedding_version = Some(version.clone());
                        chunk.completion_status = CompletionStatus::Complete;
                        self.repos.chunks().update_metadata_and_embedding(chunk).await?;
                        entries.push(VectorEntry {
                            chunk_id: chunk.id,
                            tenant_id: chunk.tenant_id,
                            product_id: chunk.product_id,
                            campaign_variant_id: chunk.campaign_variant_id,
                            chunk_type: chunk.chunk_type,
                            model: model.clone(),
                            version: version.clone(),
                            vector,
                        });
                    }
                    self.vectors.upsert(entries).await?;
                }
                Err(err @ KbError::Dimension(_)) => return Err(err),
                Err(err) => {
                    warn!(error = %err, batch_size = batch.len(), "embedding batch failed, leaving chunks incomplete for retry");
                    outcome.chunks_incomplete += batch.len() as u64;
                }
            }
        }
        Ok(())
    }
}

fn default_shareability(product: &Product) -> Shareability {
    if product.is_public_benchmark {
        Shareability::Public
    } else {
        Shareability::Tenant
    }
}

fn default_visibility(product: &Product) -> ChunkVisibility {
    if product.is_public_benchmark {
        ChunkVisibility::Benchmark
    } else {
        ChunkVisibility::Private
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kb_core::{
        DocumentSourceId, IngestionJobId, KnowledgeChunkId, LineageAction, LineageEvent, LineageEventId,
        SpecCategory, SpecCategoryId, SpecDataType, SpecItem, SpecItemId, SpecViewRow,
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
        async fn create(&self, product: &Product) -> KbResult<()> {
            self.products.lock().unwrap().push(product.clone());
            Ok(())
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
        async fn get_by_name(&self, _tenant: TenantId, name: &str) -> KbResult<Option<Product>> {
            Ok(self.products.lock().unwrap().iter().find(|p| p.name == name).cloned())
        }
        async fn list(&self, _tenant: TenantId) -> KbResult<Vec<Product>> {
            Ok(self.products.lock().unwrap().clone())
        }
        async fn list_comparable(&self, _tenant: TenantId, _product: ProductId) -> KbResult<Vec<Product>> {
            Ok(Vec::new())
        }
        async fn set_default_campaign_variant(
            &self,
            _tenant: TenantId,
            product: ProductId,
            campaign_variant: Option<CampaignVariantId>,
        ) -> KbResult<()> {
            if let Some(p) = self.products.lock().unwrap().iter_mut().find(|p| p.id == product) {
                p.default_campaign_variant_id = campaign_variant;
            }
            Ok(())
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
        async fn create_draft(&self, variant: &CampaignVariant) -> KbResult<()> {
            self.variants.lock().unwrap().push(variant.clone());
            Ok(())
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
                .find(|v| v.product_id == product && v.locale == locale && v.status == CampaignStatus::Draft)
                .cloned())
        }
        async fn find_published(
            &self,
            _tenant: TenantId,
            _product: ProductId,
            _locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Option<CampaignVariant>> {
            Ok(None)
        }
        async fn find_latest_archived(
            &self,
            _tenant: TenantId,
            _product: ProductId,
            _locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Option<CampaignVariant>> {
            Ok(None)
        }
        async fn list_published(&self, _tenant: TenantId) -> KbResult<Vec<CampaignVariant>> {
            Ok(Vec::new())
        }
        async fn set_status(
            &self,
            _id: CampaignVariantId,
            _status: CampaignStatus,
            _version: i32,
            _effective_from: Option<chrono::DateTime<Utc>>,
            _effective_through: Option<chrono::DateTime<Utc>>,
        ) -> KbResult<()> {
            Ok(())
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
    struct FakeDocuments {
        docs: Mutex<Vec<DocumentSource>>,
    }

    #[async_trait]
    impl DocumentSourceRepository for FakeDocuments {
        async fn create(&self, doc: &DocumentSource) -> KbResult<()> {
            self.docs.lock().unwrap().push(doc.clone());
            Ok(())
        }
        async fn find_by_hash(&self, _tenant: TenantId, sha256: &str) -> KbResult<Option<DocumentSource>> {
            Ok(self.docs.lock().unwrap().iter().find(|d| d.sha256 == sha256).cloned())
        }
        async fn get(&self, _tenant: TenantId, id: DocumentSourceId) -> KbResult<DocumentSource> {
            self.docs
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("document source".to_string()))
        }
        async fn list_for_product(&self, _tenant: TenantId, product: ProductId) -> KbResult<Vec<DocumentSource>> {
            Ok(self.docs.lock().unwrap().iter().filter(|d| d.product_id == product).cloned().collect())
        }
    }

    #[derive(Default)]
    struct FakeSpecCatalog {
        categories: Mutex<Vec<SpecCategory>>,
        items: Mutex<Vec<SpecItem>>,
    }

    #[async_trait]
    impl SpecCatalogRepository for FakeSpecCatalog {
        async fn find_or_create_category(&self, name: &str) -> KbResult<SpecCategory> {
            let mut categories = self.categories.lock().unwrap();
            if let Some(existing) = categories.iter().find(|c| c.name == name) {
                return Ok(existing.clone());
            }
            let category = SpecCategory { id: SpecCategoryId::new(), name: name.to_string(), display_order: categories.len() as i32 };
            categories.push(category.clone());
            Ok(category)
        }
        async fn find_or_create_item(
            &self,
            category_id: SpecCategoryId,
            display_name: &str,
            _aliases_hint: &[String],
        ) -> KbResult<SpecItem> {
            let mut items = self.items.lock().unwrap();
            if let Some(existing) = items.iter().find(|i| i.category_id == category_id && i.display_name == display_name) {
                return Ok(existing.clone());
            }
            let item = SpecItem {
                id: SpecItemId::new(),
                category_id,
                display_name: display_name.to_string(),
                unit: None,
                data_type: SpecDataType::Text,
                aliases: Vec::new(),
            };
            items.push(item.clone());
            Ok(item)
        }
        async fn get_item(&self, id: SpecItemId) -> KbResult<SpecItem> {
            self.items
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("spec item".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeSpecValues {
        values: Mutex<Vec<SpecValue>>,
    }

    #[async_trait]
    impl SpecValueRepository for FakeSpecValues {
        async fn upsert(&self, value: &SpecValue) -> KbResult<SpecValueId> {
            self.values.lock().unwrap().push(value.clone());
            Ok(value.id)
        }
        async fn get(&self, _tenant: TenantId, id: SpecValueId) -> KbResult<SpecValue> {
            self.values
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("spec value".to_string()))
        }
        async fn spec_view(
            &self,
            _tenant: TenantId,
            _products: &[ProductId],
            _campaign_variant: CampaignVariantId,
        ) -> KbResult<Vec<SpecViewRow>> {
            Ok(Vec::new())
        }
        async fn active_for_published(&self, _tenant: TenantId, _product: ProductId) -> KbResult<Vec<SpecValue>> {
            Ok(Vec::new())
        }
        async fn find_conflicts(&self, _tenant: TenantId, _product: ProductId) -> KbResult<Vec<Vec<SpecValue>>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeFeatureBlocks {
        blocks: Mutex<Vec<FeatureBlock>>,
    }

    #[async_trait]
    impl FeatureBlockRepository for FakeFeatureBlocks {
        async fn create(&self, block: &FeatureBlock) -> KbResult<()> {
            self.blocks.lock().unwrap().push(block.clone());
            Ok(())
        }
        async fn list_for_variant(&self, _tenant: TenantId, campaign_variant: CampaignVariantId) -> KbResult<Vec<FeatureBlock>> {
            Ok(self
                .blocks
                .lock()
                .unwrap()
                .iter()
                .filter(|b| b.campaign_variant_id == Some(campaign_variant))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeChunks {
        chunks: Mutex<Vec<KnowledgeChunk>>,
    }

    #[async_trait]
    impl KnowledgeChunkRepository for FakeChunks {
        async fn find_by_content_hash(&self, _tenant: TenantId, hash: &str) -> KbResult<Option<KnowledgeChunk>> {
            Ok(self.chunks.lock().unwrap().iter().find(|c| c.content_hash.as_deref() == Some(hash)).cloned())
        }
        async fn insert(&self, chunk: &KnowledgeChunk) -> KbResult<()> {
            self.chunks.lock().unwrap().push(chunk.clone());
            Ok(())
        }
        async fn update_metadata_and_embedding(&self, chunk: &KnowledgeChunk) -> KbResult<()> {
            let mut chunks = self.chunks.lock().unwrap();
            if let Some(existing) = chunks.iter_mut().find(|c| c.id == chunk.id) {
                *existing = chunk.clone();
            }
            Ok(())
        }
        async fn get(&self, _tenant: TenantId, id: KnowledgeChunkId) -> KbResult<KnowledgeChunk> {
            self.chunks
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("knowledge chunk".to_string()))
        }
        async fn list_for_tenant(&self, _tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>> {
            Ok(self.chunks.lock().unwrap().clone())
        }
        async fn list_incomplete(&self, _tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>> {
            Ok(self
                .chunks
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.completion_status != CompletionStatus::Complete)
                .cloned()
                .collect())
        }
        async fn list_embedding_versions(&self, _tenant: TenantId) -> KbResult<Vec<(Option<String>, Option<String>, i64)>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeJobs {
        jobs: Mutex<Vec<IngestionJob>>,
    }

    #[async_trait]
    impl IngestionJobRepository for FakeJobs {
        async fn create(&self, job: &IngestionJob) -> KbResult<()> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }
        async fn set_status(&self, id: IngestionJobId, status: JobStatus, error_payload: Option<serde_json::Value>) -> KbResult<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
                job.status = status;
                job.error_payload = error_payload;
            }
            Ok(())
        }
        async fn get(&self, _tenant: TenantId, id: IngestionJobId) -> KbResult<IngestionJob> {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| j.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("ingestion job".to_string()))
        }
        async fn find_running(&self, _tenant: TenantId, _product: ProductId, campaign: CampaignVariantId) -> KbResult<Option<IngestionJob>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| j.campaign_variant_id == campaign && j.status == JobStatus::Running)
                .cloned())
        }
    }

    #[derive(Default)]
    struct FakeLineage {
        events: Mutex<Vec<(String, LineageAction)>>,
    }

    #[async_trait]
    impl LineageRepository for FakeLineage {
        async fn append(
            &self,
            _tenant: TenantId,
            resource_type: &str,
            resource_id: &str,
            action: LineageAction,
            _payload: serde_json::Value,
        ) -> KbResult<LineageEventId> {
            self.events.lock().unwrap().push((format!("{resource_type}:{resource_id}"), action));
            Ok(LineageEventId::new())
        }
        async fn list_for_resource(&self, _tenant: TenantId, _resource_type: &str, _resource_id: &str) -> KbResult<Vec<LineageEvent>> {
            Ok(Vec::new())
        }
    }

    struct FakeRepos {
        products: FakeProducts,
        campaigns: FakeCampaigns,
        documents: FakeDocuments,
        spec_catalog: FakeSpecCatalog,
        spec_values: FakeSpecValues,
        feature_blocks: FakeFeatureBlocks,
        chunks: FakeChunks,
        jobs: FakeJobs,
        lineage: FakeLineage,
    }

    impl Repositories for FakeRepos {
        fn tenants(&self) -> &dyn TenantRepository {
            unimplemented!("not exercised by ingestion tests")
        }
        fn products(&self) -> &dyn ProductRepository {
            &self.products
        }
        fn campaigns(&self) -> &dyn CampaignVariantRepository {
            &self.campaigns
        }
        fn documents(&self) -> &dyn DocumentSourceRepository {
            &self.documents
        }
        fn spec_catalog(&self) -> &dyn SpecCatalogRepository {
            &self.spec_catalog
        }
        fn spec_values(&self) -> &dyn SpecValueRepository {
            &self.spec_values
        }
        fn feature_blocks(&self) -> &dyn FeatureBlockRepository {
            &self.feature_blocks
        }
        fn chunks(&self) -> &dyn KnowledgeChunkRepository {
            &self.chunks
        }
        fn comparisons(&self) -> &dyn ComparisonRepository {
            unimplemented!("not exercised by ingestion tests")
        }
        fn jobs(&self) -> &dyn IngestionJobRepository {
            &self.jobs
        }
        fn lineage(&self) -> &dyn LineageRepository {
            &self.lineage
        }
        fn drift(&self) -> &dyn DriftRepository {
            unimplemented!("not exercised by ingestion tests")
        }
        fn purge(&self) -> &dyn PurgeRepository {
            unimplemented!("not exercised by ingestion tests")
        }
    }

    fn test_repos() -> (Arc<FakeRepos>, ProductId, TenantId) {
        let tenant = TenantId::new();
        let product_id = ProductId::new();
        let product = Product {
            id: product_id,
            tenant_id: tenant,
            name: "Camry".to_string(),
            segment: None,
            body_type: None,
            model_year: Some(2024),
            is_public_benchmark: false,
            default_campaign_variant_id: None,
            metadata: serde_json::json!({}),
        };
        let repos = Arc::new(FakeRepos {
            products: FakeProducts { products: Mutex::new(vec![product]) },
            campaigns: FakeCampaigns::default(),
            documents: FakeDocuments::default(),
            spec_catalog: FakeSpecCatalog::default(),
            spec_values: FakeSpecValues::default(),
            feature_blocks: FakeFeatureBlocks::default(),
            chunks: FakeChunks::default(),
            jobs: FakeJobs::default(),
            lineage: FakeLineage::default(),
        });
        (repos, product_id, tenant)
    }

    const SAMPLE_MARKDOWN: &str = "---\ndomain: automotive\nmake: Toyota\nmodel: Camry\n---\n\
        # Page 1\n\
        ## Specifications\n\
        | Category | Specification | Value |\n\
        |---|---|---|\n\
        | Engine | Displacement | 2.487 L |\n\
        | | Fuel Efficiency | 25.49 km/l |\n\
        ## Key Features\n\
        - Android Auto\n\
        - Wireless charging\n\
        ## USPs\n\
        - Toyota Safety Sense 3.0\n";

    fn pipeline(repos: Arc<FakeRepos>) -> IngestionPipeline {
        IngestionPipeline::new(
            repos as Arc<dyn Repositories>,
            Arc::new(StubEmbeddingProvider::new(16)),
            Arc::new(InMemoryVectorAdapter::new()),
            "stub-embedding",
            "v1",
        )
    }

    fn base_request(product: ProductId, tenant: TenantId) -> IngestRequest {
        IngestRequest {
            tenant,
            product,
            locale: "en-US".to_string(),
            trim: None,
            market: None,
            markdown: SAMPLE_MARKDOWN.to_string(),
            source_uri: "s3://brochures/camry.md".to_string(),
            extractor_version: Some("extractor-1".to_string()),
            overwrite: false,
        }
    }

    #[tokio::test]
    async fn ingest_creates_draft_spec_values_and_feature_blocks() {
        let (repos, product, tenant) = test_repos();
        let pipeline = pipeline(repos.clone());

        let outcome = pipeline.ingest(base_request(product, tenant)).await.unwrap();

        assert_eq!(outcome.spec_values_written, 2);
        assert_eq!(outcome.feature_blocks_written, 3);
        assert_eq!(outcome.chunks_new, 5);
        assert_eq!(outcome.chunks_deduped, 0);
        assert!(outcome.campaign_variant_id.is_some());

        let chunks = repos.chunks.chunks.lock().unwrap();
        assert!(chunks.iter().all(|c| c.completion_status == CompletionStatus::Complete));
    }

    #[tokio::test]
    async fn reingesting_identical_document_without_overwrite_is_a_conflict() {
        let (repos, product, tenant) = test_repos();
        let pipeline = pipeline(repos.clone());

        pipeline.ingest(base_request(product, tenant)).await.unwrap();
        let err = pipeline.ingest(base_request(product, tenant)).await.unwrap_err();
        assert!(matches!(err, KbError::Conflict(_)));
    }

    #[tokio::test]
    async fn reingesting_with_overwrite_dedups_unchanged_rows_by_content_hash() {
        let (repos, product, tenant) = test_repos();
        let pipeline = pipeline(repos.clone());

        pipeline.ingest(base_request(product, tenant)).await.unwrap();
        let mut second = base_request(product, tenant);
        second.overwrite = true;
        let outcome = pipeline.ingest(second).await.unwrap();

        assert_eq!(outcome.chunks_new, 0, "identical rows should dedup by content hash, not recreate chunks");
        assert_eq!(outcome.chunks_deduped, 5);
    }
}

