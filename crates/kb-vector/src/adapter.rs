use async_trait::async_trait;
use kb_core::{CampaignVariantId, ChunkType, KbResult, KnowledgeChunkId, ProductId, TenantId};

/// One vector with enough metadata to filter and rank it (spec §4.5).
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk_id: KnowledgeChunkId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub campaign_variant_id: Option<CampaignVariantId>,
    pub chunk_type: ChunkType,
    pub model: String,
    pub version: String,
    pub vector: Vec<f32>,
}

/// Narrows a search (or a `load_all` rehydration) to one tenant's scope.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub tenant_id: Option<TenantId>,
    pub product_ids: Vec<ProductId>,
    pub campaign_variant_id: Option<CampaignVariantId>,
    pub chunk_type: Option<ChunkType>,
}

impl VectorFilter {
    pub fn matches(&self, entry: &VectorEntry) -> bool {
        if let Some(tenant_id) = self.tenant_id {
            if entry.tenant_id != tenant_id {
                return false;
            }
        }
        if !self.product_ids.is_empty() && !self.product_ids.contains(&entry.product_id) {
            return false;
        }
        if let Some(campaign_variant_id) = self.campaign_variant_id {
            if entry.campaign_variant_id != Some(campaign_variant_id) {
                return false;
            }
        }
        if let Some(chunk_type) = self.chunk_type {
            if entry.chunk_type != chunk_type {
                return false;
            }
        }
        true
    }
}

/// A single ranked result from [`VectorAdapter::search`].
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub chunk_id: KnowledgeChunkId,
    pub similarity: f32,
}

/// Storage-agnostic ANN interface (spec §4.5): an in-memory flat index for
/// dev, a pgvector-backed index for production, searched the same way.
///
/// All vectors handled by one adapter instance share `(model, version,
/// dimension)` (invariant I4); an insert that disagrees with the pinned
/// triple returns `KbError::Dimension` rather than silently truncating or
/// padding.
#[async_trait]
pub trait VectorAdapter: Send + Sync {
    async fn insert(&self, entries: Vec<VectorEntry>) -> KbResult<()>;

    async fn upsert(&self, entries: Vec<VectorEntry>) -> KbResult<()>;

    async fn delete(&self, ids: &[KnowledgeChunkId]) -> KbResult<()>;

    /// `query_vector` must already be embedded with `(model, version)`;
    /// the adapter rejects a dimension that disagrees with what it has
    /// pinned. Returns up to `k` matches ordered by descending similarity.
    async fn search(
        &self,
        query_vector: &[f32],
        model: &str,
        version: &str,
        filter: &VectorFilter,
        k: usize,
    ) -> KbResult<Vec<VectorMatch>>;

    /// Replaces this adapter's contents with exactly `entries`. For the
    /// in-memory adapter this is the startup rehydration path (the index
    /// holds nothing until a caller reads `KnowledgeChunk`s back out of
    /// storage and hands them here); for a persistent backend it is a
    /// reconciling bulk upsert.
    async fn load_all(&self, entries: Vec<VectorEntry>) -> KbResult<()>;
}

/// L2-normalizes in place so that a dot product doubles as cosine
/// similarity (spec §4.5: "cosine similarity on L2-normalized vectors").
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
