use crate::adapter::{dot, l2_normalize, VectorAdapter, VectorEntry, VectorFilter, VectorMatch};
use async_trait::async_trait;
use kb_core::{KbError, KbResult, KnowledgeChunkId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// The `(model, version, dimension)` triple pinned by the first insert
/// (invariant I4). Every later insert or search must agree with it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PinnedDimension {
    model: String,
    version: String,
    dimension: usize,
}

struct StoredEntry {
    entry: VectorEntry,
    normalized: Vec<f32>,
}

#[derive(Default)]
struct State {
    pinned: Option<PinnedDimension>,
    entries: HashMap<KnowledgeChunkId, StoredEntry>,
}

/// Dev/test vector adapter: flat O(N·d) scan over an in-memory map. Not
/// persistent — a caller must call [`VectorAdapter::load_all`] with the
/// chunks read back from storage before the first query after startup.
pub struct InMemoryVectorAdapter {
    state: RwLock<State>,
}

impl InMemoryVectorAdapter {
    pub fn new() -> Self {
        Self { state: RwLock::new(State::default()) }
    }

    fn check_dimension(pinned: &mut Option<PinnedDimension>, model: &str, version: &str, dimension: usize) -> KbResult<()> {
        match pinned {
            Some(p) => {
                if p.model != model || p.version != version || p.dimension != dimension {
                    return Err(KbError::Dimension(format!(
                        "expected ({}, {}, {}), got ({model}, {version}, {dimension})",
                        p.model, p.version, p.dimension
                    )));
                }
                Ok(())
            }
            None => {
                *pinned = Some(PinnedDimension { model: model.to_string(), version: version.to_string(), dimension });
                Ok(())
            }
        }
    }
}

impl Default for InMemoryVectorAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorAdapter for InMemoryVectorAdapter {
    async fn insert(&self, entries: Vec<VectorEntry>) -> KbResult<()> {
        let mut state = self.state.write().await;
        for entry in entries {
            Self::check_dimension(&mut state.pinned, &entry.model, &entry.version, entry.vector.len())?;
            let mut normalized = entry.vector.clone();
            l2_normalize(&mut normalized);
            state.entries.insert(entry.chunk_id, StoredEntry { entry, normalized });
        }
        Ok(())
    }

    async fn upsert(&self, entries: Vec<VectorEntry>) -> KbResult<()> {
        self.insert(entries).await
    }

    async fn delete(&self, ids: &[KnowledgeChunkId]) -> KbResult<()> {
        let mut state = self.state.write().await;
        for id in ids {
            state.entries.remove(id);
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        model: &str,
        version: &str,
        filter: &VectorFilter,
        k: usize,
    ) -> KbResult<Vec<VectorMatch>> {
        let state = self.state.read().await;
        if let Some(pinned) = &state.pinned {
            if pinned.model != model || pinned.version != version || pinned.dimension != query_vector.len() {
                return Err(KbError::Dimension(format!(
                    "query ({model}, {version}, {}) does not match pinned ({}, {}, {})",
                    query_vector.len(),
                    pinned.model,
                    pinned.version,
                    pinned.dimension
                )));
            }
        } else {
            return Ok(Vec::new());
        }

        let mut query = query_vector.to_vec();
        l2_normalize(&mut query);

        let mut scored: Vec<VectorMatch> = state
            .entries
            .values()
            .filter(|stored| filter.matches(&stored.entry))
            .map(|stored| VectorMatch { chunk_id: stored.entry.chunk_id, similarity: dot(&query, &stored.normalized) })
            .collect();

        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn load_all(&self, entries: Vec<VectorEntry>) -> KbResult<()> {
        let count = entries.len();
        let mut state = self.state.write().await;
        state.entries.clear();
        state.pinned = None;
        drop(state);
        if let Err(e) = self.insert(entries).await {
            warn!(error = %e, "load_all aborted on a mismatched vector, index left partially hydrated");
            return Err(e);
        }
        info!(count, "in-memory vector index hydrated from storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::{ChunkType, ProductId, TenantId};

    fn entry(id: KnowledgeChunkId, vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk_id: id,
            tenant_id: TenantId::new(),
            product_id: ProductId::new(),
            campaign_variant_id: None,
            chunk_type: ChunkType::Usp,
            model: "stub".to_string(),
            version: "v1".to_string(),
            vector,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let adapter = InMemoryVectorAdapter::new();
        let a = KnowledgeChunkId::new();
        let b = KnowledgeChunkId::new();
        adapter.insert(vec![entry(a, vec![1.0, 0.0]), entry(b, vec![0.0, 1.0])]).await.unwrap();

        let results = adapter
            .search(&[1.0, 0.0], "stub", "v1", &VectorFilter::default(), 10)
            .await
            .unwrap();

        assert_eq!(results[0].chunk_id, a);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn mismatched_dimension_is_rejected() {
        let adapter = InMemoryVectorAdapter::new();
        adapter.insert(vec![entry(KnowledgeChunkId::new(), vec![1.0, 0.0, 0.0])]).await.unwrap();

        let err = adapter.insert(vec![entry(KnowledgeChunkId::new(), vec![1.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err, KbError::Dimension(_)));
    }

    #[tokio::test]
    async fn mismatched_model_at_query_time_is_rejected() {
        let adapter = InMemoryVectorAdapter::new();
        adapter.insert(vec![entry(KnowledgeChunkId::new(), vec![1.0, 0.0])]).await.unwrap();

        let err = adapter
            .search(&[1.0, 0.0], "other-model", "v1", &VectorFilter::default(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Dimension(_)));
    }

    #[tokio::test]
    async fn filter_scopes_by_tenant() {
        let adapter = InMemoryVectorAdapter::new();
        let mut in_tenant = entry(KnowledgeChunkId::new(), vec![1.0, 0.0]);
        let tenant_id = in_tenant.tenant_id;
        let out_of_tenant = entry(KnowledgeChunkId::new(), vec![1.0, 0.0]);
        let wanted = in_tenant.chunk_id;
        in_tenant.vector = vec![1.0, 0.0];
        adapter.insert(vec![in_tenant, out_of_tenant]).await.unwrap();

        let filter = VectorFilter { tenant_id: Some(tenant_id), ..Default::default() };
        let results = adapter.search(&[1.0, 0.0], "stub", "v1", &filter, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, wanted);
    }

    #[tokio::test]
    async fn load_all_replaces_prior_contents() {
        let adapter = InMemoryVectorAdapter::new();
        adapter.insert(vec![entry(KnowledgeChunkId::new(), vec![1.0, 0.0])]).await.unwrap();

        let fresh_id = KnowledgeChunkId::new();
        adapter.load_all(vec![entry(fresh_id, vec![0.0, 1.0])]).await.unwrap();

        let results = adapter.search(&[0.0, 1.0], "stub", "v1", &VectorFilter::default(), 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, fresh_id);
    }
}
