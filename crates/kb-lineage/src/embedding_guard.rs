use kb_core::{CompletionStatus, DriftAlertType, KbResult, KnowledgeChunk, TenantId};
use kb_storage::Repositories;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default, Clone)]
pub struct EmbeddingGuardOutcome {
    pub mismatch_detected: bool,
    pub chunks_marked_for_reembed: u64,
}

/// Scans `KnowledgeChunks` for `(embedding_model, embedding_version)`
/// heterogeneity on boot and on provider switch (spec §4.7). Detected
/// heterogeneity opens an `embedding_version_mismatch` alert; the chunks
/// embedded under a version other than the majority are marked
/// `completion_status=retry_needed` so the existing incomplete-chunk
/// retry queue (the partial index on `completion_status≠complete`)
/// re-embeds them under the current version — there is no separate job
/// queue abstraction to enqueue into.
pub struct EmbeddingGuard {
    repos: Arc<dyn Repositories>,
}

impl EmbeddingGuard {
    pub fn new(repos: Arc<dyn Repositories>) -> Self {
        Self { repos }
    }

    pub async fn check(&self, tenant: TenantId) -> KbResult<EmbeddingGuardOutcome> {
        let versions = self.repos.chunks().list_embedding_versions(tenant).await?;
        if versions.len() <= 1 {
            return Ok(EmbeddingGuardOutcome::default());
        }

        let majority = versions
            .iter()
            .max_by_key(|(_, _, count)| *count)
            .map(|(model, version, _)| (model.clone(), version.clone()));

        warn!(tenant_id = %tenant, versions = ?versions, "embedding version heterogeneity detected");

        self.repos
            .drift()
            .open_alert(
                tenant,
                DriftAlertType::EmbeddingVersionMismatch,
                serde_json::json!({ "versions": versions.iter().map(|(m, v, c)| serde_json::json!({
                    "model": m, "version": v, "chunk_count": c,
                })).collect::<Vec<_>>() }),
            )
            .await?;

        let marked = self.mark_minority_for_reembed(tenant, majority).await?;

        info!(tenant_id = %tenant, marked, "queued minority-version chunks for re-embed");
        Ok(EmbeddingGuardOutcome { mismatch_detected: true, chunks_marked_for_reembed: marked })
    }

    async fn mark_minority_for_reembed(
        &self,
        tenant: TenantId,
        majority: Option<(Option<String>, Option<String>)>,
    ) -> KbResult<u64> {
        let chunks = self.repos.chunks().list_for_tenant(tenant).await?;
        let mut marked = 0;
        for chunk in chunks {
            let key = (chunk.embedding_model.clone(), chunk.embedding_version.clone());
            if Some(key) == majority || chunk.completion_status == CompletionStatus::RetryNeeded {
                continue;
            }
            let mut updated: KnowledgeChunk = chunk;
            updated.completion_status = CompletionStatus::RetryNeeded;
            self.repos.chunks().update_metadata_and_embedding(&updated).await?;
            marked += 1;
        }
        Ok(marked)
    }
}
