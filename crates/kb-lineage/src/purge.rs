use kb_core::{KbResult, LineageAction, LineageEventId, TenantId};
use kb_storage::Repositories;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PurgeOutcome {
    pub counts: BTreeMap<String, u64>,
    pub lineage_id: LineageEventId,
}

/// `Purge {tenant}` (spec §6, §4.7): cascades the tenant-scoped delete
/// across all tenant-owned tables, then appends the `deleted` lineage
/// event the cascade itself cannot record (the tenant row, and every
/// row that referenced it, no longer exist to attach an event to).
pub struct PurgeOrchestrator {
    repos: Arc<dyn Repositories>,
}

impl PurgeOrchestrator {
    pub fn new(repos: Arc<dyn Repositories>) -> Self {
        Self { repos }
    }

    pub async fn purge(&self, tenant: TenantId) -> KbResult<PurgeOutcome> {
        let counts = self.repos.purge().purge_tenant(tenant).await?;

        let lineage_id = self
            .repos
            .lineage()
            .append(
                tenant,
                "tenant",
                &tenant.to_string(),
                LineageAction::Deleted,
                serde_json::json!({ "counts": counts }),
            )
            .await?;

        info!(tenant_id = %tenant, ?counts, "tenant purged");
        Ok(PurgeOutcome { counts, lineage_id })
    }
}
