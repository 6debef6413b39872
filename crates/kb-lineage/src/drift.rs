use chrono::{DateTime, Duration, Utc};
use kb_core::{DriftAlertType, KbResult, Plan, Tenant, TenantId};
use kb_storage::Repositories;
use std::sync::Arc;
use tracing::info;

/// Plan-tier SLA for campaign staleness: a published variant whose
/// `effective_from` is older than its tenant's threshold opens a
/// `stale_campaign` alert. Values are a design decision (spec §9 leaves
/// the numeric weights unspecified), not a documented requirement.
#[derive(Debug, Clone, Copy)]
pub struct StaleCampaignSla {
    pub sandbox: Duration,
    pub pro: Duration,
    pub enterprise: Duration,
}

impl Default for StaleCampaignSla {
    fn default() -> Self {
        Self {
            sandbox: Duration::days(14),
            pro: Duration::days(45),
            enterprise: Duration::days(120),
        }
    }
}

impl StaleCampaignSla {
    fn threshold_for(&self, plan: Plan) -> Duration {
        match plan {
            Plan::Sandbox => self.sandbox,
            Plan::Pro => self.pro,
            Plan::Enterprise => self.enterprise,
        }
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DriftOutcome {
    pub alerts_opened: u64,
    pub alerts_updated: u64,
}

/// Periodic job (spec §4.7) comparing `document_sources.sha256` history,
/// campaign age vs. plan-tier SLA, and active `SpecValue` conflicts;
/// opens `DriftAlert`s for whatever it finds.
pub struct DriftRunner {
    repos: Arc<dyn Repositories>,
    sla: StaleCampaignSla,
}

impl DriftRunner {
    pub fn new(repos: Arc<dyn Repositories>) -> Self {
        Self { repos, sla: StaleCampaignSla::default() }
    }

    pub fn with_sla(repos: Arc<dyn Repositories>, sla: StaleCampaignSla) -> Self {
        Self { repos, sla }
    }

    /// `Drift check {tenant?}` (spec §6). A `None` tenant sweeps every
    /// tenant in the system.
    pub async fn run(&self, tenant: Option<TenantId>) -> KbResult<DriftOutcome> {
        let tenants = match tenant {
            Some(id) => vec![self.repos.tenants().get(id).await?],
            None => self.repos.tenants().list().await?,
        };

        let mut outcome = DriftOutcome::default();
        for tenant in &tenants {
            outcome.alerts_opened += self.check_hash_changed(tenant.id).await?;
            outcome.alerts_opened += self.check_stale_campaigns(tenant).await?;
            outcome.alerts_opened += self.check_conflicts(tenant.id).await?;
        }
        info!(
            tenants = tenants.len(),
            alerts_opened = outcome.alerts_opened,
            "drift check completed"
        );
        Ok(outcome)
    }

    /// `hash_changed`: a product's two most recent uploads carry
    /// different `sha256`, meaning the source brochure changed without a
    /// corresponding re-ingest yet landing in a published variant.
    async fn check_hash_changed(&self, tenant: TenantId) -> KbResult<u64> {
        let mut opened = 0;
        for product in self.repos.products().list(tenant).await? {
            let uploads = self.repos.documents().list_for_product(tenant, product.id).await?;
            let Some((latest, previous)) = uploads.split_first().and_then(|(l, rest)| rest.first().map(|p| (l, p))) else {
                continue;
            };
            if latest.sha256 != previous.sha256 {
                self.repos
                    .drift()
                    .open_alert(
                        tenant,
                        DriftAlertType::HashChanged,
                        serde_json::json!({
                            "product_id": product.id,
                            "latest_document_source_id": latest.id,
                            "previous_document_source_id": previous.id,
                        }),
                    )
                    .await?;
                opened += 1;
            }
        }
        Ok(opened)
    }

    /// `stale_campaign`: a published variant older than its tenant's
    /// plan-tier SLA.
    async fn check_stale_campaigns(&self, tenant: &Tenant) -> KbResult<u64> {
        let threshold = self.sla.threshold_for(tenant.plan);
        let now = Utc::now();
        let mut opened = 0;
        for variant in self.repos.campaigns().list_published(tenant.id).await? {
            let Some(effective_from) = variant.effective_from else { continue };
            if is_stale(effective_from, now, threshold) {
                self.repos
                    .drift()
                    .open_alert(
                        tenant.id,
                        DriftAlertType::StaleCampaign,
                        serde_json::json!({
                            "campaign_variant_id": variant.id,
                            "product_id": variant.product_id,
                            "effective_from": effective_from,
                            "plan": tenant.plan,
                        }),
                    )
                    .await?;
                opened += 1;
            }
        }
        Ok(opened)
    }

    /// `conflict_detected`: multiple active `SpecValue`s for the same
    /// item with divergent values on the same product.
    async fn check_conflicts(&self, tenant: TenantId) -> KbResult<u64> {
        let mut opened = 0;
        for product in self.repos.products().list(tenant).await? {
            let conflicts = self.repos.spec_values().find_conflicts(tenant, product.id).await?;
            for group in conflicts {
                let ids: Vec<_> = group.iter().map(|v| v.id).collect();
                self.repos
                    .drift()
                    .open_alert(
                        tenant,
                        DriftAlertType::ConflictDetected,
                        serde_json::json!({
                            "product_id": product.id,
                            "spec_value_ids": ids,
                        }),
                    )
                    .await?;
                opened += 1;
            }
        }
        Ok(opened)
    }
}

fn is_stale(effective_from: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    now.signed_duration_since(effective_from) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stale_threshold_scales_with_plan() {
        let sla = StaleCampaignSla::default();
        assert!(sla.threshold_for(Plan::Sandbox) < sla.threshold_for(Plan::Pro));
        assert!(sla.threshold_for(Plan::Pro) < sla.threshold_for(Plan::Enterprise));
    }

    #[test]
    fn is_stale_respects_threshold() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let recent = now - Duration::days(1);
        let old = now - Duration::days(100);
        assert!(!is_stale(recent, now, Duration::days(14)));
        assert!(is_stale(old, now, Duration::days(14)));
    }
}
