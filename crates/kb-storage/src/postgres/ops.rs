//! Ingestion jobs, lineage, drift alerts, and tenant purge: the
//! operational aggregates that don't carry enough surface area to
//! justify their own module each (spec §4.2, §4.7).

use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::{DriftRepository, IngestionJobRepository, LineageRepository, PurgeRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kb_core::{
    CampaignVariantId, DriftAlert, DriftAlertId, DriftAlertStatus, DriftAlertType, IngestionJob,
    IngestionJobId, JobStatus, KbResult, LineageAction, LineageEvent, LineageEventId, ProductId,
    TenantId,
};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;

#[derive(FromRow)]
struct JobRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    product_id: uuid::Uuid,
    campaign_variant_id: uuid::Uuid,
    status: String,
    error_payload: Option<JsonValue>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Failed => "failed",
        JobStatus::Succeeded => "succeeded",
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "failed" => JobStatus::Failed,
        "succeeded" => JobStatus::Succeeded,
        _ => JobStatus::Pending,
    }
}

impl From<JobRow> for IngestionJob {
    fn from(r: JobRow) -> Self {
        IngestionJob {
            id: IngestionJobId(r.id),
            tenant_id: TenantId(r.tenant_id),
            product_id: ProductId(r.product_id),
            campaign_variant_id: CampaignVariantId(r.campaign_variant_id),
            status: parse_job_status(&r.status),
            error_payload: r.error_payload,
            started_at: r.started_at,
            completed_at: r.completed_at,
        }
    }
}

pub struct PgIngestionJobRepository {
    pool: PgPool,
}

impl PgIngestionJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IngestionJobRepository for PgIngestionJobRepository {
    async fn create(&self, job: &IngestionJob) -> KbResult<()> {
        sqlx::query(
            r#"INSERT INTO ingestion_jobs
                 (id, tenant_id, product_id, campaign_variant_id, status, error_payload,
                  started_at, completed_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8)"#,
        )
        .bind(job.id.0)
        .bind(job.tenant_id.0)
        .bind(job.product_id.0)
        .bind(job.campaign_variant_id.0)
        .bind(job_status_str(job.status))
        .bind(&job.error_payload)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create ingestion job", e))?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: IngestionJobId,
        status: JobStatus,
        error_payload: Option<JsonValue>,
    ) -> KbResult<()> {
        let is_terminal = matches!(status, JobStatus::Succeeded | JobStatus::Failed);
        sqlx::query(
            r#"UPDATE ingestion_jobs
                  SET status = $1, error_payload = $2,
                      started_at = COALESCE(started_at, CASE WHEN $1 = 'running' THEN now() END),
                      completed_at = CASE WHEN $3 THEN now() ELSE completed_at END
                WHERE id = $4"#,
        )
        .bind(job_status_str(status))
        .bind(&error_payload)
        .bind(is_terminal)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("update ingestion job status", e))?;
        Ok(())
    }

    async fn get(&self, tenant: TenantId, id: IngestionJobId) -> KbResult<IngestionJob> {
        let row: JobRow = sqlx::query_as(
            r#"SELECT id, tenant_id, product_id, campaign_variant_id, status, error_payload,
                      started_at, completed_at
                 FROM ingestion_jobs WHERE tenant_id = $1 AND id = $2"#,
        )
        .bind(tenant.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get ingestion job", e))?
        .ok_or_else(|| not_found(format!("ingestion job {id}")))?;
        Ok(row.into())
    }

    async fn find_running(
        &self,
        tenant: TenantId,
        product: ProductId,
        campaign: CampaignVariantId,
    ) -> KbResult<Option<IngestionJob>> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, product_id, campaign_variant_id, status, error_payload,
                      started_at, completed_at
                 FROM ingestion_jobs
                WHERE tenant_id = $1 AND product_id = $2 AND campaign_variant_id = $3
                  AND status IN ('pending', 'running')
                ORDER BY started_at DESC NULLS FIRST LIMIT 1"#,
        )
        .bind(tenant.0)
        .bind(product.0)
        .bind(campaign.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("find running ingestion job", e))?;
        Ok(row.map(Into::into))
    }
}

#[derive(FromRow)]
struct LineageRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    resource_type: String,
    resource_id: String,
    action: String,
    payload: JsonValue,
    occurred_at: DateTime<Utc>,
}

fn lineage_action_str(a: LineageAction) -> &'static str {
    match a {
        LineageAction::Created => "created",
        LineageAction::Updated => "updated",
        LineageAction::Deleted => "deleted",
        LineageAction::Reconciled => "reconciled",
    }
}

fn parse_lineage_action(s: &str) -> LineageAction {
    match s {
        "updated" => LineageAction::Updated,
        "deleted" => LineageAction::Deleted,
        "reconciled" => LineageAction::Reconciled,
        _ => LineageAction::Created,
    }
}

impl From<LineageRow> for LineageEvent {
    fn from(r: LineageRow) -> Self {
        LineageEvent {
            id: LineageEventId(r.id),
            tenant_id: TenantId(r.tenant_id),
            resource_type: r.resource_type,
            resource_id: r.resource_id,
            action: parse_lineage_action(&r.action),
            payload: r.payload,
            occurred_at: r.occurred_at,
        }
    }
}

pub struct PgLineageRepository {
    pool: PgPool,
}

impl PgLineageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LineageRepository for PgLineageRepository {
    async fn append(
        &self,
        tenant: TenantId,
        resource_type: &str,
        resource_id: &str,
        action: LineageAction,
        payload: JsonValue,
    ) -> KbResult<LineageEventId> {
        let id = uuid::Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO lineage_events
                 (id, tenant_id, resource_type, resource_id, action, payload, occurred_at)
               VALUES ($1, $2, $3, $4, $5, $6, now())"#,
        )
        .bind(id)
        .bind(tenant.0)
        .bind(resource_type)
        .bind(resource_id)
        .bind(lineage_action_str(action))
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("append lineage event", e))?;
        Ok(LineageEventId(id))
    }

    async fn list_for_resource(
        &self,
        tenant: TenantId,
        resource_type: &str,
        resource_id: &str,
    ) -> KbResult<Vec<LineageEvent>> {
        let rows: Vec<LineageRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, resource_type, resource_id, action, payload, occurred_at
                 FROM lineage_events
                WHERE tenant_id = $1 AND resource_type = $2 AND resource_id = $3
                ORDER BY occurred_at"#,
        )
        .bind(tenant.0)
        .bind(resource_type)
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list lineage events for resource", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(FromRow)]
struct DriftAlertRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    alert_type: String,
    status: String,
    detected_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    details: JsonValue,
}

fn alert_type_str(t: DriftAlertType) -> &'static str {
    match t {
        DriftAlertType::StaleCampaign => "stale_campaign",
        DriftAlertType::ConflictDetected => "conflict_detected",
        DriftAlertType::HashChanged => "hash_changed",
        DriftAlertType::EmbeddingVersionMismatch => "embedding_version_mismatch",
    }
}

fn parse_alert_type(s: &str) -> DriftAlertType {
    match s {
        "conflict_detected" => DriftAlertType::ConflictDetected,
        "hash_changed" => DriftAlertType::HashChanged,
        "embedding_version_mismatch" => DriftAlertType::EmbeddingVersionMismatch,
        _ => DriftAlertType::StaleCampaign,
    }
}

fn alert_status_str(s: DriftAlertStatus) -> &'static str {
    match s {
        DriftAlertStatus::Open => "open",
        DriftAlertStatus::Acknowledged => "acknowledged",
        DriftAlertStatus::Resolved => "resolved",
    }
}

fn parse_alert_status(s: &str) -> DriftAlertStatus {
    match s {
        "acknowledged" => DriftAlertStatus::Acknowledged,
        "resolved" => DriftAlertStatus::Resolved,
        _ => DriftAlertStatus::Open,
    }
}

impl From<DriftAlertRow> for DriftAlert {
    fn from(r: DriftAlertRow) -> Self {
        DriftAlert {
            id: DriftAlertId(r.id),
            tenant_id: TenantId(r.tenant_id),
            alert_type: parse_alert_type(&r.alert_type),
            status: parse_alert_status(&r.status),
            detected_at: r.detected_at,
            resolved_at: r.resolved_at,
            details: r.details,
        }
    }
}

pub struct PgDriftRepository {
    pool: PgPool,
}

impl PgDriftRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriftRepository for PgDriftRepository {
    async fn open_alert(
        &self,
        tenant: TenantId,
        alert_type: DriftAlertType,
        details: JsonValue,
    ) -> KbResult<DriftAlertId> {
        let id = uuid::Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO drift_alerts (id, tenant_id, alert_type, status, detected_at, details)
               VALUES ($1, $2, $3, 'open', now(), $4)"#,
        )
        .bind(id)
        .bind(tenant.0)
        .bind(alert_type_str(alert_type))
        .bind(&details)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("open drift alert", e))?;
        Ok(DriftAlertId(id))
    }

    async fn list(&self, tenant: TenantId, status: Option<DriftAlertStatus>) -> KbResult<Vec<DriftAlert>> {
        let status_filter = status.map(alert_status_str);
        let rows: Vec<DriftAlertRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, alert_type, status, detected_at, resolved_at, details
                 FROM drift_alerts
                WHERE tenant_id = $1 AND ($2::text IS NULL OR status = $2)
                ORDER BY detected_at DESC"#,
        )
        .bind(tenant.0)
        .bind(status_filter)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list drift alerts", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_status(&self, id: DriftAlertId, status: DriftAlertStatus) -> KbResult<()> {
        sqlx::query(
            r#"UPDATE drift_alerts
                  SET status = $1, resolved_at = CASE WHEN $1 = 'resolved' THEN now() ELSE resolved_at END
                WHERE id = $2"#,
        )
        .bind(alert_status_str(status))
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("update drift alert status", e))?;
        Ok(())
    }
}

pub struct PgPurgeRepository {
    pool: PgPool,
}

impl PgPurgeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Deletion order respects foreign keys: children before parents. Every
/// table here is tenant-scoped per invariant I1.
const PURGE_TABLES: &[&str] = &[
    "comparison_rows",
    "knowledge_chunks",
    "feature_blocks",
    "spec_values",
    "drift_alerts",
    "lineage_events",
    "ingestion_jobs",
    "document_sources",
    "campaign_variants",
    "products",
];

#[async_trait]
impl PurgeRepository for PgPurgeRepository {
    async fn purge_tenant(&self, tenant: TenantId) -> KbResult<BTreeMap<String, u64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_err("begin purge transaction", e))?;
        let mut counts = BTreeMap::new();
        for table in PURGE_TABLES {
            let clause = if *table == "comparison_rows" {
                // comparison_rows has no tenant_id column; it is scoped
                // transitively through products, which are deleted last.
                format!(
                    "DELETE FROM comparison_rows WHERE primary_product_id IN \
                     (SELECT id FROM products WHERE tenant_id = $1) \
                     OR secondary_product_id IN (SELECT id FROM products WHERE tenant_id = $1)"
                )
            } else {
                format!("DELETE FROM {table} WHERE tenant_id = $1")
            };
            let result = sqlx::query(&clause)
                .bind(tenant.0)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_err("purge tenant table", e))?;
            counts.insert((*table).to_string(), result.rows_affected());
        }
        sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("purge tenant row", e))?;
        tx.commit().await.map_err(|e| map_sqlx_err("commit purge transaction", e))?;
        Ok(counts)
    }
}
