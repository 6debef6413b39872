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
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;

fn parse_uuid(s: &str, what: &str) -> Result<uuid::Uuid, kb_core::KbError> {
    uuid::Uuid::parse_str(s).map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode {what}: {e}")))
}

#[derive(FromRow)]
struct JobRow {
    id: String,
    tenant_id: String,
    product_id: String,
    campaign_variant_id: String,
    status: String,
    error_payload: Option<String>,
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

impl TryFrom<JobRow> for IngestionJob {
    type Error = kb_core::KbError;

    fn try_from(r: JobRow) -> Result<Self, Self::Error> {
        Ok(IngestionJob {
            id: IngestionJobId(parse_uuid(&r.id, "ingestion job id")?),
            tenant_id: TenantId(parse_uuid(&r.tenant_id, "tenant id")?),
            product_id: ProductId(parse_uuid(&r.product_id, "product id")?),
            campaign_variant_id: CampaignVariantId(parse_uuid(&r.campaign_variant_id, "campaign variant id")?),
            status: parse_job_status(&r.status),
            error_payload: r.error_payload.and_then(|s| serde_json::from_str(&s).ok()),
            started_at: r.started_at,
            completed_at: r.completed_at,
        })
    }
}

pub struct SqliteIngestionJobRepository {
    pool: SqlitePool,
}

impl SqliteIngestionJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_JOB: &str = "SELECT id, tenant_id, product_id, campaign_variant_id, status, \
    error_payload, started_at, completed_at FROM ingestion_jobs";

#[async_trait]
impl IngestionJobRepository for SqliteIngestionJobRepository {
    async fn create(&self, job: &IngestionJob) -> KbResult<()> {
        sqlx::query(
            "INSERT INTO ingestion_jobs (id, tenant_id, product_id, campaign_variant_id, status, \
             error_payload, started_at, completed_at) VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(job.id.0.to_string())
        .bind(job.tenant_id.0.to_string())
        .bind(job.product_id.0.to_string())
        .bind(job.campaign_variant_id.0.to_string())
        .bind(job_status_str(job.status))
        .bind(job.error_payload.as_ref().map(|v| v.to_string()))
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
        let is_running = matches!(status, JobStatus::Running);
        let now = sqlx::types::chrono::Utc::now();
        sqlx::query(
            "UPDATE ingestion_jobs SET status = ?, error_payload = ?, \
             started_at = COALESCE(started_at, CASE WHEN ? THEN ? END), \
             completed_at = CASE WHEN ? THEN ? ELSE completed_at END WHERE id = ?",
        )
        .bind(job_status_str(status))
        .bind(error_payload.as_ref().map(|v| v.to_string()))
        .bind(is_running)
        .bind(now)
        .bind(is_terminal)
        .bind(now)
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("update ingestion job status", e))?;
        Ok(())
    }

    async fn get(&self, tenant: TenantId, id: IngestionJobId) -> KbResult<IngestionJob> {
        let row: JobRow = sqlx::query_as(&format!("{SELECT_JOB} WHERE tenant_id = ? AND id = ?"))
            .bind(tenant.0.to_string())
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_err("get ingestion job", e))?
            .ok_or_else(|| not_found(format!("ingestion job {id}")))?;
        row.try_into()
    }

    async fn find_running(
        &self,
        tenant: TenantId,
        product: ProductId,
        campaign: CampaignVariantId,
    ) -> KbResult<Option<IngestionJob>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "{SELECT_JOB} WHERE tenant_id = ? AND product_id = ? AND campaign_variant_id = ? \
             AND status IN ('pending', 'running') ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(tenant.0.to_string())
        .bind(product.0.to_string())
        .bind(campaign.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("find running ingestion job", e))?;
        row.map(TryInto::try_into).transpose()
    }
}

#[derive(FromRow)]
struct LineageRow {
    id: String,
    tenant_id: String,
    resource_type: String,
    resource_id: String,
    action: String,
    payload: String,
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

impl TryFrom<LineageRow> for LineageEvent {
    type Error = kb_core::KbError;

    fn try_from(r: LineageRow) -> Result<Self, Self::Error> {
        Ok(LineageEvent {
            id: LineageEventId(parse_uuid(&r.id, "lineage event id")?),
            tenant_id: TenantId(parse_uuid(&r.tenant_id, "tenant id")?),
            resource_type: r.resource_type,
            resource_id: r.resource_id,
            action: parse_lineage_action(&r.action),
            payload: serde_json::from_str(&r.payload).unwrap_or(JsonValue::Null),
            occurred_at: r.occurred_at,
        })
    }
}

pub struct SqliteLineageRepository {
    pool: SqlitePool,
}

impl SqliteLineageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LineageRepository for SqliteLineageRepository {
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
            "INSERT INTO lineage_events (id, tenant_id, resource_type, resource_id, action, \
             payload, occurred_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(tenant.0.to_string())
        .bind(resource_type)
        .bind(resource_id)
        .bind(lineage_action_str(action))
        .bind(payload.to_string())
        .bind(sqlx::types::chrono::Utc::now())
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
            "SELECT id, tenant_id, resource_type, resource_id, action, payload, occurred_at \
             FROM lineage_events WHERE tenant_id = ? AND resource_type = ? AND resource_id = ? \
             ORDER BY occurred_at",
        )
        .bind(tenant.0.to_string())
        .bind(resource_type)
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list lineage events for resource", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(FromRow)]
struct DriftAlertRow {
    id: String,
    tenant_id: String,
    alert_type: String,
    status: String,
    detected_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    details: String,
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

impl TryFrom<DriftAlertRow> for DriftAlert {
    type Error = kb_core::KbError;

    fn try_from(r: DriftAlertRow) -> Result<Self, Self::Error> {
        Ok(DriftAlert {
            id: DriftAlertId(parse_uuid(&r.id, "drift alert id")?),
            tenant_id: TenantId(parse_uuid(&r.tenant_id, "tenant id")?),
            alert_type: parse_alert_type(&r.alert_type),
            status: parse_alert_status(&r.status),
            detected_at: r.detected_at,
            resolved_at: r.resolved_at,
            details: serde_json::from_str(&r.details).unwrap_or(JsonValue::Null),
        })
    }
}

pub struct SqliteDriftRepository {
    pool: SqlitePool,
}

impl SqliteDriftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriftRepository for SqliteDriftRepository {
    async fn open_alert(
        &self,
        tenant: TenantId,
        alert_type: DriftAlertType,
        details: JsonValue,
    ) -> KbResult<DriftAlertId> {
        let id = uuid::Uuid::new_v4();
        sqlx::query(
            "INSERT INTO drift_alerts (id, tenant_id, alert_type, status, detected_at, details) \
             VALUES (?, ?, ?, 'open', ?, ?)",
        )
        .bind(id.to_string())
        .bind(tenant.0.to_string())
        .bind(alert_type_str(alert_type))
        .bind(sqlx::types::chrono::Utc::now())
        .bind(details.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("open drift alert", e))?;
        Ok(DriftAlertId(id))
    }

    async fn list(&self, tenant: TenantId, status: Option<DriftAlertStatus>) -> KbResult<Vec<DriftAlert>> {
        let rows: Vec<DriftAlertRow> = sqlx::query_as(
            "SELECT id, tenant_id, alert_type, status, detected_at, resolved_at, details \
             FROM drift_alerts WHERE tenant_id = ? ORDER BY detected_at DESC",
        )
        .bind(tenant.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list drift alerts", e))?;
        let alerts = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<KbResult<Vec<DriftAlert>>>()?;
        Ok(match status {
            Some(s) => alerts.into_iter().filter(|a| a.status == s).collect(),
            None => alerts,
        })
    }

    async fn set_status(&self, id: DriftAlertId, status: DriftAlertStatus) -> KbResult<()> {
        let resolved_at = matches!(status, DriftAlertStatus::Resolved).then(sqlx::types::chrono::Utc::now);
        sqlx::query(
            "UPDATE drift_alerts SET status = ?, resolved_at = COALESCE(?, resolved_at) WHERE id = ?",
        )
        .bind(alert_status_str(status))
        .bind(resolved_at)
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("update drift alert status", e))?;
        Ok(())
    }
}

pub struct SqlitePurgeRepository {
    pool: SqlitePool,
}

impl SqlitePurgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const PURGE_TABLES: &[&str] = &[
    "knowledge_chunks",
    "feature_blocks",
    "spec_values",
    "drift_alerts",
    "lineage_events",
    "ingestion_jobs",
    "document_sources",
    "campaign_variants",
];

#[async_trait]
impl PurgeRepository for SqlitePurgeRepository {
    async fn purge_tenant(&self, tenant: TenantId) -> KbResult<BTreeMap<String, u64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_err("begin purge transaction", e))?;
        let mut counts = BTreeMap::new();
        sqlx::query(
            "DELETE FROM comparison_rows WHERE primary_product_id IN \
             (SELECT id FROM products WHERE tenant_id = ?) \
             OR secondary_product_id IN (SELECT id FROM products WHERE tenant_id = ?)",
        )
        .bind(tenant.0.to_string())
        .bind(tenant.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("purge comparison rows", e))?;

        for table in PURGE_TABLES {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = ?"))
                .bind(tenant.0.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_err("purge tenant table", e))?;
            counts.insert((*table).to_string(), result.rows_affected());
        }
        let result = sqlx::query("DELETE FROM products WHERE tenant_id = ?")
            .bind(tenant.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("purge products", e))?;
        counts.insert("products".to_string(), result.rows_affected());

        sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(tenant.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("purge tenant row", e))?;
        tx.commit().await.map_err(|e| map_sqlx_err("commit purge transaction", e))?;
        Ok(counts)
    }
}
