use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::{CampaignVariantRepository, PublishGuard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kb_core::{CampaignStatus, CampaignVariant, CampaignVariantId, KbResult, ProductId, TenantId};
use sqlx::{FromRow, PgPool};
use std::hash::{Hash, Hasher};

#[derive(FromRow)]
struct CampaignVariantRow {
    id: uuid::Uuid,
    product_id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    locale: String,
    trim: Option<String>,
    market: Option<String>,
    status: String,
    version: i32,
    effective_from: Option<DateTime<Utc>>,
    effective_through: Option<DateTime<Utc>>,
}

impl TryFrom<CampaignVariantRow> for CampaignVariant {
    type Error = kb_core::KbError;

    fn try_from(r: CampaignVariantRow) -> Result<Self, Self::Error> {
        let status = match r.status.as_str() {
            "draft" => CampaignStatus::Draft,
            "published" => CampaignStatus::Published,
            "archived" => CampaignStatus::Archived,
            other => return Err(kb_core::KbError::Internal(anyhow::anyhow!("unknown status '{other}'"))),
        };
        Ok(CampaignVariant {
            id: CampaignVariantId(r.id),
            product_id: ProductId(r.product_id),
            tenant_id: TenantId(r.tenant_id),
            locale: r.locale,
            trim: r.trim,
            market: r.market,
            status,
            version: r.version,
            effective_from: r.effective_from,
            effective_through: r.effective_through,
        })
    }
}

fn status_str(status: CampaignStatus) -> &'static str {
    match status {
        CampaignStatus::Draft => "draft",
        CampaignStatus::Published => "published",
        CampaignStatus::Archived => "archived",
    }
}

/// Derives a stable i64 advisory-lock key from the `(product, locale,
/// trim, market)` publish-serialization unit (spec §5), the same
/// deterministic-hash approach the teacher uses for entity locks.
fn publish_lock_key(product: ProductId, locale: &str, trim: Option<&str>, market: Option<&str>) -> i64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    product.0.hash(&mut hasher);
    locale.hash(&mut hasher);
    trim.unwrap_or("").hash(&mut hasher);
    market.unwrap_or("").hash(&mut hasher);
    hasher.finish() as i64
}

pub struct PgCampaignVariantRepository {
    pool: PgPool,
}

impl PgCampaignVariantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgPublishGuard<'a> {
    tx: sqlx::Transaction<'a, sqlx::Postgres>,
}

#[async_trait]
impl<'a> PublishGuard for PgPublishGuard<'a> {
    async fn commit(self: Box<Self>) -> KbResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_err("commit publish transaction", e))
    }
}

#[async_trait]
impl CampaignVariantRepository for PgCampaignVariantRepository {
    async fn create_draft(&self, variant: &CampaignVariant) -> KbResult<()> {
        sqlx::query(
            r#"INSERT INTO campaign_variants
                 (id, product_id, tenant_id, locale, trim, market, status, version,
                  effective_from, effective_through)
               VALUES ($1, $2, $3, $4, $5, $6, 'draft', $7, NULL, NULL)"#,
        )
        .bind(variant.id.0)
        .bind(variant.product_id.0)
        .bind(variant.tenant_id.0)
        .bind(&variant.locale)
        .bind(&variant.trim)
        .bind(&variant.market)
        .bind(variant.version)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create draft campaign variant", e))?;
        Ok(())
    }

    async fn get(&self, tenant: TenantId, id: CampaignVariantId) -> KbResult<CampaignVariant> {
        let row: CampaignVariantRow = sqlx::query_as(
            r#"SELECT id, product_id, tenant_id, locale, trim, market, status, version,
                      effective_from, effective_through
                 FROM campaign_variants WHERE tenant_id = $1 AND id = $2"#,
        )
        .bind(tenant.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get campaign variant", e))?
        .ok_or_else(|| not_found(format!("campaign variant {id}")))?;
        row.try_into()
    }

    async fn find_draft(
        &self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<Option<CampaignVariant>> {
        find_by_status(&self.pool, tenant, product, locale, trim, market, "draft").await
    }

    async fn find_published(
        &self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<Option<CampaignVariant>> {
        find_by_status(&self.pool, tenant, product, locale, trim, market, "published").await
    }

    async fn find_latest_archived(
        &self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<Option<CampaignVariant>> {
        let row: Option<CampaignVariantRow> = sqlx::query_as(
            r#"SELECT id, product_id, tenant_id, locale, trim, market, status, version,
                      effective_from, effective_through
                 FROM campaign_variants
                WHERE tenant_id = $1 AND product_id = $2 AND locale = $3
                  AND trim IS NOT DISTINCT FROM $4 AND market IS NOT DISTINCT FROM $5
                  AND status = 'archived'
                ORDER BY version DESC LIMIT 1"#,
        )
        .bind(tenant.0)
        .bind(product.0)
        .bind(locale)
        .bind(trim)
        .bind(market)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("find latest archived campaign variant", e))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_published(&self, tenant: TenantId) -> KbResult<Vec<CampaignVariant>> {
        let rows: Vec<CampaignVariantRow> = sqlx::query_as(
            r#"SELECT id, product_id, tenant_id, locale, trim, market, status, version,
                      effective_from, effective_through
                 FROM campaign_variants
                WHERE tenant_id = $1 AND status = 'published'"#,
        )
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list published campaign variants", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_status(
        &self,
        id: CampaignVariantId,
        status: CampaignStatus,
        version: i32,
        effective_from: Option<DateTime<Utc>>,
        effective_through: Option<DateTime<Utc>>,
    ) -> KbResult<()> {
        sqlx::query(
            r#"UPDATE campaign_variants
                  SET status = $1, version = $2, effective_from = $3, effective_through = $4
                WHERE id = $5"#,
        )
        .bind(status_str(status))
        .bind(version)
        .bind(effective_from)
        .bind(effective_through)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("update campaign variant status", e))?;
        Ok(())
    }

    async fn lock_for_publish<'a>(
        &'a self,
        _tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<Box<dyn PublishGuard + 'a>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_err("begin publish transaction", e))?;
        let key = publish_lock_key(product, locale, trim, market);
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("acquire publish advisory lock", e))?;
        Ok(Box::new(PgPublishGuard { tx }))
    }
}

async fn find_by_status(
    pool: &PgPool,
    tenant: TenantId,
    product: ProductId,
    locale: &str,
    trim: Option<&str>,
    market: Option<&str>,
    status: &str,
) -> KbResult<Option<CampaignVariant>> {
    let row: Option<CampaignVariantRow> = sqlx::query_as(
        r#"SELECT id, product_id, tenant_id, locale, trim, market, status, version,
                  effective_from, effective_through
             FROM campaign_variants
            WHERE tenant_id = $1 AND product_id = $2 AND locale = $3
              AND trim IS NOT DISTINCT FROM $4 AND market IS NOT DISTINCT FROM $5
              AND status = $6
            ORDER BY version DESC LIMIT 1"#,
    )
    .bind(tenant.0)
    .bind(product.0)
    .bind(locale)
    .bind(trim)
    .bind(market)
    .bind(status)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_err("find campaign variant by status", e))?;
    row.map(TryInto::try_into).transpose()
}
