use crate::error_map::{map_sqlx_err, not_found};
use crate::sqlite::PublishLocks;
use crate::traits::{CampaignVariantRepository, PublishGuard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kb_core::{CampaignStatus, CampaignVariant, CampaignVariantId, KbResult, ProductId, TenantId};
use sqlx::{FromRow, SqlitePool};
use std::hash::{Hash, Hasher};

fn parse_uuid(s: &str, what: &str) -> Result<uuid::Uuid, kb_core::KbError> {
    uuid::Uuid::parse_str(s).map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode {what}: {e}")))
}

#[derive(FromRow)]
struct CampaignVariantRow {
    id: String,
    product_id: String,
    tenant_id: String,
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
            id: CampaignVariantId(parse_uuid(&r.id, "campaign variant id")?),
            product_id: ProductId(parse_uuid(&r.product_id, "product id")?),
            tenant_id: TenantId(parse_uuid(&r.tenant_id, "tenant id")?),
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

fn publish_lock_key(product: ProductId, locale: &str, trim: Option<&str>, market: Option<&str>) -> i64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    product.0.hash(&mut hasher);
    locale.hash(&mut hasher);
    trim.unwrap_or("").hash(&mut hasher);
    market.unwrap_or("").hash(&mut hasher);
    hasher.finish() as i64
}

pub struct SqliteCampaignVariantRepository {
    pool: SqlitePool,
    locks: PublishLocks,
}

impl SqliteCampaignVariantRepository {
    pub fn new(pool: SqlitePool, locks: PublishLocks) -> Self {
        Self { pool, locks }
    }
}

struct SqlitePublishGuard {
    locks: PublishLocks,
    key: i64,
}

#[async_trait]
impl PublishGuard for SqlitePublishGuard {
    async fn commit(self: Box<Self>) -> KbResult<()> {
        self.locks.lock().await.remove(&self.key);
        Ok(())
    }
}

impl Drop for SqlitePublishGuard {
    fn drop(&mut self) {
        let locks = self.locks.clone();
        let key = self.key;
        tokio::spawn(async move {
            locks.lock().await.remove(&key);
        });
    }
}

const SELECT_VARIANT: &str = "SELECT id, product_id, tenant_id, locale, trim, market, status, \
    version, effective_from, effective_through FROM campaign_variants";

#[async_trait]
impl CampaignVariantRepository for SqliteCampaignVariantRepository {
    async fn create_draft(&self, variant: &CampaignVariant) -> KbResult<()> {
        sqlx::query(
            "INSERT INTO campaign_variants (id, product_id, tenant_id, locale, trim, market, \
             status, version, effective_from, effective_through) \
             VALUES (?,?,?,?,?,?,'draft',?,NULL,NULL)",
        )
        .bind(variant.id.0.to_string())
        .bind(variant.product_id.0.to_string())
        .bind(variant.tenant_id.0.to_string())
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
        let row: CampaignVariantRow =
            sqlx::query_as(&format!("{SELECT_VARIANT} WHERE tenant_id = ? AND id = ?"))
                .bind(tenant.0.to_string())
                .bind(id.0.to_string())
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
        let row: Option<CampaignVariantRow> = sqlx::query_as(&format!(
            "{SELECT_VARIANT} WHERE tenant_id = ? AND product_id = ? AND locale = ? \
             AND trim IS ? AND market IS ? AND status = 'archived' ORDER BY version DESC LIMIT 1"
        ))
        .bind(tenant.0.to_string())
        .bind(product.0.to_string())
        .bind(locale)
        .bind(trim)
        .bind(market)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("find latest archived campaign variant", e))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_published(&self, tenant: TenantId) -> KbResult<Vec<CampaignVariant>> {
        let rows: Vec<CampaignVariantRow> =
            sqlx::query_as(&format!("{SELECT_VARIANT} WHERE tenant_id = ? AND status = 'published'"))
                .bind(tenant.0.to_string())
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
            "UPDATE campaign_variants SET status = ?, version = ?, effective_from = ?, \
             effective_through = ? WHERE id = ?",
        )
        .bind(status_str(status))
        .bind(version)
        .bind(effective_from)
        .bind(effective_through)
        .bind(id.0.to_string())
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
        let key = publish_lock_key(product, locale, trim, market);
        loop {
            let mut held = self.locks.lock().await;
            if held.insert(key) {
                break;
            }
            drop(held);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        Ok(Box::new(SqlitePublishGuard { locks: self.locks.clone(), key }))
    }
}

async fn find_by_status(
    pool: &SqlitePool,
    tenant: TenantId,
    product: ProductId,
    locale: &str,
    trim: Option<&str>,
    market: Option<&str>,
    status: &str,
) -> KbResult<Option<CampaignVariant>> {
    let row: Option<CampaignVariantRow> = sqlx::query_as(&format!(
        "{SELECT_VARIANT} WHERE tenant_id = ? AND product_id = ? AND locale = ? \
         AND trim IS ? AND market IS ? AND status = ? ORDER BY version DESC LIMIT 1"
    ))
    .bind(tenant.0.to_string())
    .bind(product.0.to_string())
    .bind(locale)
    .bind(trim)
    .bind(market)
    .bind(status)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_err("find campaign variant by status", e))?;
    row.map(TryInto::try_into).transpose()
}
