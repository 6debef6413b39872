use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::{DocumentSourceRepository, ProductRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kb_core::{
    CampaignVariantId, DocumentSource, DocumentSourceId, KbResult, Product, ProductId, TenantId,
};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

fn parse_uuid(s: &str, what: &str) -> Result<uuid::Uuid, kb_core::KbError> {
    uuid::Uuid::parse_str(s).map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode {what}: {e}")))
}

#[derive(FromRow)]
struct ProductRow {
    id: String,
    tenant_id: String,
    name: String,
    segment: Option<String>,
    body_type: Option<String>,
    model_year: Option<i32>,
    is_public_benchmark: bool,
    default_campaign_variant_id: Option<String>,
    metadata: String,
}

impl TryFrom<ProductRow> for Product {
    type Error = kb_core::KbError;

    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId(parse_uuid(&r.id, "product id")?),
            tenant_id: TenantId(parse_uuid(&r.tenant_id, "tenant id")?),
            name: r.name,
            segment: r.segment,
            body_type: r.body_type,
            model_year: r.model_year,
            is_public_benchmark: r.is_public_benchmark,
            default_campaign_variant_id: r
                .default_campaign_variant_id
                .map(|s| parse_uuid(&s, "default campaign variant id"))
                .transpose()?
                .map(CampaignVariantId),
            metadata: serde_json::from_str(&r.metadata)
                .map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode product metadata: {e}")))?,
        })
    }
}

pub struct SqliteProductRepository {
    pool: SqlitePool,
}

impl SqliteProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_PRODUCT: &str = "SELECT id, tenant_id, name, segment, body_type, model_year, \
    is_public_benchmark, default_campaign_variant_id, metadata FROM products";

#[async_trait]
impl ProductRepository for SqliteProductRepository {
    async fn create(&self, product: &Product) -> KbResult<()> {
        sqlx::query(
            "INSERT INTO products (id, tenant_id, name, segment, body_type, model_year, \
             is_public_benchmark, default_campaign_variant_id, metadata) \
             VALUES (?,?,?,?,?,?,?,?,?)",
        )
        .bind(product.id.0.to_string())
        .bind(product.tenant_id.0.to_string())
        .bind(&product.name)
        .bind(&product.segment)
        .bind(&product.body_type)
        .bind(product.model_year)
        .bind(product.is_public_benchmark)
        .bind(product.default_campaign_variant_id.map(|id| id.0.to_string()))
        .bind(serde_json::to_string(&product.metadata).unwrap_or_else(|_| "{}".to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create product", e))?;
        info!(product_id = %product.id, tenant_id = %product.tenant_id, "created product");
        Ok(())
    }

    async fn get(&self, tenant: TenantId, id: ProductId) -> KbResult<Product> {
        let row: ProductRow = sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE tenant_id = ? AND id = ?"))
            .bind(tenant.0.to_string())
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_err("get product", e))?
            .ok_or_else(|| not_found(format!("product {id}")))?;
        row.try_into()
    }

    async fn get_by_name(&self, tenant: TenantId, name: &str) -> KbResult<Option<Product>> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE tenant_id = ? AND name = ?"))
                .bind(tenant.0.to_string())
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_err("get product by name", e))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, tenant: TenantId) -> KbResult<Vec<Product>> {
        let rows: Vec<ProductRow> =
            sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE tenant_id = ? ORDER BY name"))
                .bind(tenant.0.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_err("list products", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_comparable(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "{SELECT_PRODUCT} WHERE id <> ? AND (is_public_benchmark = 1 OR tenant_id = ?)"
        ))
        .bind(product.0.to_string())
        .bind(tenant.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list comparable products", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_default_campaign_variant(
        &self,
        tenant: TenantId,
        product: ProductId,
        campaign_variant: Option<CampaignVariantId>,
    ) -> KbResult<()> {
        sqlx::query("UPDATE products SET default_campaign_variant_id = ? WHERE tenant_id = ? AND id = ?")
            .bind(campaign_variant.map(|id| id.0.to_string()))
            .bind(tenant.0.to_string())
            .bind(product.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_err("set default campaign variant", e))?;
        Ok(())
    }
}

#[derive(FromRow)]
struct DocumentSourceRow {
    id: String,
    tenant_id: String,
    product_id: String,
    campaign_variant_id: Option<String>,
    storage_uri: String,
    sha256: String,
    extractor_version: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<DocumentSourceRow> for DocumentSource {
    type Error = kb_core::KbError;

    fn try_from(r: DocumentSourceRow) -> Result<Self, Self::Error> {
        Ok(DocumentSource {
            id: DocumentSourceId(parse_uuid(&r.id, "document source id")?),
            tenant_id: TenantId(parse_uuid(&r.tenant_id, "tenant id")?),
            product_id: ProductId(parse_uuid(&r.product_id, "product id")?),
            campaign_variant_id: r
                .campaign_variant_id
                .map(|s| parse_uuid(&s, "campaign variant id"))
                .transpose()?
                .map(CampaignVariantId),
            storage_uri: r.storage_uri,
            sha256: r.sha256,
            extractor_version: r.extractor_version,
            uploaded_at: r.uploaded_at,
        })
    }
}

pub struct SqliteDocumentSourceRepository {
    pool: SqlitePool,
}

impl SqliteDocumentSourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_DOC: &str = "SELECT id, tenant_id, product_id, campaign_variant_id, storage_uri, \
    sha256, extractor_version, uploaded_at FROM document_sources";

#[async_trait]
impl DocumentSourceRepository for SqliteDocumentSourceRepository {
    async fn create(&self, doc: &DocumentSource) -> KbResult<()> {
        sqlx::query(
            "INSERT INTO document_sources (id, tenant_id, product_id, campaign_variant_id, \
             storage_uri, sha256, extractor_version, uploaded_at) VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(doc.id.0.to_string())
        .bind(doc.tenant_id.0.to_string())
        .bind(doc.product_id.0.to_string())
        .bind(doc.campaign_variant_id.map(|id| id.0.to_string()))
        .bind(&doc.storage_uri)
        .bind(&doc.sha256)
        .bind(&doc.extractor_version)
        .bind(doc.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create document source", e))?;
        Ok(())
    }

    async fn find_by_hash(&self, tenant: TenantId, sha256: &str) -> KbResult<Option<DocumentSource>> {
        let row: Option<DocumentSourceRow> =
            sqlx::query_as(&format!("{SELECT_DOC} WHERE tenant_id = ? AND sha256 = ?"))
                .bind(tenant.0.to_string())
                .bind(sha256)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_err("find document source by hash", e))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get(&self, tenant: TenantId, id: DocumentSourceId) -> KbResult<DocumentSource> {
        let row: DocumentSourceRow =
            sqlx::query_as(&format!("{SELECT_DOC} WHERE tenant_id = ? AND id = ?"))
                .bind(tenant.0.to_string())
                .bind(id.0.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_err("get document source", e))?
                .ok_or_else(|| not_found(format!("document source {id}")))?;
        row.try_into()
    }

    async fn list_for_product(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<DocumentSource>> {
        let rows: Vec<DocumentSourceRow> = sqlx::query_as(&format!(
            "{SELECT_DOC} WHERE tenant_id = ? AND product_id = ? ORDER BY uploaded_at DESC"
        ))
        .bind(tenant.0.to_string())
        .bind(product.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list document sources for product", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
