use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::{DocumentSourceRepository, ProductRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kb_core::{
    CampaignVariantId, DocumentSource, DocumentSourceId, KbResult, Product, ProductId, TenantId,
};
use sqlx::{FromRow, PgPool};
use tracing::info;

#[derive(FromRow)]
struct ProductRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    segment: Option<String>,
    body_type: Option<String>,
    model_year: Option<i32>,
    is_public_benchmark: bool,
    default_campaign_variant_id: Option<uuid::Uuid>,
    metadata: serde_json::Value,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: ProductId(r.id),
            tenant_id: TenantId(r.tenant_id),
            name: r.name,
            segment: r.segment,
            body_type: r.body_type,
            model_year: r.model_year,
            is_public_benchmark: r.is_public_benchmark,
            default_campaign_variant_id: r.default_campaign_variant_id.map(CampaignVariantId),
            metadata: r.metadata,
        }
    }
}

pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn create(&self, product: &Product) -> KbResult<()> {
        sqlx::query(
            r#"INSERT INTO products
                 (id, tenant_id, name, segment, body_type, model_year, is_public_benchmark,
                  default_campaign_variant_id, metadata)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(product.id.0)
        .bind(product.tenant_id.0)
        .bind(&product.name)
        .bind(&product.segment)
        .bind(&product.body_type)
        .bind(product.model_year)
        .bind(product.is_public_benchmark)
        .bind(product.default_campaign_variant_id.map(|id| id.0))
        .bind(&product.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create product", e))?;
        info!(product_id = %product.id, tenant_id = %product.tenant_id, "created product");
        Ok(())
    }

    async fn get(&self, tenant: TenantId, id: ProductId) -> KbResult<Product> {
        let row: ProductRow = sqlx::query_as(
            r#"SELECT id, tenant_id, name, segment, body_type, model_year, is_public_benchmark,
                      default_campaign_variant_id, metadata
                 FROM products WHERE tenant_id = $1 AND id = $2"#,
        )
        .bind(tenant.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get product", e))?
        .ok_or_else(|| not_found(format!("product {id}")))?;
        Ok(row.into())
    }

    async fn get_by_name(&self, tenant: TenantId, name: &str) -> KbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, name, segment, body_type, model_year, is_public_benchmark,
                      default_campaign_variant_id, metadata
                 FROM products WHERE tenant_id = $1 AND name = $2"#,
        )
        .bind(tenant.0)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get product by name", e))?;
        Ok(row.map(Into::into))
    }

    async fn list(&self, tenant: TenantId) -> KbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, name, segment, body_type, model_year, is_public_benchmark,
                      default_campaign_variant_id, metadata
                 FROM products WHERE tenant_id = $1 ORDER BY name"#,
        )
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list products", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_comparable(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<Product>> {
        // Benchmark products, or products explicitly shared with this
        // tenant via a feature_blocks/comparison shareability grant —
        // emulated here as: any public-benchmark product, plus the
        // requester's own other products (spec §4.6 eligibility rule).
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, name, segment, body_type, model_year, is_public_benchmark,
                      default_campaign_variant_id, metadata
                 FROM products
                WHERE id <> $2 AND (is_public_benchmark = true OR tenant_id = $1)"#,
        )
        .bind(tenant.0)
        .bind(product.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list comparable products", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_default_campaign_variant(
        &self,
        tenant: TenantId,
        product: ProductId,
        campaign_variant: Option<CampaignVariantId>,
    ) -> KbResult<()> {
        sqlx::query(
            r#"UPDATE products SET default_campaign_variant_id = $3
                 WHERE tenant_id = $1 AND id = $2"#,
        )
        .bind(tenant.0)
        .bind(product.0)
        .bind(campaign_variant.map(|id| id.0))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("set default campaign variant", e))?;
        Ok(())
    }
}

#[derive(FromRow)]
struct DocumentSourceRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    product_id: uuid::Uuid,
    campaign_variant_id: Option<uuid::Uuid>,
    storage_uri: String,
    sha256: String,
    extractor_version: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl From<DocumentSourceRow> for DocumentSource {
    fn from(r: DocumentSourceRow) -> Self {
        DocumentSource {
            id: DocumentSourceId(r.id),
            tenant_id: TenantId(r.tenant_id),
            product_id: ProductId(r.product_id),
            campaign_variant_id: r.campaign_variant_id.map(CampaignVariantId),
            storage_uri: r.storage_uri,
            sha256: r.sha256,
            extractor_version: r.extractor_version,
            uploaded_at: r.uploaded_at,
        }
    }
}

pub struct PgDocumentSourceRepository {
    pool: PgPool,
}

impl PgDocumentSourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentSourceRepository for PgDocumentSourceRepository {
    async fn create(&self, doc: &DocumentSource) -> KbResult<()> {
        sqlx::query(
            r#"INSERT INTO document_sources
                 (id, tenant_id, product_id, campaign_variant_id, storage_uri, sha256,
                  extractor_version, uploaded_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(doc.id.0)
        .bind(doc.tenant_id.0)
        .bind(doc.product_id.0)
        .bind(doc.campaign_variant_id.map(|id| id.0))
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
        let row: Option<DocumentSourceRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, product_id, campaign_variant_id, storage_uri, sha256,
                      extractor_version, uploaded_at
                 FROM document_sources WHERE tenant_id = $1 AND sha256 = $2"#,
        )
        .bind(tenant.0)
        .bind(sha256)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("find document source by hash", e))?;
        Ok(row.map(Into::into))
    }

    async fn get(&self, tenant: TenantId, id: DocumentSourceId) -> KbResult<DocumentSource> {
        let row: DocumentSourceRow = sqlx::query_as(
            r#"SELECT id, tenant_id, product_id, campaign_variant_id, storage_uri, sha256,
                      extractor_version, uploaded_at
                 FROM document_sources WHERE tenant_id = $1 AND id = $2"#,
        )
        .bind(tenant.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get document source", e))?
        .ok_or_else(|| not_found(format!("document source {id}")))?;
        Ok(row.into())
    }

    async fn list_for_product(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<DocumentSource>> {
        let rows: Vec<DocumentSourceRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, product_id, campaign_variant_id, storage_uri, sha256,
                      extractor_version, uploaded_at
                 FROM document_sources
                WHERE tenant_id = $1 AND product_id = $2
                ORDER BY uploaded_at DESC"#,
        )
        .bind(tenant.0)
        .bind(product.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list document sources for product", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
