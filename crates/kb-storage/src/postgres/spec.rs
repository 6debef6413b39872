use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::{FeatureBlockRepository, SpecCatalogRepository, SpecValueRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kb_core::{
    CampaignVariantId, DocumentSourceId, FeatureBlock, FeatureBlockId, FeatureBlockType, KbResult,
    ProductId, Shareability, SpecCategory, SpecCategoryId, SpecDataType, SpecItem, SpecItemId,
    SpecPayload, SpecValue, SpecValueId, SpecValueStatus, SpecViewRow, TenantId,
};
use sqlx::{FromRow, PgPool};

/// Minimum Jaro-Winkler similarity for matching a spec name against a
/// known `SpecItem` alias before falling back to create-new (mirrors the
/// teacher's two-stage GIN+strsim fuzzy lookup, strsim stage only: the
/// spec catalog is small enough per-tenant that a GIN prefilter buys
/// nothing).
const ALIAS_SIMILARITY_THRESHOLD: f64 = 0.92;

#[derive(FromRow)]
struct CategoryRow {
    id: uuid::Uuid,
    name: String,
    display_order: i32,
}

#[derive(FromRow)]
struct ItemRow {
    id: uuid::Uuid,
    category_id: uuid::Uuid,
    display_name: String,
    unit: Option<String>,
    data_type: String,
    aliases: serde_json::Value,
}

fn parse_data_type(s: &str) -> SpecDataType {
    match s {
        "numeric" => SpecDataType::Numeric,
        "boolean" => SpecDataType::Boolean,
        "json" => SpecDataType::Json,
        _ => SpecDataType::Text,
    }
}

pub struct PgSpecCatalogRepository {
    pool: PgPool,
}

impl PgSpecCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpecCatalogRepository for PgSpecCatalogRepository {
    async fn find_or_create_category(&self, name: &str) -> KbResult<SpecCategory> {
        if let Some(row) = sqlx::query_as::<_, CategoryRow>(
            r#"SELECT id, name, display_order FROM spec_categories WHERE name = $1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("find spec category", e))?
        {
            return Ok(SpecCategory {
                id: SpecCategoryId(row.id),
                name: row.name,
                display_order: row.display_order,
            });
        }

        let id = uuid::Uuid::new_v4();
        let display_order: i32 = sqlx::query_scalar(
            r#"SELECT COALESCE(MAX(display_order), 0) + 1 FROM spec_categories"#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("compute next category order", e))?;
        sqlx::query(
            r#"INSERT INTO spec_categories (id, name, display_order) VALUES ($1, $2, $3)
               ON CONFLICT (name) DO NOTHING"#,
        )
        .bind(id)
        .bind(name)
        .bind(display_order)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create spec category", e))?;

        // Re-read: a concurrent insert may have won the ON CONFLICT race.
        let row: CategoryRow = sqlx::query_as(
            r#"SELECT id, name, display_order FROM spec_categories WHERE name = $1"#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("reload spec category", e))?;
        Ok(SpecCategory {
            id: SpecCategoryId(row.id),
            name: row.name,
            display_order: row.display_order,
        })
    }

    async fn find_or_create_item(
        &self,
        category_id: SpecCategoryId,
        display_name: &str,
        aliases_hint: &[String],
    ) -> KbResult<SpecItem> {
        let candidates: Vec<ItemRow> = sqlx::query_as(
            r#"SELECT id, category_id, display_name, unit, data_type, aliases
                 FROM spec_items WHERE category_id = $1"#,
        )
        .bind(category_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list spec items for category", e))?;

        let needle = display_name.to_lowercase();
        let mut best: Option<(f64, ItemRow)> = None;
        for row in candidates {
            let mut names = vec![row.display_name.to_lowercase()];
            if let Some(arr) = row.aliases.as_array() {
                names.extend(arr.iter().filter_map(|v| v.as_str()).map(|s| s.to_lowercase()));
            }
            let score = names
                .iter()
                .map(|n| strsim::jaro_winkler(&needle, n))
                .fold(0.0_f64, f64::max);
            if score >= ALIAS_SIMILARITY_THRESHOLD && best.as_ref().map_or(true, |(b, _)| score > *b) {
                best = Some((score, row));
            }
        }

        if let Some((_, row)) = best {
            return Ok(SpecItem {
                id: SpecItemId(row.id),
                category_id: SpecCategoryId(row.category_id),
                display_name: row.display_name,
                unit: row.unit,
                data_type: parse_data_type(&row.data_type),
                aliases: row
                    .aliases
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default(),
            });
        }

        let id = uuid::Uuid::new_v4();
        let aliases = serde_json::to_value(aliases_hint).unwrap_or_default();
        sqlx::query(
            r#"INSERT INTO spec_items (id, category_id, display_name, unit, data_type, aliases)
               VALUES ($1, $2, $3, NULL, 'text', $4)"#,
        )
        .bind(id)
        .bind(category_id.0)
        .bind(display_name)
        .bind(&aliases)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create spec item", e))?;

        Ok(SpecItem {
            id: SpecItemId(id),
            category_id,
            display_name: display_name.to_string(),
            unit: None,
            data_type: SpecDataType::Text,
            aliases: aliases_hint.to_vec(),
        })
    }

    async fn get_item(&self, id: SpecItemId) -> KbResult<SpecItem> {
        let row: ItemRow = sqlx::query_as(
            r#"SELECT id, category_id, display_name, unit, data_type, aliases FROM spec_items WHERE id = $1"#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get spec item", e))?
        .ok_or_else(|| not_found(format!("spec item {id}")))?;
        Ok(SpecItem {
            id: SpecItemId(row.id),
            category_id: SpecCategoryId(row.category_id),
            display_name: row.display_name,
            unit: row.unit,
            data_type: parse_data_type(&row.data_type),
            aliases: row
                .aliases
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
        })
    }
}

#[derive(FromRow)]
struct SpecValueRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    product_id: uuid::Uuid,
    campaign_variant_id: uuid::Uuid,
    spec_item_id: uuid::Uuid,
    value_numeric: Option<f64>,
    value_text: Option<String>,
    unit: Option<String>,
    confidence: f32,
    status: String,
    source_doc_id: Option<uuid::Uuid>,
    source_page: Option<i32>,
    version: i32,
    effective_from: Option<DateTime<Utc>>,
    effective_through: Option<DateTime<Utc>>,
    key_features: Option<String>,
    variant_availability: Option<String>,
    explanation: Option<String>,
    explanation_failed: bool,
}

impl TryFrom<SpecValueRow> for SpecValue {
    type Error = kb_core::KbError;

    fn try_from(r: SpecValueRow) -> Result<Self, Self::Error> {
        let payload = match (r.value_numeric, r.value_text) {
            (Some(n), None) => SpecPayload::Numeric(n),
            (None, Some(t)) => SpecPayload::Text(t),
            _ => {
                return Err(kb_core::KbError::Internal(anyhow::anyhow!(
                    "spec value {} violates I5 (numeric xor text)",
                    r.id
                )))
            }
        };
        let status = match r.status.as_str() {
            "conflict" => SpecValueStatus::Conflict,
            "deprecated" => SpecValueStatus::Deprecated,
            _ => SpecValueStatus::Active,
        };
        Ok(SpecValue {
            id: SpecValueId(r.id),
            tenant_id: TenantId(r.tenant_id),
            product_id: ProductId(r.product_id),
            campaign_variant_id: CampaignVariantId(r.campaign_variant_id),
            spec_item_id: SpecItemId(r.spec_item_id),
            payload,
            unit: r.unit,
            confidence: r.confidence,
            status,
            source_doc_id: r.source_doc_id.map(DocumentSourceId),
            source_page: r.source_page,
            version: r.version,
            effective_from: r.effective_from,
            effective_through: r.effective_through,
            key_features: r.key_features,
            variant_availability: r.variant_availability,
            explanation: r.explanation,
            explanation_failed: r.explanation_failed,
        })
    }
}

fn status_str(status: SpecValueStatus) -> &'static str {
    match status {
        SpecValueStatus::Active => "active",
        SpecValueStatus::Conflict => "conflict",
        SpecValueStatus::Deprecated => "deprecated",
    }
}

pub struct PgSpecValueRepository {
    pool: PgPool,
}

impl PgSpecValueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpecValueRepository for PgSpecValueRepository {
    async fn upsert(&self, value: &SpecValue) -> KbResult<SpecValueId> {
        let (value_numeric, value_text) = match &value.payload {
            SpecPayload::Numeric(n) => (Some(*n), None),
            SpecPayload::Text(t) => (None, Some(t.clone())),
        };
        sqlx::query(
            r#"INSERT INTO spec_values
                 (id, tenant_id, product_id, campaign_variant_id, spec_item_id, value_numeric,
                  value_text, unit, confidence, status, source_doc_id, source_page, version,
                  effective_from, effective_through, key_features, variant_availability,
                  explanation, explanation_failed)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
               ON CONFLICT (tenant_id, product_id, campaign_variant_id, spec_item_id, version)
               DO UPDATE SET value_numeric = EXCLUDED.value_numeric, value_text = EXCLUDED.value_text,
                             unit = EXCLUDED.unit, confidence = EXCLUDED.confidence,
                             status = EXCLUDED.status, key_features = EXCLUDED.key_features,
                             variant_availability = EXCLUDED.variant_availability,
                             explanation = EXCLUDED.explanation,
                             explanation_failed = EXCLUDED.explanation_failed"#,
        )
        .bind(value.id.0)
        .bind(value.tenant_id.0)
        .bind(value.product_id.0)
        .bind(value.campaign_variant_id.0)
        .bind(value.spec_item_id.0)
        .bind(value_numeric)
        .bind(value_text)
        .bind(&value.unit)
        .bind(value.confidence)
        .bind(status_str(value.status))
        .bind(value.source_doc_id.map(|id| id.0))
        .bind(value.source_page)
        .bind(value.version)
        .bind(value.effective_from)
        .bind(value.effective_through)
        .bind(&value.key_features)
        .bind(&value.variant_availability)
        .bind(&value.explanation)
        .bind(value.explanation_failed)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("upsert spec value", e))?;
        Ok(value.id)
    }

    async fn get(&self, tenant: TenantId, id: SpecValueId) -> KbResult<SpecValue> {
        let row: SpecValueRow = sqlx::query_as(
            r#"SELECT id, tenant_id, product_id, campaign_variant_id, spec_item_id, value_numeric,
                      value_text, unit, confidence, status, source_doc_id, source_page, version,
                      effective_from, effective_through, key_features, variant_availability,
                      explanation, explanation_failed
                 FROM spec_values WHERE tenant_id = $1 AND id = $2"#,
        )
        .bind(tenant.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get spec value", e))?
        .ok_or_else(|| not_found(format!("spec value {id}")))?;
        row.try_into()
    }

    async fn spec_view(
        &self,
        tenant: TenantId,
        products: &[ProductId],
        campaign_variant: CampaignVariantId,
    ) -> KbResult<Vec<SpecViewRow>> {
        let product_ids: Vec<uuid::Uuid> = products.iter().map(|p| p.0).collect();
        let rows: Vec<(
            uuid::Uuid,
            uuid::Uuid,
            String,
            String,
            Option<f64>,
            Option<String>,
            Option<String>,
            f32,
            Option<String>,
            Option<String>,
            Option<String>,
        )> = sqlx::query_as(
            r#"SELECT sv.product_id, sv.campaign_variant_id, sc.name, si.display_name,
                      sv.value_numeric, sv.value_text, sv.unit, sv.confidence,
                      sv.key_features, sv.variant_availability, sv.explanation
                 FROM spec_values sv
                 JOIN spec_items si ON si.id = sv.spec_item_id
                 JOIN spec_categories sc ON sc.id = si.category_id
                WHERE sv.tenant_id = $1 AND sv.campaign_variant_id = $2
                  AND sv.status = 'active'
                  AND ($3::uuid[] IS NULL OR sv.product_id = ANY($3))
                ORDER BY sc.display_order, si.display_name"#,
        )
        .bind(tenant.0)
        .bind(campaign_variant.0)
        .bind(if product_ids.is_empty() { None } else { Some(&product_ids[..]) })
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("query spec_view_latest", e))?;

        Ok(rows
            .into_iter()
            .map(
                |(product_id, cv_id, category, specification, num, text, unit, confidence, kf, va, expl)| {
                    let value = match (num, text) {
                        (Some(n), _) => SpecPayload::Numeric(n),
                        (None, Some(t)) => SpecPayload::Text(t),
                        (None, None) => SpecPayload::Text(String::new()),
                    };
                    SpecViewRow {
                        product_id: ProductId(product_id),
                        campaign_variant_id: CampaignVariantId(cv_id),
                        category,
                        specification,
                        value,
                        unit,
                        confidence,
                        key_features: kf,
                        variant_availability: va,
                        explanation: expl,
                    }
                },
            )
            .collect())
    }

    async fn active_for_published(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<SpecValue>> {
        let rows: Vec<SpecValueRow> = sqlx::query_as(
            r#"SELECT sv.id, sv.tenant_id, sv.product_id, sv.campaign_variant_id, sv.spec_item_id,
                      sv.value_numeric, sv.value_text, sv.unit, sv.confidence, sv.status,
                      sv.source_doc_id, sv.source_page, sv.version, sv.effective_from,
                      sv.effective_through, sv.key_features, sv.variant_availability,
                      sv.explanation, sv.explanation_failed
                 FROM spec_values sv
                 JOIN campaign_variants cv ON cv.id = sv.campaign_variant_id
                WHERE sv.tenant_id = $1 AND sv.product_id = $2 AND sv.status = 'active'
                  AND cv.status = 'published'"#,
        )
        .bind(tenant.0)
        .bind(product.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list active spec values for published variant", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_conflicts(&self, tenant: TenantId, product: ProductId) -> KbResult<Vec<Vec<SpecValue>>> {
        let values = self.active_for_published(tenant, product).await?;
        let mut by_item: std::collections::HashMap<SpecItemId, Vec<SpecValue>> = std::collections::HashMap::new();
        for v in values {
            by_item.entry(v.spec_item_id).or_default().push(v);
        }
        Ok(by_item
            .into_values()
            .filter(|group| {
                group.len() > 1
                    && group
                        .windows(2)
                        .any(|pair| pair[0].payload != pair[1].payload)
            })
            .collect())
    }
}

#[derive(FromRow)]
struct FeatureBlockRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    product_id: uuid::Uuid,
    campaign_variant_id: Option<uuid::Uuid>,
    block_type: String,
    body: String,
    priority: i32,
    tags: serde_json::Value,
    shareability: String,
    embedding_vector: Option<serde_json::Value>,
}

fn parse_shareability(s: &str) -> Shareability {
    match s {
        "tenant" => Shareability::Tenant,
        "public" => Shareability::Public,
        _ => Shareability::Private,
    }
}

fn shareability_str(s: Shareability) -> &'static str {
    match s {
        Shareability::Private => "private",
        Shareability::Tenant => "tenant",
        Shareability::Public => "public",
    }
}

impl From<FeatureBlockRow> for FeatureBlock {
    fn from(r: FeatureBlockRow) -> Self {
        FeatureBlock {
            id: FeatureBlockId(r.id),
            tenant_id: TenantId(r.tenant_id),
            product_id: ProductId(r.product_id),
            campaign_variant_id: r.campaign_variant_id.map(CampaignVariantId),
            block_type: match r.block_type.as_str() {
                "usp" => FeatureBlockType::Usp,
                "accessory" => FeatureBlockType::Accessory,
                _ => FeatureBlockType::Feature,
            },
            body: r.body,
            priority: r.priority,
            tags: r
                .tags
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            shareability: parse_shareability(&r.shareability),
            embedding_vector: r.embedding_vector.and_then(|v| serde_json::from_value(v).ok()),
        }
    }
}

pub struct PgFeatureBlockRepository {
    pool: PgPool,
}

impl PgFeatureBlockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeatureBlockRepository for PgFeatureBlockRepository {
    async fn create(&self, block: &FeatureBlock) -> KbResult<()> {
        let block_type = match block.block_type {
            FeatureBlockType::Feature => "feature",
            FeatureBlockType::Usp => "usp",
            FeatureBlockType::Accessory => "accessory",
        };
        sqlx::query(
            r#"INSERT INTO feature_blocks
                 (id, tenant_id, product_id, campaign_variant_id, block_type, body, priority,
                  tags, shareability, embedding_vector)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)"#,
        )
        .bind(block.id.0)
        .bind(block.tenant_id.0)
        .bind(block.product_id.0)
        .bind(block.campaign_variant_id.map(|id| id.0))
        .bind(block_type)
        .bind(&block.body)
        .bind(block.priority)
        .bind(serde_json::to_value(&block.tags).unwrap_or_default())
        .bind(shareability_str(block.shareability))
        .bind(block.embedding_vector.as_ref().map(|v| serde_json::to_value(v).unwrap()))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("create feature block", e))?;
        Ok(())
    }

    async fn list_for_variant(
        &self,
        tenant: TenantId,
        campaign_variant: CampaignVariantId,
    ) -> KbResult<Vec<FeatureBlock>> {
        let rows: Vec<FeatureBlockRow> = sqlx::query_as(
            r#"SELECT id, tenant_id, product_id, campaign_variant_id, block_type, body, priority,
                      tags, shareability, embedding_vector
                 FROM feature_blocks
                WHERE tenant_id = $1 AND campaign_variant_id = $2
                ORDER BY priority DESC"#,
        )
        .bind(tenant.0)
        .bind(campaign_variant.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list feature blocks for variant", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
