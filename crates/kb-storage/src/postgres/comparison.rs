use crate::error_map::map_sqlx_err;
use crate::traits::ComparisonRepository;
use chrono::{DateTime, Utc};
use async_trait::async_trait;
use kb_core::{
    ComparisonRow, ComparisonRowId, ComparisonVerdict, KbResult, ProductId, Shareability,
    SpecValueId,
};
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct ComparisonRowRecord {
    id: uuid::Uuid,
    primary_product_id: uuid::Uuid,
    secondary_product_id: uuid::Uuid,
    dimension: String,
    primary_value: Option<String>,
    secondary_value: Option<String>,
    verdict: String,
    narrative: Option<String>,
    shareability: String,
    source_primary_spec_id: Option<uuid::Uuid>,
    source_secondary_spec_id: Option<uuid::Uuid>,
    computed_at: DateTime<Utc>,
}

fn verdict_str(v: ComparisonVerdict) -> &'static str {
    match v {
        ComparisonVerdict::PrimaryBetter => "primary_better",
        ComparisonVerdict::SecondaryBetter => "secondary_better",
        ComparisonVerdict::Equal => "equal",
        ComparisonVerdict::CannotCompare => "cannot_compare",
    }
}

fn parse_verdict(s: &str) -> ComparisonVerdict {
    match s {
        "secondary_better" => ComparisonVerdict::SecondaryBetter,
        "equal" => ComparisonVerdict::Equal,
        "cannot_compare" => ComparisonVerdict::CannotCompare,
        _ => ComparisonVerdict::PrimaryBetter,
    }
}

fn shareability_str(s: Shareability) -> &'static str {
    match s {
        Shareability::Private => "private",
        Shareability::Tenant => "tenant",
        Shareability::Public => "public",
    }
}

fn parse_shareability(s: &str) -> Shareability {
    match s {
        "tenant" => Shareability::Tenant,
        "public" => Shareability::Public,
        _ => Shareability::Private,
    }
}

impl From<ComparisonRowRecord> for ComparisonRow {
    fn from(r: ComparisonRowRecord) -> Self {
        ComparisonRow {
            id: ComparisonRowId(r.id),
            primary_product_id: ProductId(r.primary_product_id),
            secondary_product_id: ProductId(r.secondary_product_id),
            dimension: r.dimension,
            primary_value: r.primary_value,
            secondary_value: r.secondary_value,
            verdict: parse_verdict(&r.verdict),
            narrative: r.narrative,
            shareability: parse_shareability(&r.shareability),
            source_primary_spec_id: r.source_primary_spec_id.map(SpecValueId),
            source_secondary_spec_id: r.source_secondary_spec_id.map(SpecValueId),
            computed_at: r.computed_at,
        }
    }
}

pub struct PgComparisonRepository {
    pool: PgPool,
}

impl PgComparisonRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComparisonRepository for PgComparisonRepository {
    async fn upsert(&self, row: &ComparisonRow) -> KbResult<()> {
        sqlx::query(
            r#"INSERT INTO comparison_rows
                 (id, primary_product_id, secondary_product_id, dimension, primary_value,
                  secondary_value, verdict, narrative, shareability, source_primary_spec_id,
                  source_secondary_spec_id, computed_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
               ON CONFLICT (primary_product_id, secondary_product_id, dimension, shareability)
               DO UPDATE SET primary_value = EXCLUDED.primary_value,
                             secondary_value = EXCLUDED.secondary_value,
                             verdict = EXCLUDED.verdict,
                             narrative = EXCLUDED.narrative,
                             source_primary_spec_id = EXCLUDED.source_primary_spec_id,
                             source_secondary_spec_id = EXCLUDED.source_secondary_spec_id,
                             computed_at = EXCLUDED.computed_at"#,
        )
        .bind(row.id.0)
        .bind(row.primary_product_id.0)
        .bind(row.secondary_product_id.0)
        .bind(&row.dimension)
        .bind(&row.primary_value)
        .bind(&row.secondary_value)
        .bind(verdict_str(row.verdict))
        .bind(&row.narrative)
        .bind(shareability_str(row.shareability))
        .bind(row.source_primary_spec_id.map(|id| id.0))
        .bind(row.source_secondary_spec_id.map(|id| id.0))
        .bind(row.computed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("upsert comparison row", e))?;
        Ok(())
    }

    async fn list(
        &self,
        primary: ProductId,
        secondary: ProductId,
        dimensions: Option<&[String]>,
    ) -> KbResult<Vec<ComparisonRow>> {
        let dims = dimensions.map(|d| d.to_vec());
        let rows: Vec<ComparisonRowRecord> = sqlx::query_as(
            r#"SELECT id, primary_product_id, secondary_product_id, dimension, primary_value,
                      secondary_value, verdict, narrative, shareability, source_primary_spec_id,
                      source_secondary_spec_id, computed_at
                 FROM comparison_rows
                WHERE primary_product_id = $1 AND secondary_product_id = $2
                  AND ($3::text[] IS NULL OR dimension = ANY($3))
                ORDER BY dimension"#,
        )
        .bind(primary.0)
        .bind(secondary.0)
        .bind(dims.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list comparison rows", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_for_product(&self, product: ProductId) -> KbResult<()> {
        sqlx::query(
            r#"DELETE FROM comparison_rows WHERE primary_product_id = $1 OR secondary_product_id = $1"#,
        )
        .bind(product.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("delete comparison rows for product", e))?;
        Ok(())
    }
}
