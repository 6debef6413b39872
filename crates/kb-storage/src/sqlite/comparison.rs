use crate::error_map::map_sqlx_err;
use crate::traits::ComparisonRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kb_core::{
    ComparisonRow, ComparisonRowId, ComparisonVerdict, KbResult, ProductId, Shareability,
    SpecValueId,
};
use sqlx::{FromRow, SqlitePool};

fn parse_uuid(s: &str, what: &str) -> Result<uuid::Uuid, kb_core::KbError> {
    uuid::Uuid::parse_str(s).map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode {what}: {e}")))
}

#[derive(FromRow)]
struct ComparisonRowRecord {
    id: String,
    primary_product_id: String,
    secondary_product_id: String,
    dimension: String,
    primary_value: Option<String>,
    secondary_value: Option<String>,
    verdict: String,
    narrative: Option<String>,
    shareability: String,
    source_primary_spec_id: Option<String>,
    source_secondary_spec_id: Option<String>,
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

impl TryFrom<ComparisonRowRecord> for ComparisonRow {
    type Error = kb_core::KbError;

    fn try_from(r: ComparisonRowRecord) -> Result<Self, Self::Error> {
        Ok(ComparisonRow {
            id: ComparisonRowId(parse_uuid(&r.id, "comparison row id")?),
            primary_product_id: ProductId(parse_uuid(&r.primary_product_id, "primary product id")?),
            secondary_product_id: ProductId(parse_uuid(&r.secondary_product_id, "secondary product id")?),
            dimension: r.dimension,
            primary_value: r.primary_value,
            secondary_value: r.secondary_value,
            verdict: parse_verdict(&r.verdict),
            narrative: r.narrative,
            shareability: parse_shareability(&r.shareability),
            source_primary_spec_id: r
                .source_primary_spec_id
                .map(|s| parse_uuid(&s, "source primary spec id"))
                .transpose()?
                .map(SpecValueId),
            source_secondary_spec_id: r
                .source_secondary_spec_id
                .map(|s| parse_uuid(&s, "source secondary spec id"))
                .transpose()?
                .map(SpecValueId),
            computed_at: r.computed_at,
        })
    }
}

pub struct SqliteComparisonRepository {
    pool: SqlitePool,
}

impl SqliteComparisonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComparisonRepository for SqliteComparisonRepository {
    async fn upsert(&self, row: &ComparisonRow) -> KbResult<()> {
        sqlx::query(
            "INSERT INTO comparison_rows (id, primary_product_id, secondary_product_id, \
             dimension, primary_value, secondary_value, verdict, narrative, shareability, \
             source_primary_spec_id, source_secondary_spec_id, computed_at) \
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?) \
             ON CONFLICT (primary_product_id, secondary_product_id, dimension, shareability) \
             DO UPDATE SET primary_value = excluded.primary_value, \
               secondary_value = excluded.secondary_value, verdict = excluded.verdict, \
               narrative = excluded.narrative, \
               source_primary_spec_id = excluded.source_primary_spec_id, \
               source_secondary_spec_id = excluded.source_secondary_spec_id, \
               computed_at = excluded.computed_at",
        )
        .bind(row.id.0.to_string())
        .bind(row.primary_product_id.0.to_string())
        .bind(row.secondary_product_id.0.to_string())
        .bind(&row.dimension)
        .bind(&row.primary_value)
        .bind(&row.secondary_value)
        .bind(verdict_str(row.verdict))
        .bind(&row.narrative)
        .bind(shareability_str(row.shareability))
        .bind(row.source_primary_spec_id.map(|id| id.0.to_string()))
        .bind(row.source_secondary_spec_id.map(|id| id.0.to_string()))
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
        let rows: Vec<ComparisonRowRecord> = sqlx::query_as(
            "SELECT id, primary_product_id, secondary_product_id, dimension, primary_value, \
             secondary_value, verdict, narrative, shareability, source_primary_spec_id, \
             source_secondary_spec_id, computed_at FROM comparison_rows \
             WHERE primary_product_id = ? AND secondary_product_id = ? ORDER BY dimension",
        )
        .bind(primary.0.to_string())
        .bind(secondary.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list comparison rows", e))?;
        let rows = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<KbResult<Vec<ComparisonRow>>>()?;
        Ok(match dimensions {
            Some(dims) => rows.into_iter().filter(|r| dims.contains(&r.dimension)).collect(),
            None => rows,
        })
    }

    async fn delete_for_product(&self, product: ProductId) -> KbResult<()> {
        sqlx::query(
            "DELETE FROM comparison_rows WHERE primary_product_id = ? OR secondary_product_id = ?",
        )
        .bind(product.0.to_string())
        .bind(product.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("delete comparison rows for product", e))?;
        Ok(())
    }
}
