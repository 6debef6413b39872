use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::KnowledgeChunkRepository;
use async_trait::async_trait;
use kb_core::{
    CampaignVariantId, ChunkMetadata, ChunkType, ChunkVisibility, CompletionStatus, KbResult,
    KnowledgeChunk, KnowledgeChunkId, ProductId, TenantId,
};
use sqlx::{FromRow, PgPool};

#[derive(FromRow)]
struct ChunkRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    product_id: uuid::Uuid,
    campaign_variant_id: Option<uuid::Uuid>,
    chunk_type: String,
    text: String,
    metadata: serde_json::Value,
    embedding_vector: Option<Vec<f32>>,
    embedding_model: Option<String>,
    embedding_version: Option<String>,
    content_hash: Option<String>,
    completion_status: String,
    visibility: String,
}

fn chunk_type_str(t: ChunkType) -> &'static str {
    match t {
        ChunkType::SpecRow => "spec_row",
        ChunkType::FeatureBlock => "feature_block",
        ChunkType::Usp => "usp",
        ChunkType::Faq => "faq",
        ChunkType::Comparison => "comparison",
        ChunkType::Global => "global",
    }
}

fn parse_chunk_type(s: &str) -> ChunkType {
    match s {
        "feature_block" => ChunkType::FeatureBlock,
        "usp" => ChunkType::Usp,
        "faq" => ChunkType::Faq,
        "comparison" => ChunkType::Comparison,
        "global" => ChunkType::Global,
        _ => ChunkType::SpecRow,
    }
}

fn completion_status_str(s: CompletionStatus) -> &'static str {
    match s {
        CompletionStatus::Complete => "complete",
        CompletionStatus::Incomplete => "incomplete",
        CompletionStatus::RetryNeeded => "retry_needed",
    }
}

fn parse_completion_status(s: &str) -> CompletionStatus {
    match s {
        "incomplete" => CompletionStatus::Incomplete,
        "retry_needed" => CompletionStatus::RetryNeeded,
        _ => CompletionStatus::Complete,
    }
}

fn visibility_str(v: ChunkVisibility) -> &'static str {
    match v {
        ChunkVisibility::Private => "private",
        ChunkVisibility::Shared => "shared",
        ChunkVisibility::Benchmark => "benchmark",
    }
}

fn parse_visibility(s: &str) -> ChunkVisibility {
    match s {
        "shared" => ChunkVisibility::Shared,
        "benchmark" => ChunkVisibility::Benchmark,
        _ => ChunkVisibility::Private,
    }
}

impl TryFrom<ChunkRow> for KnowledgeChunk {
    type Error = kb_core::KbError;

    fn try_from(r: ChunkRow) -> Result<Self, Self::Error> {
        let metadata: ChunkMetadata = serde_json::from_value(r.metadata)
            .map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode chunk metadata: {e}")))?;
        Ok(KnowledgeChunk {
            id: KnowledgeChunkId(r.id),
            tenant_id: TenantId(r.tenant_id),
            product_id: ProductId(r.product_id),
            campaign_variant_id: r.campaign_variant_id.map(CampaignVariantId),
            chunk_type: parse_chunk_type(&r.chunk_type),
            text: r.text,
            metadata,
            embedding_vector: r.embedding_vector,
            embedding_model: r.embedding_model,
            embedding_version: r.embedding_version,
            content_hash: r.content_hash,
            completion_status: parse_completion_status(&r.completion_status),
            visibility: parse_visibility(&r.visibility),
        })
    }
}

pub struct PgKnowledgeChunkRepository {
    pool: PgPool,
}

impl PgKnowledgeChunkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLS: &str = r#"id, tenant_id, product_id, campaign_variant_id, chunk_type, text,
                      metadata, embedding_vector, embedding_model, embedding_version,
                      content_hash, completion_status, visibility"#;

#[async_trait]
impl KnowledgeChunkRepository for PgKnowledgeChunkRepository {
    async fn find_by_content_hash(
        &self,
        tenant: TenantId,
        hash: &str,
    ) -> KbResult<Option<KnowledgeChunk>> {
        let row: Option<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM knowledge_chunks WHERE tenant_id = $1 AND content_hash = $2"
        ))
        .bind(tenant.0)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("find chunk by content hash", e))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn insert(&self, chunk: &KnowledgeChunk) -> KbResult<()> {
        let metadata = serde_json::to_value(&chunk.metadata)
            .map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("encode chunk metadata: {e}")))?;
        sqlx::query(
            r#"INSERT INTO knowledge_chunks
                 (id, tenant_id, product_id, campaign_variant_id, chunk_type, text, metadata,
                  embedding_vector, embedding_model, embedding_version, content_hash,
                  completion_status, visibility)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
               ON CONFLICT (tenant_id, content_hash) WHERE content_hash IS NOT NULL DO NOTHING"#,
        )
        .bind(chunk.id.0)
        .bind(chunk.tenant_id.0)
        .bind(chunk.product_id.0)
        .bind(chunk.campaign_variant_id.map(|id| id.0))
        .bind(chunk_type_str(chunk.chunk_type))
        .bind(&chunk.text)
        .bind(&metadata)
        .bind(chunk.embedding_vector.as_deref())
        .bind(&chunk.embedding_model)
        .bind(&chunk.embedding_version)
        .bind(&chunk.content_hash)
        .bind(completion_status_str(chunk.completion_status))
        .bind(visibility_str(chunk.visibility))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("insert knowledge chunk", e))?;
        Ok(())
    }

    async fn update_metadata_and_embedding(&self, chunk: &KnowledgeChunk) -> KbResult<()> {
        let metadata = serde_json::to_value(&chunk.metadata)
            .map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("encode chunk metadata: {e}")))?;
        sqlx::query(
            r#"UPDATE knowledge_chunks
                  SET metadata = $1, embedding_vector = $2, embedding_model = $3,
                      embedding_version = $4, completion_status = $5
                WHERE tenant_id = $6 AND id = $7"#,
        )
        .bind(&metadata)
        .bind(chunk.embedding_vector.as_deref())
        .bind(&chunk.embedding_model)
        .bind(&chunk.embedding_version)
        .bind(completion_status_str(chunk.completion_status))
        .bind(chunk.tenant_id.0)
        .bind(chunk.id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("update chunk metadata/embedding", e))?;
        Ok(())
    }

    async fn get(&self, tenant: TenantId, id: KnowledgeChunkId) -> KbResult<KnowledgeChunk> {
        let row: ChunkRow = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM knowledge_chunks WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get knowledge chunk", e))?
        .ok_or_else(|| not_found(format!("knowledge chunk {id}")))?;
        row.try_into()
    }

    async fn list_for_tenant(&self, tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM knowledge_chunks WHERE tenant_id = $1"
        ))
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list chunks for tenant", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_incomplete(&self, tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM knowledge_chunks
              WHERE tenant_id = $1 AND completion_status <> 'complete'"
        ))
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list incomplete chunks", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_embedding_versions(
        &self,
        tenant: TenantId,
    ) -> KbResult<Vec<(Option<String>, Option<String>, i64)>> {
        let rows: Vec<(Option<String>, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT embedding_model, embedding_version, COUNT(*)
                 FROM knowledge_chunks
                WHERE tenant_id = $1
                GROUP BY embedding_model, embedding_version"#,
        )
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list embedding version distribution", e))?;
        Ok(rows)
    }
}
