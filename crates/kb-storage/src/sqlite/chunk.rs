use crate::error_map::{map_sqlx_err, not_found};
use crate::traits::KnowledgeChunkRepository;
use async_trait::async_trait;
use kb_core::{
    CampaignVariantId, ChunkMetadata, ChunkType, ChunkVisibility, CompletionStatus, KbResult,
    KnowledgeChunk, KnowledgeChunkId, ProductId, TenantId,
};
use sqlx::{FromRow, SqlitePool};

fn parse_uuid(s: &str, what: &str) -> Result<uuid::Uuid, kb_core::KbError> {
    uuid::Uuid::parse_str(s).map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode {what}: {e}")))
}

#[derive(FromRow)]
struct ChunkRow {
    id: String,
    tenant_id: String,
    product_id: String,
    campaign_variant_id: Option<String>,
    chunk_type: String,
    text: String,
    metadata: String,
    embedding_vector: Option<String>,
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
        let metadata: ChunkMetadata = serde_json::from_str(&r.metadata)
            .map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("decode chunk metadata: {e}")))?;
        Ok(KnowledgeChunk {
            id: KnowledgeChunkId(parse_uuid(&r.id, "chunk id")?),
            tenant_id: TenantId(parse_uuid(&r.tenant_id, "tenant id")?),
            product_id: ProductId(parse_uuid(&r.product_id, "product id")?),
            campaign_variant_id: r
                .campaign_variant_id
                .map(|s| parse_uuid(&s, "campaign variant id"))
                .transpose()?
                .map(CampaignVariantId),
            chunk_type: parse_chunk_type(&r.chunk_type),
            text: r.text,
            metadata,
            embedding_vector: r.embedding_vector.and_then(|v| serde_json::from_str(&v).ok()),
            embedding_model: r.embedding_model,
            embedding_version: r.embedding_version,
            content_hash: r.content_hash,
            completion_status: parse_completion_status(&r.completion_status),
            visibility: parse_visibility(&r.visibility),
        })
    }
}

pub struct SqliteKnowledgeChunkRepository {
    pool: SqlitePool,
}

impl SqliteKnowledgeChunkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_COLS: &str = "id, tenant_id, product_id, campaign_variant_id, chunk_type, text, \
    metadata, embedding_vector, embedding_model, embedding_version, content_hash, \
    completion_status, visibility";

#[async_trait]
impl KnowledgeChunkRepository for SqliteKnowledgeChunkRepository {
    async fn find_by_content_hash(
        &self,
        tenant: TenantId,
        hash: &str,
    ) -> KbResult<Option<KnowledgeChunk>> {
        let row: Option<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM knowledge_chunks WHERE tenant_id = ? AND content_hash = ?"
        ))
        .bind(tenant.0.to_string())
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("find chunk by content hash", e))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn insert(&self, chunk: &KnowledgeChunk) -> KbResult<()> {
        let metadata = serde_json::to_string(&chunk.metadata)
            .map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("encode chunk metadata: {e}")))?;
        sqlx::query(
            "INSERT INTO knowledge_chunks (id, tenant_id, product_id, campaign_variant_id, \
             chunk_type, text, metadata, embedding_vector, embedding_model, embedding_version, \
             content_hash, completion_status, visibility) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?) \
             ON CONFLICT (tenant_id, content_hash) WHERE content_hash IS NOT NULL DO NOTHING",
        )
        .bind(chunk.id.0.to_string())
        .bind(chunk.tenant_id.0.to_string())
        .bind(chunk.product_id.0.to_string())
        .bind(chunk.campaign_variant_id.map(|id| id.0.to_string()))
        .bind(chunk_type_str(chunk.chunk_type))
        .bind(&chunk.text)
        .bind(&metadata)
        .bind(chunk.embedding_vector.as_ref().map(|v| serde_json::to_string(v).unwrap()))
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
        let metadata = serde_json::to_string(&chunk.metadata)
            .map_err(|e| kb_core::KbError::Internal(anyhow::anyhow!("encode chunk metadata: {e}")))?;
        sqlx::query(
            "UPDATE knowledge_chunks SET metadata = ?, embedding_vector = ?, embedding_model = ?, \
             embedding_version = ?, completion_status = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(&metadata)
        .bind(chunk.embedding_vector.as_ref().map(|v| serde_json::to_string(v).unwrap()))
        .bind(&chunk.embedding_model)
        .bind(&chunk.embedding_version)
        .bind(completion_status_str(chunk.completion_status))
        .bind(chunk.tenant_id.0.to_string())
        .bind(chunk.id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("update chunk metadata/embedding", e))?;
        Ok(())
    }

    async fn get(&self, tenant: TenantId, id: KnowledgeChunkId) -> KbResult<KnowledgeChunk> {
        let row: ChunkRow = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM knowledge_chunks WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant.0.to_string())
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("get knowledge chunk", e))?
        .ok_or_else(|| not_found(format!("knowledge chunk {id}")))?;
        row.try_into()
    }

    async fn list_for_tenant(&self, tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM knowledge_chunks WHERE tenant_id = ?"
        ))
        .bind(tenant.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list chunks for tenant", e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_incomplete(&self, tenant: TenantId) -> KbResult<Vec<KnowledgeChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM knowledge_chunks WHERE tenant_id = ? AND completion_status <> 'complete'"
        ))
        .bind(tenant.0.to_string())
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
            "SELECT embedding_model, embedding_version, COUNT(*) FROM knowledge_chunks \
             WHERE tenant_id = ? GROUP BY embedding_model, embedding_version",
        )
        .bind(tenant.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("list embedding version distribution", e))?;
        Ok(rows)
    }
}
