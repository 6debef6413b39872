use crate::adapter::{l2_normalize, VectorAdapter, VectorEntry, VectorFilter, VectorMatch};
use async_trait::async_trait;
use kb_core::{ChunkType, KbError, KbResult, KnowledgeChunkId};
use pgvector::Vector;
use sqlx::PgPool;
use tracing::info;

/// Production vector adapter: a dedicated `chunk_vectors` table with an
/// ivfflat cosine index (spec §4.5: "filtering pushed down to the
/// backend; ANN index type is implementation-defined").
pub struct PgVectorAdapter {
    pool: PgPool,
}

impl PgVectorAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn chunk_type_str(chunk_type: ChunkType) -> &'static str {
        match chunk_type {
            ChunkType::SpecRow => "spec_row",
            ChunkType::FeatureBlock => "feature_block",
            ChunkType::Usp => "usp",
            ChunkType::Faq => "faq",
            ChunkType::Comparison => "comparison",
            ChunkType::Global => "global",
        }
    }

    async fn write(&self, entries: Vec<VectorEntry>) -> KbResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| kb_storage_err(e))?;
        for entry in entries {
            let mut vector = entry.vector;
            l2_normalize(&mut vector);
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors
                    (chunk_id, tenant_id, product_id, campaign_variant_id, chunk_type, embedding_model, embedding_version, embedding)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (chunk_id) DO UPDATE SET
                    campaign_variant_id = EXCLUDED.campaign_variant_id,
                    chunk_type = EXCLUDED.chunk_type,
                    embedding_model = EXCLUDED.embedding_model,
                    embedding_version = EXCLUDED.embedding_version,
                    embedding = EXCLUDED.embedding
                "#,
            )
            .bind(entry.chunk_id.0)
            .bind(entry.tenant_id.0)
            .bind(entry.product_id.0)
            .bind(entry.campaign_variant_id.map(|id| id.0))
            .bind(Self::chunk_type_str(entry.chunk_type))
            .bind(&entry.model)
            .bind(&entry.version)
            .bind(Vector::from(vector))
            .execute(&mut *tx)
            .await
            .map_err(|e| kb_storage_err(e))?;
        }
        tx.commit().await.map_err(|e| kb_storage_err(e))?;
        Ok(())
    }
}

fn kb_storage_err(err: sqlx::Error) -> KbError {
    KbError::Dependency(format!("chunk_vectors operation failed: {err}"))
}

#[async_trait]
impl VectorAdapter for PgVectorAdapter {
    async fn insert(&self, entries: Vec<VectorEntry>) -> KbResult<()> {
        self.write(entries).await
    }

    async fn upsert(&self, entries: Vec<VectorEntry>) -> KbResult<()> {
        self.write(entries).await
    }

    async fn delete(&self, ids: &[KnowledgeChunkId]) -> KbResult<()> {
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.0).collect();
        sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ANY($1)")
            .bind(&ids)
            .execute(&self.pool)
            .await
            .map_err(kb_storage_err)?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        model: &str,
        version: &str,
        filter: &VectorFilter,
        k: usize,
    ) -> KbResult<Vec<VectorMatch>> {
        let mut query = query_vector.to_vec();
        l2_normalize(&mut query);
        let query = Vector::from(query);

        let product_ids: Vec<uuid::Uuid> = filter.product_ids.iter().map(|id| id.0).collect();
        let chunk_type_filter = filter.chunk_type.map(Self::chunk_type_str);

        let rows = sqlx::query_as::<_, (uuid::Uuid, f64)>(
            r#"
            SELECT chunk_id, 1.0 - (embedding <=> $1) AS similarity
            FROM chunk_vectors
            WHERE embedding_model = $2
              AND embedding_version = $3
              AND ($4::uuid IS NULL OR tenant_id = $4)
              AND ($5::uuid[] IS NULL OR cardinality($5::uuid[]) = 0 OR product_id = ANY($5))
              AND ($6::uuid IS NULL OR campaign_variant_id = $6)
              AND ($7::text IS NULL OR chunk_type = $7)
            ORDER BY embedding <=> $1
            LIMIT $8
            "#,
        )
        .bind(query)
        .bind(model)
        .bind(version)
        .bind(filter.tenant_id.map(|id| id.0))
        .bind(&product_ids)
        .bind(filter.campaign_variant_id.map(|id| id.0))
        .bind(chunk_type_filter)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(kb_storage_err)?;

        Ok(rows
            .into_iter()
            .map(|(chunk_id, similarity)| VectorMatch { chunk_id: KnowledgeChunkId(chunk_id), similarity: similarity as f32 })
            .collect())
    }

    async fn load_all(&self, entries: Vec<VectorEntry>) -> KbResult<()> {
        // The table is already durable; load_all here is a reconciling
        // upsert rather than a from-scratch rehydration.
        let count = entries.len();
        self.write(entries).await?;
        info!(count, "pgvector chunk_vectors reconciled");
        Ok(())
    }
}
