//! Wires [`KbConfig`] into a concrete `Arc<dyn Repositories>`, embedding
//! provider, and vector adapter, running schema migrations against
//! whichever backend was selected. Kept separate from `main.rs` so both
//! the CLI subcommands and the HTTP server share one bootstrap path.

use crate::config::{Backend, KbConfig, VectorBackend};
use kb_embedding::{EmbeddingProvider, HttpEmbeddingProvider, StubEmbeddingProvider};
use kb_storage::{PgRepositories, Repositories, SqliteRepositories};
use kb_vector::{InMemoryVectorAdapter, PgVectorAdapter, VectorAdapter};
use std::sync::Arc;

pub struct Runtime {
    pub repos: Arc<dyn Repositories>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vectors: Arc<dyn VectorAdapter>,
}

pub async fn build(config: &KbConfig) -> anyhow::Result<Runtime> {
    let repos: Arc<dyn Repositories> = match config.backend {
        Backend::Postgres => {
            let pool = sqlx::PgPool::connect(&config.database_url).await?;
            sqlx::migrate!("../kb-storage/migrations").run(&pool).await?;
            Arc::new(PgRepositories::new(pool))
        }
        Backend::Sqlite => {
            let pool = sqlx::SqlitePool::connect(&config.database_url).await?;
            sqlx::migrate!("../kb-storage/migrations_sqlite").run(&pool).await?;
            Arc::new(SqliteRepositories::new(pool))
        }
    };

    let embedder: Arc<dyn EmbeddingProvider> = match &config.embedding_endpoint {
        Some(endpoint) => Arc::new(HttpEmbeddingProvider::new(
            endpoint.clone(),
            config.embedding_api_key.clone().unwrap_or_default(),
            config.embedding_version.clone(),
        )),
        // No endpoint configured: fall back to the deterministic stub so
        // `kb-cli` runs end-to-end without a live embedding provider
        // (dev mode, CI, demos).
        None => Arc::new(StubEmbeddingProvider::new(256)),
    };

    let vectors: Arc<dyn VectorAdapter> = match (config.vector_backend, config.backend) {
        (VectorBackend::Pgvector, Backend::Postgres) => {
            let pool = sqlx::PgPool::connect(&config.database_url).await?;
            Arc::new(PgVectorAdapter::new(pool))
        }
        _ => Arc::new(InMemoryVectorAdapter::new()),
    };

    Ok(Runtime { repos, embedder, vectors })
}
