//! Process-wide configuration (SPEC_FULL §1 "Configuration"), loaded once
//! from the environment via `dotenvy` + `std::env` and immutable after
//! construction. Mirrors the teacher's `DATABASE_URL`-from-env convention
//! (`ob-poc-web::main`) rather than introducing a config-file format.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    InMemory,
    Pgvector,
}

#[derive(Debug, Clone)]
pub struct KbConfig {
    pub backend: Backend,
    pub database_url: String,
    pub vector_backend: VectorBackend,
    pub embedding_endpoint: Option<String>,
    pub embedding_api_key: Option<String>,
    pub embedding_model: String,
    pub embedding_version: String,
    pub keyword_confidence_threshold: f32,
    pub cache_ttl: Duration,
    pub server_port: u16,
}

impl KbConfig {
    /// Loads configuration from `.env` (if present) and the process
    /// environment. `DATABASE_URL` drives both the storage backend
    /// selection (a `sqlite:` scheme picks the embedded dev backend) and
    /// the pool that backend connects with.
    pub fn from_env() -> anyhow::Result<Self> {
        // A missing .env is not an error (SPEC_FULL: loaded once, absent
        // in production containers where env vars are injected directly).
        let _ = dotenvy::dotenv();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./brochure-kb.sqlite3".to_string());
        let backend = if database_url.starts_with("sqlite:") {
            Backend::Sqlite
        } else {
            Backend::Postgres
        };

        let vector_backend = match env::var("VECTOR_BACKEND").ok().as_deref() {
            Some("pgvector") => VectorBackend::Pgvector,
            _ => VectorBackend::InMemory,
        };

        let keyword_confidence_threshold = env::var("KEYWORD_CONFIDENCE_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(kb_retrieval::KEYWORD_CONFIDENCE_THRESHOLD);

        let cache_ttl_secs: u64 = env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(kb_retrieval::DEFAULT_TTL.as_secs());

        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            backend,
            database_url,
            vector_backend,
            embedding_endpoint: env::var("EMBEDDING_ENDPOINT").ok(),
            embedding_api_key: env::var("EMBEDDING_API_KEY").ok(),
            embedding_model: env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-stub".to_string()),
            embedding_version: env::var("EMBEDDING_VERSION").unwrap_or_else(|_| "v1".to_string()),
            keyword_confidence_threshold,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            server_port,
        })
    }
}
