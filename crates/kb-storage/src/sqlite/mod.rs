//! SQLite-backed implementation of [`crate::traits::Repositories`] — the
//! embedded development backend named in the design notes: no external
//! Postgres required to run `kb-cli` locally or in CI.
//!
//! Schema shapes mirror the Postgres migration with two adaptations:
//! JSONB columns become `TEXT` holding serialized JSON, and the
//! `pg_advisory_xact_lock` publish serialization becomes an in-process
//! mutex keyed by the same `(product, locale, trim, market)` tuple, since
//! there is exactly one process talking to the database file in dev mode.

mod campaign;
mod chunk;
mod comparison;
mod ops;
mod product;
mod spec;
mod tenant;

use crate::traits::{
    CampaignVariantRepository, ComparisonRepository, DocumentSourceRepository, DriftRepository,
    FeatureBlockRepository, IngestionJobRepository, KnowledgeChunkRepository, LineageRepository,
    ProductRepository, PurgeRepository, Repositories, SpecCatalogRepository, SpecValueRepository,
    TenantRepository,
};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use campaign::SqliteCampaignVariantRepository;
pub use chunk::SqliteKnowledgeChunkRepository;
pub use comparison::SqliteComparisonRepository;
pub use ops::{
    SqliteDriftRepository, SqliteIngestionJobRepository, SqliteLineageRepository,
    SqlitePurgeRepository,
};
pub use product::{SqliteDocumentSourceRepository, SqliteProductRepository};
pub use spec::{SqliteFeatureBlockRepository, SqliteSpecCatalogRepository, SqliteSpecValueRepository};
pub use tenant::SqliteTenantRepository;

/// Keys currently held by a publish guard; a second `lock_for_publish`
/// call for the same key blocks until the first guard commits or drops.
pub(crate) type PublishLocks = Arc<Mutex<HashSet<i64>>>;

pub struct SqliteRepositories {
    tenants: SqliteTenantRepository,
    products: SqliteProductRepository,
    campaigns: SqliteCampaignVariantRepository,
    documents: SqliteDocumentSourceRepository,
    spec_catalog: SqliteSpecCatalogRepository,
    spec_values: SqliteSpecValueRepository,
    feature_blocks: SqliteFeatureBlockRepository,
    chunks: SqliteKnowledgeChunkRepository,
    comparisons: SqliteComparisonRepository,
    jobs: SqliteIngestionJobRepository,
    lineage: SqliteLineageRepository,
    drift: SqliteDriftRepository,
    purge: SqlitePurgeRepository,
}

impl SqliteRepositories {
    pub fn new(pool: SqlitePool) -> Self {
        let locks: PublishLocks = Arc::new(Mutex::new(HashSet::new()));
        Self {
            tenants: SqliteTenantRepository::new(pool.clone()),
            products: SqliteProductRepository::new(pool.clone()),
            campaigns: SqliteCampaignVariantRepository::new(pool.clone(), locks),
            documents: SqliteDocumentSourceRepository::new(pool.clone()),
            spec_catalog: SqliteSpecCatalogRepository::new(pool.clone()),
            spec_values: SqliteSpecValueRepository::new(pool.clone()),
            feature_blocks: SqliteFeatureBlockRepository::new(pool.clone()),
            chunks: SqliteKnowledgeChunkRepository::new(pool.clone()),
            comparisons: SqliteComparisonRepository::new(pool.clone()),
            jobs: SqliteIngestionJobRepository::new(pool.clone()),
            lineage: SqliteLineageRepository::new(pool.clone()),
            drift: SqliteDriftRepository::new(pool.clone()),
            purge: SqlitePurgeRepository::new(pool),
        }
    }
}

impl Repositories for SqliteRepositories {
    fn tenants(&self) -> &dyn TenantRepository {
        &self.tenants
    }
    fn products(&self) -> &dyn ProductRepository {
        &self.products
    }
    fn campaigns(&self) -> &dyn CampaignVariantRepository {
        &self.campaigns
    }
    fn documents(&self) -> &dyn DocumentSourceRepository {
        &self.documents
    }
    fn spec_catalog(&self) -> &dyn SpecCatalogRepository {
        &self.spec_catalog
    }
    fn spec_values(&self) -> &dyn SpecValueRepository {
        &self.spec_values
    }
    fn feature_blocks(&self) -> &dyn FeatureBlockRepository {
        &self.feature_blocks
    }
    fn chunks(&self) -> &dyn KnowledgeChunkRepository {
        &self.chunks
    }
    fn comparisons(&self) -> &dyn ComparisonRepository {
        &self.comparisons
    }
    fn jobs(&self) -> &dyn IngestionJobRepository {
        &self.jobs
    }
    fn lineage(&self) -> &dyn LineageRepository {
        &self.lineage
    }
    fn drift(&self) -> &dyn DriftRepository {
        &self.drift
    }
    fn purge(&self) -> &dyn PurgeRepository {
        &self.purge
    }
}
