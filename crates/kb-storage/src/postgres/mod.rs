//! Postgres-backed implementation of the [`crate::traits::Repositories`]
//! bundle — the production backend (spec §4.1).

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
use sqlx::PgPool;

pub use campaign::PgCampaignVariantRepository;
pub use chunk::PgKnowledgeChunkRepository;
pub use comparison::PgComparisonRepository;
pub use ops::{PgDriftRepository, PgIngestionJobRepository, PgLineageRepository, PgPurgeRepository};
pub use product::{PgDocumentSourceRepository, PgProductRepository};
pub use spec::{PgFeatureBlockRepository, PgSpecCatalogRepository, PgSpecValueRepository};
pub use tenant::PgTenantRepository;

/// Bundles one repository per aggregate over a shared connection pool.
pub struct PgRepositories {
    tenants: PgTenantRepository,
    products: PgProductRepository,
    campaigns: PgCampaignVariantRepository,
    documents: PgDocumentSourceRepository,
    spec_catalog: PgSpecCatalogRepository,
    spec_values: PgSpecValueRepository,
    feature_blocks: PgFeatureBlockRepository,
    chunks: PgKnowledgeChunkRepository,
    comparisons: PgComparisonRepository,
    jobs: PgIngestionJobRepository,
    lineage: PgLineageRepository,
    drift: PgDriftRepository,
    purge: PgPurgeRepository,
}

impl PgRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tenants: PgTenantRepository::new(pool.clone()),
            products: PgProductRepository::new(pool.clone()),
            campaigns: PgCampaignVariantRepository::new(pool.clone()),
            documents: PgDocumentSourceRepository::new(pool.clone()),
            spec_catalog: PgSpecCatalogRepository::new(pool.clone()),
            spec_values: PgSpecValueRepository::new(pool.clone()),
            feature_blocks: PgFeatureBlockRepository::new(pool.clone()),
            chunks: PgKnowledgeChunkRepository::new(pool.clone()),
            comparisons: PgComparisonRepository::new(pool.clone()),
            jobs: PgIngestionJobRepository::new(pool.clone()),
            lineage: PgLineageRepository::new(pool.clone()),
            drift: PgDriftRepository::new(pool.clone()),
            purge: PgPurgeRepository::new(pool),
        }
    }
}

impl Repositories for PgRepositories {
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
