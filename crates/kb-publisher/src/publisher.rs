use chrono::Utc;
use kb_core::{CampaignStatus, CampaignVariantId, KbError, KbResult, LineageAction, ProductId, TenantId};
use kb_storage::Repositories;
use std::sync::Arc;
use tracing::info;

/// Outcome of a successful [`Publisher::publish`] (spec §6: `{campaign_id,
/// version, effective_from}`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishOutcome {
    pub campaign_variant_id: CampaignVariantId,
    pub version: i32,
    pub effective_from: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RollbackOutcome {
    pub campaign_variant_id: CampaignVariantId,
    pub version: i32,
}

/// Drives the draft/published/archived state machine. Holds no state of
/// its own beyond the repository bundle; every transition is a single
/// advisory-lock-guarded sequence of repository calls.
pub struct Publisher {
    repos: Arc<dyn Repositories>,
}

impl Publisher {
    pub fn new(repos: Arc<dyn Repositories>) -> Self {
        Self { repos }
    }

    /// `publish(draft)` (spec §4.3): atomically promotes the draft variant
    /// for `(product, locale, trim, market)` to `published`, archiving
    /// whatever was published before it. Fails with `Conflict` if there is
    /// no draft.
    pub async fn publish(
        &self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<PublishOutcome> {
        let campaigns = self.repos.campaigns();

        let draft = campaigns
            .find_draft(tenant, product, locale, trim, market)
            .await?
            .ok_or_else(|| KbError::Conflict("no draft campaign variant to publish".to_string()))?;

        let guard = campaigns.lock_for_publish(tenant, product, locale, trim, market).await?;

        let prior_published = campaigns.find_published(tenant, product, locale, trim, market).await?;
        let new_version = prior_published.as_ref().map(|p| p.version + 1).unwrap_or(draft.version);
        let now = Utc::now();

        campaigns
            .set_status(draft.id, CampaignStatus::Published, new_version, Some(now), None)
            .await?;

        if let Some(prior) = &prior_published {
            campaigns
                .set_status(prior.id, CampaignStatus::Archived, prior.version, prior.effective_from, Some(now))
                .await?;
        }

        self.repos.products().set_default_campaign_variant(tenant, product, Some(draft.id)).await?;

        self.repos
            .lineage()
            .append(
                tenant,
                "campaign_variant",
                &draft.id.to_string(),
                LineageAction::Reconciled,
                serde_json::json!({"action": "publish", "version": new_version}),
            )
            .await?;

        guard.commit().await?;

        info!(campaign_variant_id = %draft.id, version = new_version, "campaign variant published");
        Ok(PublishOutcome { campaign_variant_id: draft.id, version: new_version, effective_from: now })
    }

    /// `rollback(published)` (spec §4.3): re-activates the most recent
    /// archived variant for `(product, locale, trim, market)`, preserving
    /// its original version (no monotonic bump on rollback).
    pub async fn rollback(
        &self,
        tenant: TenantId,
        product: ProductId,
        locale: &str,
        trim: Option<&str>,
        market: Option<&str>,
    ) -> KbResult<RollbackOutcome> {
        let campaigns = self.repos.campaigns();

        let published = campaigns
            .find_published(tenant, product, locale, trim, market)
            .await?
            .ok_or_else(|| KbError::NotFound("no published campaign variant to roll back".to_string()))?;

        let guard = campaigns.lock_for_publish(tenant, product, locale, trim, market).await?;

        let archived = campaigns
            .find_latest_archived(tenant, product, locale, trim, market)
            .await?
            .ok_or_else(|| KbError::NotFound("no archived campaign variant to roll back to".to_string()))?;

        let now = Utc::now();

        campaigns
            .set_status(published.id, CampaignStatus::Archived, published.version, published.effective_from, Some(now))
            .await?;

        campaigns
            .set_status(archived.id, CampaignStatus::Published, archived.version, Some(now), None)
            .await?;

        self.repos.products().set_default_campaign_variant(tenant, product, Some(archived.id)).await?;

        self.repos
            .lineage()
            .append(
                tenant,
                "campaign_variant",
                &archived.id.to_string(),
                LineageAction::Reconciled,
                serde_json::json!({"action": "rollback", "rolled_back_to_version": archived.version}),
            )
            .await?;

        guard.commit().await?;

        info!(campaign_variant_id = %archived.id, version = archived.version, "campaign variant rolled back");
        Ok(RollbackOutcome { campaign_variant_id: archived.id, version: archived.version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kb_core::{CampaignVariant, LineageEvent, LineageEventId, Product};
    use kb_storage::traits::{
        CampaignVariantRepository, LineageRepository, ProductRepository, PublishGuard, Repositories,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProducts {
        default_campaign_variant: Mutex<Option<CampaignVariantId>>,
    }

    #[async_trait]
    impl ProductRepository for FakeProducts {
        async fn create(&self, _product: &Product) -> KbResult<()> {
            unimplemented!("not exercised by publisher tests")
        }
        async fn get(&self, _tenant: TenantId, _id: ProductId) -> KbResult<Product> {
            unimplemented!("not exercised by publisher tests")
        }
        async fn get_by_name(&self, _tenant: TenantId, _name: &str) -> KbResult<Option<Product>> {
            unimplemented!("not exercised by publisher tests")
        }
        async fn list(&self, _tenant: TenantId) -> KbResult<Vec<Product>> {
            unimplemented!("not exercised by publisher tests")
        }
        async fn list_comparable(&self, _tenant: TenantId, _product: ProductId) -> KbResult<Vec<Product>> {
            unimplemented!("not exercised by publisher tests")
        }
        async fn set_default_campaign_variant(
            &self,
            _tenant: TenantId,
            _product: ProductId,
            campaign_variant: Option<CampaignVariantId>,
        ) -> KbResult<()> {
            *self.default_campaign_variant.lock().unwrap() = campaign_variant;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCampaigns {
        variants: Mutex<Vec<CampaignVariant>>,
    }

    struct NoopGuard;

    #[async_trait]
    impl PublishGuard for NoopGuard {
        async fn commit(self: Box<Self>) -> KbResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl CampaignVariantRepository for FakeCampaigns {
        async fn create_draft(&self, variant: &CampaignVariant) -> KbResult<()> {
            self.variants.lock().unwrap().push(variant.clone());
            Ok(())
        }

        async fn get(&self, _tenant: TenantId, id: CampaignVariantId) -> KbResult<CampaignVariant> {
            self.variants
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.id == id)
                .cloned()
                .ok_or_else(|| KbError::NotFound("campaign variant".to_string()))
        }

        async fn find_draft(
            &self,
            _tenant: TenantId,
            product: ProductId,
            locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Option<CampaignVariant>> {
            Ok(self
                .variants
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.product_id == product && v.locale == locale && v.status == CampaignStatus::Draft)
                .cloned())
        }

        async fn find_published(
            &self,
            _tenant: TenantId,
            product: ProductId,
            locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Option<CampaignVariant>> {
            Ok(self
                .variants
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.product_id == product && v.locale == locale && v.status == CampaignStatus::Published)
                .cloned())
        }

        async fn find_latest_archived(
            &self,
            _tenant: TenantId,
            product: ProductId,
            locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Option<CampaignVariant>> {
            Ok(self
                .variants
                .lock()
                .unwrap()
                .iter()
                .filter(|v| v.product_id == product && v.locale == locale && v.status == CampaignStatus::Archived)
                .max_by_key(|v| v.version)
                .cloned())
        }

        async fn list_published(&self, _tenant: TenantId) -> KbResult<Vec<CampaignVariant>> {
            Ok(self
                .variants
                .lock()
                .unwrap()
                .iter()
                .filter(|v| v.status == CampaignStatus::Published)
                .cloned()
                .collect())
        }

        async fn set_status(
            &self,
            id: CampaignVariantId,
            status: CampaignStatus,
            version: i32,
            effective_from: Option<chrono::DateTime<Utc>>,
            effective_through: Option<chrono::DateTime<Utc>>,
        ) -> KbResult<()> {
            let mut variants = self.variants.lock().unwrap();
            let variant = variants.iter_mut().find(|v| v.id == id).expect("variant exists");
            variant.status = status;
            variant.version = version;
            variant.effective_from = effective_from;
            variant.effective_through = effective_through;
            Ok(())
        }

        async fn lock_for_publish<'a>(
            &'a self,
            _tenant: TenantId,
            _product: ProductId,
            _locale: &str,
            _trim: Option<&str>,
            _market: Option<&str>,
        ) -> KbResult<Box<dyn PublishGuard + 'a>> {
            Ok(Box::new(NoopGuard))
        }
    }

    #[derive(Default)]
    struct FakeLineage {
        events: Mutex<Vec<(String, LineageAction)>>,
    }

    #[async_trait]
    impl LineageRepository for FakeLineage {
        async fn append(
            &self,
            _tenant: TenantId,
            resource_type: &str,
            resource_id: &str,
            action: LineageAction,
            _payload: serde_json::Value,
        ) -> KbResult<LineageEventId> {
            self.events.lock().unwrap().push((format!("{resource_type}:{resource_id}"), action));
            Ok(LineageEventId::new())
        }

        async fn list_for_resource(
            &self,
            _tenant: TenantId,
            _resource_type: &str,
            _resource_id: &str,
        ) -> KbResult<Vec<LineageEvent>> {
            Ok(Vec::new())
        }
    }

    struct FakeRepos {
        products: FakeProducts,
        campaigns: FakeCampaigns,
        lineage: FakeLineage,
    }

    impl Repositories for FakeRepos {
        fn tenants(&self) -> &dyn kb_storage::traits::TenantRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn products(&self) -> &dyn kb_storage::traits::ProductRepository {
            &self.products
        }
        fn campaigns(&self) -> &dyn CampaignVariantRepository {
            &self.campaigns
        }
        fn documents(&self) -> &dyn kb_storage::traits::DocumentSourceRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn spec_catalog(&self) -> &dyn kb_storage::traits::SpecCatalogRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn spec_values(&self) -> &dyn kb_storage::traits::SpecValueRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn feature_blocks(&self) -> &dyn kb_storage::traits::FeatureBlockRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn chunks(&self) -> &dyn kb_storage::traits::KnowledgeChunkRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn comparisons(&self) -> &dyn kb_storage::traits::ComparisonRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn jobs(&self) -> &dyn kb_storage::traits::IngestionJobRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn lineage(&self) -> &dyn LineageRepository {
            &self.lineage
        }
        fn drift(&self) -> &dyn kb_storage::traits::DriftRepository {
            unimplemented!("not exercised by publisher tests")
        }
        fn purge(&self) -> &dyn kb_storage::traits::PurgeRepository {
            unimplemented!("not exercised by publisher tests")
        }
    }

    fn draft_variant(product: ProductId) -> CampaignVariant {
        CampaignVariant {
            id: CampaignVariantId::new(),
            product_id: product,
            tenant_id: TenantId::new(),
            locale: "en-US".to_string(),
            trim: None,
            market: None,
            status: CampaignStatus::Draft,
            version: 1,
            effective_from: None,
            effective_through: None,
        }
    }

    #[tokio::test]
    async fn publish_promotes_draft_and_archives_prior_published() {
        let tenant = TenantId::new();
        let product = ProductId::new();
        let mut published = draft_variant(product);
        published.status = CampaignStatus::Published;
        published.version = 1;
        let draft = draft_variant(product);

        let repos: Arc<dyn Repositories> = Arc::new(FakeRepos {
            products: FakeProducts::default(),
            campaigns: FakeCampaigns { variants: Mutex::new(vec![published.clone(), draft.clone()]) },
            lineage: FakeLineage::default(),
        });

        let publisher = Publisher::new(repos.clone());
        let outcome = publisher.publish(tenant, product, "en-US", None, None).await.unwrap();

        assert_eq!(outcome.version, 2);
        let new_published = repos.campaigns().get(tenant, draft.id).await.unwrap();
        assert_eq!(new_published.status, CampaignStatus::Published);
        let old = repos.campaigns().get(tenant, published.id).await.unwrap();
        assert_eq!(old.status, CampaignStatus::Archived);
    }

    #[tokio::test]
    async fn publish_without_draft_is_a_conflict() {
        let tenant = TenantId::new();
        let product = ProductId::new();
        let repos: Arc<dyn Repositories> = Arc::new(FakeRepos {
            products: FakeProducts::default(),
            campaigns: FakeCampaigns::default(),
            lineage: FakeLineage::default(),
        });

        let publisher = Publisher::new(repos);
        let err = publisher.publish(tenant, product, "en-US", None, None).await.unwrap_err();
        assert!(matches!(err, KbError::Conflict(_)));
    }

    #[tokio::test]
    async fn rollback_reactivates_archived_without_bumping_version() {
        let tenant = TenantId::new();
        let product = ProductId::new();
        let mut archived = draft_variant(product);
        archived.status = CampaignStatus::Archived;
        archived.version = 1;
        let mut published = draft_variant(product);
        published.status = CampaignStatus::Published;
        published.version = 2;

        let repos: Arc<dyn Repositories> = Arc::new(FakeRepos {
            products: FakeProducts::default(),
            campaigns: FakeCampaigns { variants: Mutex::new(vec![archived.clone(), published.clone()]) },
            lineage: FakeLineage::default(),
        });

        let publisher = Publisher::new(repos.clone());
        let outcome = publisher.rollback(tenant, product, "en-US", None, None).await.unwrap();

        assert_eq!(outcome.version, 1);
        let reactivated = repos.campaigns().get(tenant, archived.id).await.unwrap();
        assert_eq!(reactivated.status, CampaignStatus::Published);
        assert_eq!(reactivated.version, 1);
        let demoted = repos.campaigns().get(tenant, published.id).await.unwrap();
        assert_eq!(demoted.status, CampaignStatus::Archived);
    }
}
