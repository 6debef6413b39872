use chrono::Utc;
use kb_core::{
    ComparisonRow, ComparisonRowId, ComparisonVerdict, KbError, KbResult, Product, ProductId,
    Shareability, SpecItemId, SpecPayload, SpecValue, TenantId,
};
use kb_storage::Repositories;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A product's own comparison-visibility label. Products default to
/// `Tenant` (visible within their owning tenant); `is_public_benchmark`
/// promotes them to `Public`. There is no per-product `Private` tier —
/// that granularity lives on individual `FeatureBlock`s.
fn product_shareability(product: &Product) -> Shareability {
    if product.is_public_benchmark {
        Shareability::Public
    } else {
        Shareability::Tenant
    }
}

fn payload_to_string(payload: &SpecPayload) -> String {
    match payload {
        SpecPayload::Numeric(n) => n.to_string(),
        SpecPayload::Text(s) => s.clone(),
    }
}

fn compute_verdict(primary: &SpecValue, secondary: &SpecValue) -> ComparisonVerdict {
    match (&primary.payload, &secondary.payload) {
        (SpecPayload::Numeric(a), SpecPayload::Numeric(b)) => {
            let units_match = match (&primary.unit, &secondary.unit) {
                (Some(pu), Some(su)) => pu.eq_ignore_ascii_case(su),
                (None, None) => true,
                _ => false,
            };
            if !units_match {
                ComparisonVerdict::CannotCompare
            } else if (a - b).abs() < 1e-9 {
                ComparisonVerdict::Equal
            } else if a > b {
                ComparisonVerdict::PrimaryBetter
            } else {
                ComparisonVerdict::SecondaryBetter
            }
        }
        (SpecPayload::Text(a), SpecPayload::Text(b)) => {
            if a.eq_ignore_ascii_case(b) {
                ComparisonVerdict::Equal
            } else {
                ComparisonVerdict::CannotCompare
            }
        }
        _ => ComparisonVerdict::CannotCompare,
    }
}

fn narrative(
    dimension: &str,
    primary_name: &str,
    secondary_name: &str,
    primary: &SpecValue,
    secondary: &SpecValue,
    verdict: ComparisonVerdict,
) -> Option<String> {
    match verdict {
        ComparisonVerdict::PrimaryBetter | ComparisonVerdict::SecondaryBetter => {
            let (SpecPayload::Numeric(a), SpecPayload::Numeric(b)) = (&primary.payload, &secondary.payload) else {
                return None;
            };
            if *b == 0.0 {
                return None;
            }
            let pct = ((a - b).abs() / b.abs()) * 100.0;
            let (winner, loser) = if verdict == ComparisonVerdict::PrimaryBetter {
                (primary_name, secondary_name)
            } else {
                (secondary_name, primary_name)
            };
            Some(format!("{winner} has {pct:.0}% higher {dimension} than {loser}"))
        }
        ComparisonVerdict::Equal => Some(format!("{primary_name} and {secondary_name} have the same {dimension}")),
        ComparisonVerdict::CannotCompare => None,
    }
}

/// Computes and persists `ComparisonRow`s for a primary/secondary product
/// pair, or re-materializes every comparable pair for a product on
/// publish.
pub struct Materializer {
    repos: Arc<dyn Repositories>,
}

impl Materializer {
    pub fn new(repos: Arc<dyn Repositories>) -> Self {
        Self { repos }
    }

    /// Public `Compare` operation (spec §6): `{tenant, primary, secondary,
    /// dimensions?}`. Denies with `Shareability` if `secondary` is not in
    /// `primary`'s comparable set for `tenant`, leaking no rows.
    pub async fn compare(
        &self,
        tenant: TenantId,
        primary: ProductId,
        secondary: ProductId,
        dimensions: Option<&[String]>,
    ) -> KbResult<Vec<ComparisonRow>> {
        let primary_product = self.repos.products().get(tenant, primary).await?;
        let comparable = self.repos.products().list_comparable(tenant, primary).await?;
        let secondary_product = comparable
            .into_iter()
            .find(|p| p.id == secondary)
            .ok_or_else(|| KbError::Shareability(format!("{secondary} is not comparable against {primary} for this tenant")))?;

        let rows = self.materialize_pair(&primary_product, &secondary_product).await?;
        for row in &rows {
            self.repos.comparisons().upsert(row).await?;
        }

        Ok(match dimensions {
            Some(dims) => rows.into_iter().filter(|r| dims.iter().any(|d| d == &r.dimension)).collect(),
            None => rows,
        })
    }

    /// Re-materializes every comparable pair for `product` (spec §4.6:
    /// "runs on demand ... and on publish events for affected products").
    pub async fn materialize_for_product(&self, tenant: TenantId, product: ProductId) -> KbResult<usize> {
        let primary_product = self.repos.products().get(tenant, product).await?;
        let comparable = self.repos.products().list_comparable(tenant, product).await?;
        let mut total = 0;
        for secondary_product in &comparable {
            let rows = self.materialize_pair(&primary_product, secondary_product).await?;
            for row in &rows {
                self.repos.comparisons().upsert(row).await?;
            }
            total += rows.len();
        }
        info!(product = %product, pairs = comparable.len(), rows = total, "comparison rows materialized");
        Ok(total)
    }

    async fn materialize_pair(&self, primary_product: &Product, secondary_product: &Product) -> KbResult<Vec<ComparisonRow>> {
        let primary_values = self
            .repos
            .spec_values()
            .active_for_published(primary_product.tenant_id, primary_product.id)
            .await?;
        let secondary_values = self
            .repos
            .spec_values()
            .active_for_published(secondary_product.tenant_id, secondary_product.id)
            .await?;

        let secondary_by_item: HashMap<SpecItemId, &SpecValue> =
            secondary_values.iter().map(|v| (v.spec_item_id, v)).collect();

        let shareability = product_shareability(primary_product).min(product_shareability(secondary_product));
        let now = Utc::now();
        let mut rows = Vec::new();

        for primary_value in &primary_values {
            let Some(secondary_value) = secondary_by_item.get(&primary_value.spec_item_id) else {
                continue;
            };
            let item = self.repos.spec_catalog().get_item(primary_value.spec_item_id).await?;
            let verdict = compute_verdict(primary_value, secondary_value);
            let narrative_text = narrative(
                &item.display_name,
                &primary_product.name,
                &secondary_product.name,
                primary_value,
                secondary_value,
                verdict,
            );

            rows.push(ComparisonRow {
                id: ComparisonRowId::new(),
                primary_product_id: primary_product.id,
                secondary_product_id: secondary_product.id,
                dimension: item.display_name,
                primary_value: Some(payload_to_string(&primary_value.payload)),
                secondary_value: Some(payload_to_string(&secondary_value.payload)),
                verdict,
                narrative: narrative_text,
                shareability,
                source_primary_spec_id: Some(primary_value.id),
                source_secondary_spec_id: Some(secondary_value.id),
                computed_at: now,
            });
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::{CampaignVariantId, SpecValueId, SpecValueStatus};

    fn spec_value(item: SpecItemId, payload: SpecPayload, unit: Option<&str>) -> SpecValue {
        SpecValue {
            id: SpecValueId::new(),
            tenant_id: TenantId::new(),
            product_id: ProductId::new(),
            campaign_variant_id: CampaignVariantId::new(),
            spec_item_id: item,
            payload,
            unit: unit.map(String::from),
            confidence: 1.0,
            status: SpecValueStatus::Active,
            source_doc_id: None,
            source_page: None,
            version: 1,
            effective_from: None,
            effective_through: None,
            key_features: None,
            variant_availability: None,
            explanation: None,
            explanation_failed: false,
        }
    }

    #[test]
    fn numeric_verdict_picks_the_larger_value() {
        let item = SpecItemId::new();
        let primary = spec_value(item, SpecPayload::Numeric(25.49), Some("km/l"));
        let secondary = spec_value(item, SpecPayload::Numeric(20.0), Some("km/l"));
        assert_eq!(compute_verdict(&primary, &secondary), ComparisonVerdict::PrimaryBetter);
    }

    #[test]
    fn mismatched_units_cannot_compare() {
        let item = SpecItemId::new();
        let primary = spec_value(item, SpecPayload::Numeric(25.49), Some("km/l"));
        let secondary = spec_value(item, SpecPayload::Numeric(20.0), Some("mpg"));
        assert_eq!(compute_verdict(&primary, &secondary), ComparisonVerdict::CannotCompare);
    }

    #[test]
    fn equal_text_values_are_equal() {
        let item = SpecItemId::new();
        let primary = spec_value(item, SpecPayload::Text("Pearl Metallic".to_string()), None);
        let secondary = spec_value(item, SpecPayload::Text("pearl metallic".to_string()), None);
        assert_eq!(compute_verdict(&primary, &secondary), ComparisonVerdict::Equal);
    }

    #[test]
    fn differing_text_values_cannot_compare() {
        let item = SpecItemId::new();
        let primary = spec_value(item, SpecPayload::Text("Red".to_string()), None);
        let secondary = spec_value(item, SpecPayload::Text("Blue".to_string()), None);
        assert_eq!(compute_verdict(&primary, &secondary), ComparisonVerdict::CannotCompare);
    }

    #[test]
    fn shareability_is_the_minimum_of_both_products() {
        let mut benchmark = sample_product();
        benchmark.is_public_benchmark = true;
        let tenant_only = sample_product();
        assert_eq!(
            product_shareability(&benchmark).min(product_shareability(&tenant_only)),
            Shareability::Tenant
        );
    }

    fn sample_product() -> Product {
        Product {
            id: ProductId::new(),
            tenant_id: TenantId::new(),
            name: "Camry".to_string(),
            segment: None,
            body_type: None,
            model_year: None,
            is_public_benchmark: false,
            default_campaign_variant_id: None,
            metadata: serde_json::json!({}),
        }
    }
}
