//! One function per CLI subcommand (spec.md §6 "Public operations"),
//! each handling both JSON and text output the way `dsl_cli`'s command
//! functions do. Every function borrows the already-built [`Runtime`]
//! rather than re-resolving configuration, so the CLI and the HTTP
//! server (`server.rs`) share identical call sequences.

use crate::bootstrap::Runtime;
use crate::output::{self, OutputFormat};
use chrono::Utc;
use colored::Colorize;
use kb_core::{CampaignVariantId, KbError, Plan, Product, ProductId, SpecPayload, Tenant, TenantId};
use kb_comparison::Materializer;
use kb_ingest::{IngestRequest, IngestionPipeline};
use kb_lineage::{DriftRunner, PurgeOrchestrator};
use kb_publisher::Publisher;
use kb_retrieval::{Intent, RetrievalRouter, RetrieveRequest};
use kb_storage::Repositories;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

fn read_input(file: Option<PathBuf>) -> Result<String, String> {
    match file {
        Some(path) => {
            std::fs::read_to_string(&path).map_err(|e| format!("failed to read '{}': {e}", path.display()))
        }
        None => {
            if atty::is(atty::Stream::Stdin) {
                return Err("no input provided; use --file or pipe Markdown via stdin".to_string());
            }
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map_err(|e| format!("failed to read stdin: {e}"))?;
            Ok(buffer)
        }
    }
}

fn parse_plan(s: &str) -> Result<Plan, String> {
    match s.to_lowercase().as_str() {
        "sandbox" => Ok(Plan::Sandbox),
        "pro" => Ok(Plan::Pro),
        "enterprise" => Ok(Plan::Enterprise),
        other => Err(format!("unknown plan '{other}'; use sandbox, pro, or enterprise")),
    }
}

pub async fn tenant_create(rt: &Runtime, name: String, plan: String, format: OutputFormat) -> Result<(), String> {
    let plan = parse_plan(&plan)?;
    let tenant = Tenant { id: TenantId::new(), name, plan, settings: serde_json::json!({}) };
    rt.repos.tenants().create(&tenant).await.map_err(|e| e.to_string())?;
    output::emit(format, &tenant, |t| {
        output::ok_line(format!("created tenant '{}'", t.name));
        output::field("id", t.id);
        output::field("plan", format!("{:?}", t.plan).to_lowercase());
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn product_create(
    rt: &Runtime,
    tenant: TenantId,
    name: String,
    segment: Option<String>,
    body_type: Option<String>,
    model_year: Option<i32>,
    is_public_benchmark: bool,
    format: OutputFormat,
) -> Result<(), String> {
    let product = Product {
        id: ProductId::new(),
        tenant_id: tenant,
        name,
        segment,
        body_type,
        model_year,
        is_public_benchmark,
        default_campaign_variant_id: None,
        metadata: serde_json::json!({}),
    };
    rt.repos.products().create(&product).await.map_err(|e| e.to_string())?;
    output::emit(format, &product, |p| {
        output::ok_line(format!("created product '{}'", p.name));
        output::field("id", p.id);
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn ingest(
    rt: &Runtime,
    tenant: TenantId,
    product: ProductId,
    locale: String,
    trim: Option<String>,
    market: Option<String>,
    file: Option<PathBuf>,
    source_uri: String,
    extractor_version: Option<String>,
    overwrite: bool,
    embedding_model: String,
    embedding_version: String,
    format: OutputFormat,
) -> Result<ExitCode, String> {
    let markdown = read_input(file)?;
    let pipeline = IngestionPipeline::new(
        rt.repos.clone(),
        rt.embedder.clone(),
        rt.vectors.clone(),
        embedding_model,
        embedding_version,
    );
    let req = IngestRequest { tenant, product, locale, trim, market, markdown, source_uri, extractor_version, overwrite };
    let outcome = pipeline.ingest(req).await.map_err(|e| e.to_string())?;

    output::emit(format, &outcome, |o| {
        output::ok_line("ingest complete");
        output::field("job_id", o.job_id.map(|id| id.to_string()).unwrap_or_default());
        output::field("campaign_variant_id", o.campaign_variant_id.map(|id| id.to_string()).unwrap_or_default());
        output::field("spec_values_written", o.spec_values_written);
        output::field("feature_blocks_written", o.feature_blocks_written);
        output::field("chunks_new", o.chunks_new);
        output::field("chunks_deduped", o.chunks_deduped);
        if o.chunks_incomplete > 0 {
            output::warn_line(format!("{} chunk(s) left incomplete, retry later", o.chunks_incomplete));
        }
    })?;

    // spec.md §6: exit 0 on full success, 2 when incomplete chunks remain.
    Ok(if outcome.chunks_incomplete > 0 { ExitCode::from(2) } else { ExitCode::SUCCESS })
}

pub async fn publish(
    rt: &Runtime,
    tenant: TenantId,
    product: ProductId,
    locale: String,
    trim: Option<String>,
    market: Option<String>,
    format: OutputFormat,
) -> Result<(), String> {
    let publisher = Publisher::new(rt.repos.clone());
    let outcome = publisher
        .publish(tenant, product, &locale, trim.as_deref(), market.as_deref())
        .await
        .map_err(|e| e.to_string())?;
    output::emit(format, &outcome, |o| {
        output::ok_line(format!("published version {}", o.version));
        output::field("campaign_variant_id", o.campaign_variant_id);
        output::field("effective_from", o.effective_from);
    })
}

pub async fn rollback(
    rt: &Runtime,
    tenant: TenantId,
    product: ProductId,
    locale: String,
    trim: Option<String>,
    market: Option<String>,
    format: OutputFormat,
) -> Result<(), String> {
    let publisher = Publisher::new(rt.repos.clone());
    let outcome = publisher
        .rollback(tenant, product, &locale, trim.as_deref(), market.as_deref())
        .await
        .map_err(|e| e.to_string())?;
    output::emit(format, &outcome, |o| {
        output::ok_line(format!("rolled back to version {}", o.version));
        output::field("campaign_variant_id", o.campaign_variant_id);
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn retrieve(
    rt: &Runtime,
    tenant: TenantId,
    products: Vec<ProductId>,
    campaign_variant_id: Option<CampaignVariantId>,
    question: String,
    max_chunks: usize,
    intent_hint: Option<Intent>,
    embedding_model: String,
    embedding_version: String,
    format: OutputFormat,
) -> Result<(), String> {
    let router = RetrievalRouter::new(
        rt.repos.clone(),
        rt.embedder.clone(),
        rt.vectors.clone(),
        embedding_model,
        embedding_version,
    );
    let req = RetrieveRequest { tenant, product_ids: products, campaign_variant_id, question, max_chunks, intent_hint };
    let response = router.retrieve(req).await.map_err(|e| e.to_string())?;

    output::emit(format, &response, |r| {
        println!(
            "{} intent={:?} confidence={:.2} latency_ms={}{}",
            "OK".green().bold(),
            r.intent,
            r.keyword_confidence,
            r.latency_ms,
            if r.degraded { " (degraded)".yellow().to_string() } else { String::new() },
        );
        for fact in &r.structured_facts {
            let value = match &fact.value {
                SpecPayload::Numeric(n) => n.to_string(),
                SpecPayload::Text(t) => t.clone(),
            };
            println!("  {}: {} {}", fact.specification.cyan(), value, fact.unit.clone().unwrap_or_default());
        }
        for group in &r.semantic_groups {
            if let (Some(parent), Some(sub)) = (&group.parent_category, &group.sub_category) {
                println!("  {} / {}", parent.cyan(), sub);
            }
            for chunk in &group.chunks {
                println!("    [{:.2}] {}", chunk.similarity, truncate(&chunk.text, 100));
            }
        }
    })
}

fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(n).collect::<String>())
    }
}

pub async fn compare(
    rt: &Runtime,
    tenant: TenantId,
    primary: ProductId,
    secondary: ProductId,
    dimensions: Vec<String>,
    format: OutputFormat,
) -> Result<(), String> {
    let materializer = Materializer::new(rt.repos.clone());
    let dims = if dimensions.is_empty() { None } else { Some(dimensions.as_slice()) };
    let rows = materializer.compare(tenant, primary, secondary, dims).await.map_err(|e| e.to_string())?;

    output::emit(format, &rows, |rows| {
        output::ok_line(format!("{} comparison row(s)", rows.len()));
        for row in rows {
            println!(
                "  {}: {} vs {} -> {:?}",
                row.dimension,
                row.primary_value.clone().unwrap_or_else(|| "-".to_string()),
                row.secondary_value.clone().unwrap_or_else(|| "-".to_string()),
                row.verdict,
            );
            if let Some(narrative) = &row.narrative {
                println!("    {}", narrative.dimmed());
            }
        }
    })
}

pub async fn drift_check(rt: &Runtime, tenant: Option<TenantId>, format: OutputFormat) -> Result<(), String> {
    let runner = DriftRunner::new(rt.repos.clone());
    let outcome = runner.run(tenant).await.map_err(|e| e.to_string())?;
    output::emit(format, &outcome, |o| {
        output::ok_line(format!("{} alert(s) opened", o.alerts_opened));
    })
}

pub async fn purge(rt: &Runtime, tenant: TenantId, confirmed: bool, format: OutputFormat) -> Result<(), String> {
    if !confirmed {
        return Err("purge is destructive; pass --yes to confirm".to_string());
    }
    let orchestrator = PurgeOrchestrator::new(rt.repos.clone());
    let outcome = orchestrator.purge(tenant).await.map_err(|e| e.to_string())?;
    output::emit(format, &outcome, |o| {
        output::ok_line(format!("tenant {tenant} purged"));
        for (table, count) in &o.counts {
            output::field(table, count);
        }
    })
}

pub async fn export(
    rt: &Runtime,
    tenant: TenantId,
    products: Vec<ProductId>,
    campaign_variant_id: CampaignVariantId,
    out: PathBuf,
) -> Result<(), String> {
    let rows = rt
        .repos
        .spec_values()
        .spec_view(tenant, &products, campaign_variant_id)
        .await
        .map_err(|e| e.to_string())?;

    let mut writer = csv::Writer::from_path(&out).map_err(|e| format!("failed to open '{}': {e}", out.display()))?;
    writer
        .write_record(["product_id", "category", "specification", "value", "unit", "confidence", "key_features"])
        .map_err(|e| e.to_string())?;
    for row in &rows {
        let value = match &row.value {
            SpecPayload::Numeric(n) => n.to_string(),
            SpecPayload::Text(t) => t.clone(),
        };
        writer
            .write_record([
                row.product_id.to_string(),
                row.category.clone(),
                row.specification.clone(),
                value,
                row.unit.clone().unwrap_or_default(),
                row.confidence.to_string(),
                row.key_features.clone().unwrap_or_default(),
            ])
            .map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;

    output::ok_line(format!("wrote {} row(s) to {}", rows.len(), out.display()));
    Ok(())
}

/// Maps a [`KbError`] onto the CLI's exit-code contract: everything that
/// isn't an ingest-specific partial success is a fatal, non-zero exit
/// (spec.md §6).
pub fn error_exit_code(_err: &KbError) -> ExitCode {
    ExitCode::FAILURE
}

// Re-exported for callers that only care about classifying intent by name
// (e.g. the `--intent-hint` flag on `retrieve`, parsed in `main.rs`).
pub fn parse_intent(s: &str) -> Result<Intent, String> {
    match s.to_lowercase().as_str() {
        "spec_lookup" => Ok(Intent::SpecLookup),
        "usp_lookup" => Ok(Intent::UspLookup),
        "comparison" => Ok(Intent::Comparison),
        "faq" => Ok(Intent::Faq),
        "general" => Ok(Intent::General),
        other => Err(format!("unknown intent '{other}'")),
    }
}
