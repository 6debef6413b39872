//! `kb-cli`: the CLI and HTTP entrypoint for the brochure knowledge
//! engine. Subcommand shape and exit-code handling follow the teacher's
//! `dsl_cli` (`Cli`/`Commands`/`OutputFormat`, `fn main() -> ExitCode`);
//! unlike `dsl_cli`'s mostly-offline commands, nearly every subcommand
//! here is async, so `main` runs under `#[tokio::main]` directly rather
//! than spinning up a runtime only for one subcommand.

mod bootstrap;
mod commands;
mod config;
mod output;
mod server;

use clap::{Parser, Subcommand};
use config::KbConfig;
use kb_core::{CampaignVariantId, ProductId, TenantId};
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kb-cli")]
#[command(author = "Brochure KB Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Ingestion, publishing, retrieval, comparison, and lineage/drift auditing for the brochure knowledge engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: json, text, or pretty (default)
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a tenant
    TenantCreate {
        name: String,
        /// sandbox, pro, or enterprise
        #[arg(long, default_value = "sandbox")]
        plan: String,
    },

    /// Create a product under a tenant
    ProductCreate {
        #[arg(long)]
        tenant: TenantId,
        name: String,
        #[arg(long)]
        segment: Option<String>,
        #[arg(long)]
        body_type: Option<String>,
        #[arg(long)]
        model_year: Option<i32>,
        #[arg(long)]
        is_public_benchmark: bool,
    },

    /// Ingest a Markdown brochure into a draft campaign variant
    Ingest {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        product: ProductId,
        #[arg(long)]
        locale: String,
        #[arg(long)]
        trim: Option<String>,
        #[arg(long)]
        market: Option<String>,
        /// Markdown file (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(long)]
        source_uri: String,
        #[arg(long)]
        extractor_version: Option<String>,
        #[arg(long)]
        overwrite: bool,
    },

    /// Promote the draft campaign variant for (product, locale, trim, market) to published
    Publish {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        product: ProductId,
        #[arg(long)]
        locale: String,
        #[arg(long)]
        trim: Option<String>,
        #[arg(long)]
        market: Option<String>,
    },

    /// Reactivate the previously archived campaign variant
    Rollback {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        product: ProductId,
        #[arg(long)]
        locale: String,
        #[arg(long)]
        trim: Option<String>,
        #[arg(long)]
        market: Option<String>,
    },

    /// Hybrid structured + semantic retrieval
    Retrieve {
        #[arg(long)]
        tenant: TenantId,
        /// May be repeated for multi-product (comparison) questions
        #[arg(long = "product")]
        products: Vec<ProductId>,
        #[arg(long)]
        campaign_variant: Option<CampaignVariantId>,
        question: String,
        #[arg(long, default_value_t = 5)]
        max_chunks: usize,
        /// Override intent classification: spec_lookup, usp_lookup, comparison, faq, general
        #[arg(long)]
        intent_hint: Option<String>,
    },

    /// Cross-product comparison, gated by shareability
    Compare {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        primary: ProductId,
        #[arg(long)]
        secondary: ProductId,
        /// Restrict to these dimensions; omit for all comparable dimensions
        #[arg(long = "dimension")]
        dimensions: Vec<String>,
    },

    /// Sweep for stale campaigns, content-hash drift, and spec conflicts
    DriftCheck {
        /// Sweep a single tenant; omit to sweep every tenant
        #[arg(long)]
        tenant: Option<TenantId>,
    },

    /// Cascading delete of every tenant-owned row
    Purge {
        #[arg(long)]
        tenant: TenantId,
        /// Required confirmation; purge is irreversible
        #[arg(long)]
        yes: bool,
    },

    /// Export spec_view_latest to CSV
    Export {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long = "product")]
        products: Vec<ProductId>,
        #[arg(long)]
        campaign_variant: CampaignVariantId,
        #[arg(long)]
        out: PathBuf,
    },

    /// Run the HTTP server
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "kb_cli=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    let config = match KbConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            output::error_line(format!("configuration error: {e}"));
            return ExitCode::FAILURE;
        }
    };

    if matches!(cli.command, Commands::Serve) {
        let rt = match bootstrap::build(&config).await {
            Ok(rt) => rt,
            Err(e) => {
                output::error_line(format!("failed to initialize: {e}"));
                return ExitCode::FAILURE;
            }
        };
        return match server::serve(&config, rt).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                output::error_line(format!("server error: {e}"));
                ExitCode::FAILURE
            }
        };
    }

    let rt = match bootstrap::build(&config).await {
        Ok(rt) => rt,
        Err(e) => {
            output::error_line(format!("failed to initialize: {e}"));
            return ExitCode::FAILURE;
        }
    };

    let result = dispatch(cli.command, &rt, &config, format).await;

    match result {
        Ok(code) => code,
        Err(e) => {
            if format == OutputFormat::Json {
                println!(r#"{{"error": "{}"}}"#, e.replace('"', "\\\""));
            } else {
                output::error_line(&e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(
    command: Commands,
    rt: &bootstrap::Runtime,
    config: &KbConfig,
    format: OutputFormat,
) -> Result<ExitCode, String> {
    match command {
        Commands::Serve => unreachable!("handled before dispatch"),

        Commands::TenantCreate { name, plan } => {
            commands::tenant_create(rt, name, plan, format).await.map(|_| ExitCode::SUCCESS)
        }

        Commands::ProductCreate { tenant, name, segment, body_type, model_year, is_public_benchmark } => {
            commands::product_create(rt, tenant, name, segment, body_type, model_year, is_public_benchmark, format)
                .await
                .map(|_| ExitCode::SUCCESS)
        }

        Commands::Ingest {
            tenant,
            product,
            locale,
            trim,
            market,
            file,
            source_uri,
            extractor_version,
            overwrite,
        } => {
            commands::ingest(
                rt,
                tenant,
                product,
                locale,
                trim,
                market,
                file,
                source_uri,
                extractor_version,
                overwrite,
                config.embedding_model.clone(),
                config.embedding_version.clone(),
                format,
            )
            .await
        }

        Commands::Publish { tenant, product, locale, trim, market } => {
            commands::publish(rt, tenant, product, locale, trim, market, format).await.map(|_| ExitCode::SUCCESS)
        }

        Commands::Rollback { tenant, product, locale, trim, market } => {
            commands::rollback(rt, tenant, product, locale, trim, market, format).await.map(|_| ExitCode::SUCCESS)
        }

        Commands::Retrieve { tenant, products, campaign_variant, question, max_chunks, intent_hint } => {
            let intent_hint = intent_hint.map(|s| commands::parse_intent(&s)).transpose()?;
            commands::retrieve(
                rt,
                tenant,
                products,
                campaign_variant,
                question,
                max_chunks,
                intent_hint,
                config.embedding_model.clone(),
                config.embedding_version.clone(),
                format,
            )
            .await
            .map(|_| ExitCode::SUCCESS)
        }

        Commands::Compare { tenant, primary, secondary, dimensions } => {
            commands::compare(rt, tenant, primary, secondary, dimensions, format).await.map(|_| ExitCode::SUCCESS)
        }

        Commands::DriftCheck { tenant } => {
            commands::drift_check(rt, tenant, format).await.map(|_| ExitCode::SUCCESS)
        }

        Commands::Purge { tenant, yes } => commands::purge(rt, tenant, yes, format).await.map(|_| ExitCode::SUCCESS),

        Commands::Export { tenant, products, campaign_variant, out } => {
            commands::export(rt, tenant, products, campaign_variant, out).await.map(|_| ExitCode::SUCCESS)
        }
    }
}
