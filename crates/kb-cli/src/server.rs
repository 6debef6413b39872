//! HTTP surface over the same transport-agnostic operations the CLI
//! drives (spec.md §6: "GraphQL/gRPC transport skinning" is out of
//! scope, but an HTTP surface for the engine itself is the ambient
//! entrypoint a real deployment needs). Routing/state/CORS/tracing
//! follow `ob-poc-web`'s `main.rs`/`state.rs` split.

use crate::bootstrap::Runtime;
use crate::config::KbConfig;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use kb_comparison::Materializer;
use kb_core::{CampaignVariantId, ErrorEnvelope, KbError, Plan, Product, ProductId, Tenant, TenantId};
use kb_ingest::{IngestRequest, IngestionPipeline};
use kb_lineage::{DriftRunner, PurgeOrchestrator};
use kb_publisher::Publisher;
use kb_retrieval::{Intent, RetrievalRouter, RetrieveRequest};
use kb_storage::Repositories;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
struct AppState {
    rt: Arc<Runtime>,
    embedding_model: String,
    embedding_version: String,
}

struct ApiError(KbError);

impl From<KbError> for ApiError {
    fn from(err: KbError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope::from(&self.0);
        (status, Json(envelope)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn serve(config: &KbConfig, rt: Runtime) -> anyhow::Result<()> {
    let state = AppState {
        rt: Arc::new(rt),
        embedding_model: config.embedding_model.clone(),
        embedding_version: config.embedding_version.clone(),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/tenants", post(create_tenant))
        .route("/tenants/:tenant/products", post(create_product))
        .route("/ingest", post(ingest))
        .route("/publish", post(publish))
        .route("/rollback", post(rollback))
        .route("/retrieve", post(retrieve))
        .route("/compare", post(compare))
        .route("/drift-check", post(drift_check))
        .route("/purge", post(purge))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("kb-cli HTTP server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Deserialize)]
struct CreateTenantRequest {
    name: String,
    plan: Plan,
}

async fn create_tenant(State(state): State<AppState>, Json(req): Json<CreateTenantRequest>) -> ApiResult<Tenant> {
    let tenant = Tenant { id: TenantId::new(), name: req.name, plan: req.plan, settings: serde_json::json!({}) };
    state.rt.repos.tenants().create(&tenant).await?;
    Ok(Json(tenant))
}

#[derive(Deserialize)]
struct CreateProductRequest {
    name: String,
    segment: Option<String>,
    body_type: Option<String>,
    model_year: Option<i32>,
    #[serde(default)]
    is_public_benchmark: bool,
}

async fn create_product(
    State(state): State<AppState>,
    axum::extract::Path(tenant): axum::extract::Path<TenantId>,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<Product> {
    let product = Product {
        id: ProductId::new(),
        tenant_id: tenant,
        name: req.name,
        segment: req.segment,
        body_type: req.body_type,
        model_year: req.model_year,
        is_public_benchmark: req.is_public_benchmark,
        default_campaign_variant_id: None,
        metadata: serde_json::json!({}),
    };
    state.rt.repos.products().create(&product).await?;
    Ok(Json(product))
}

#[derive(Deserialize)]
struct IngestHttpRequest {
    tenant: TenantId,
    product: ProductId,
    locale: String,
    trim: Option<String>,
    market: Option<String>,
    markdown: String,
    source_uri: String,
    extractor_version: Option<String>,
    #[serde(default)]
    overwrite: bool,
}

async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestHttpRequest>,
) -> ApiResult<kb_ingest::IngestOutcome> {
    let pipeline = IngestionPipeline::new(
        state.rt.repos.clone(),
        state.rt.embedder.clone(),
        state.rt.vectors.clone(),
        state.embedding_model.clone(),
        state.embedding_version.clone(),
    );
    let outcome = pipeline
        .ingest(IngestRequest {
            tenant: req.tenant,
            product: req.product,
            locale: req.locale,
            trim: req.trim,
            market: req.market,
            markdown: req.markdown,
            source_uri: req.source_uri,
            extractor_version: req.extractor_version,
            overwrite: req.overwrite,
        })
        .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct CampaignScopeRequest {
    tenant: TenantId,
    product: ProductId,
    locale: String,
    trim: Option<String>,
    market: Option<String>,
}

async fn publish(
    State(state): State<AppState>,
    Json(req): Json<CampaignScopeRequest>,
) -> ApiResult<kb_publisher::PublishOutcome> {
    let publisher = Publisher::new(state.rt.repos.clone());
    let outcome = publisher
        .publish(req.tenant, req.product, &req.locale, req.trim.as_deref(), req.market.as_deref())
        .await?;
    Ok(Json(outcome))
}

async fn rollback(
    State(state): State<AppState>,
    Json(req): Json<CampaignScopeRequest>,
) -> ApiResult<kb_publisher::RollbackOutcome> {
    let publisher = Publisher::new(state.rt.repos.clone());
    let outcome = publisher
        .rollback(req.tenant, req.product, &req.locale, req.trim.as_deref(), req.market.as_deref())
        .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct RetrieveHttpRequest {
    tenant: TenantId,
    product_ids: Vec<ProductId>,
    campaign_variant_id: Option<CampaignVariantId>,
    question: String,
    #[serde(default = "default_max_chunks")]
    max_chunks: usize,
    intent_hint: Option<Intent>,
}

fn default_max_chunks() -> usize {
    5
}

async fn retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveHttpRequest>,
) -> ApiResult<kb_retrieval::RetrieveResponse> {
    let router = RetrievalRouter::new(
        state.rt.repos.clone(),
        state.rt.embedder.clone(),
        state.rt.vectors.clone(),
        state.embedding_model.clone(),
        state.embedding_version.clone(),
    );
    let response = router
        .retrieve(RetrieveRequest {
            tenant: req.tenant,
            product_ids: req.product_ids,
            campaign_variant_id: req.campaign_variant_id,
            question: req.question,
            max_chunks: req.max_chunks,
            intent_hint: req.intent_hint,
        })
        .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct CompareRequest {
    tenant: TenantId,
    primary: ProductId,
    secondary: ProductId,
    dimensions: Option<Vec<String>>,
}

async fn compare(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> ApiResult<Vec<kb_core::ComparisonRow>> {
    let materializer = Materializer::new(state.rt.repos.clone());
    let rows = materializer
        .compare(req.tenant, req.primary, req.secondary, req.dimensions.as_deref())
        .await?;
    Ok(Json(rows))
}

#[derive(Deserialize, Default)]
struct DriftCheckRequest {
    tenant: Option<TenantId>,
}

async fn drift_check(
    State(state): State<AppState>,
    Json(req): Json<DriftCheckRequest>,
) -> ApiResult<kb_lineage::DriftOutcome> {
    let runner = DriftRunner::new(state.rt.repos.clone());
    let outcome = runner.run(req.tenant).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct PurgeRequest {
    tenant: TenantId,
}

async fn purge(
    State(state): State<AppState>,
    Json(req): Json<PurgeRequest>,
) -> ApiResult<kb_lineage::PurgeOutcome> {
    let orchestrator = PurgeOrchestrator::new(state.rt.repos.clone());
    let outcome = orchestrator.purge(req.tenant).await?;
    Ok(Json(outcome))
}
