use async_trait::async_trait;
use kb_core::{KbError, KbResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A provider's identity, pinned on first successful call (spec §4.2:
/// "the first successful call pins the expected dimension").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingRequest {
    pub model: String,
    pub version: String,
    pub texts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub model: String,
    pub version: String,
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of 1-100 texts (spec §4.2 batching of 50-100;
    /// callers chunk larger inputs before calling this). All returned
    /// vectors share one dimension; a provider that returns a mismatched
    /// dimension within the batch is a `KbError::Dimension`.
    async fn embed(&self, request: EmbeddingRequest) -> KbResult<EmbeddingBatch>;
}

#[derive(Serialize)]
struct HttpEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct HttpEmbedResponse {
    data: Vec<HttpEmbedDatum>,
}

#[derive(Deserialize)]
struct HttpEmbedDatum {
    embedding: Vec<f32>,
}

/// JSON-over-HTTP embedding provider (OpenAI-compatible `/embeddings`
/// shape), wrapped with the retry policy from [`crate::retry`].
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    version: String,
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            version: version.into(),
        }
    }

    async fn call_once(&self, request: &EmbeddingRequest) -> KbResult<EmbeddingBatch> {
        let body = HttpEmbedRequest { model: &request.model, input: &request.texts };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KbError::Dependency(format!("embedding request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(KbError::Dependency("embedding provider rate-limited".to_string()));
        }
        if !response.status().is_success() {
            return Err(KbError::Dependency(format!(
                "embedding provider returned {}",
                response.status()
            )));
        }

        let parsed: HttpEmbedResponse = response
            .json()
            .await
            .map_err(|e| KbError::Dependency(format!("decode embedding response: {e}")))?;

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        if vectors.iter().any(|v| v.len() != dimension) {
            return Err(KbError::Dimension(
                "embedding provider returned vectors of mismatched dimension within one batch".to_string(),
            ));
        }

        Ok(EmbeddingBatch { model: request.model.clone(), version: self.version.clone(), dimension, vectors })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, request: EmbeddingRequest) -> KbResult<EmbeddingBatch> {
        info!(batch_size = request.texts.len(), model = %request.model, "embedding batch");
        crate::retry::with_backoff(3, || async {
            match self.call_once(&request).await {
                Ok(batch) => Ok(batch),
                Err(e @ KbError::Dimension(_)) => {
                    // Fatal per spec §4.2: dimension conflicts never retry.
                    Err(crate::retry::Attempt::Fatal(e))
                }
                Err(e) => {
                    warn!(error = %e, "embedding call failed, will retry");
                    Err(crate::retry::Attempt::Transient(e))
                }
            }
        })
        .await
    }
}
