use crate::provider::{EmbeddingBatch, EmbeddingProvider, EmbeddingRequest};
use async_trait::async_trait;
use kb_core::KbResult;
use sha2::{Digest, Sha256};

/// Deterministic, network-free provider for tests: each text hashes to a
/// fixed-dimension vector so embedding behavior (dimension pinning,
/// dedup-by-hash) is exercisable without a live provider.
pub struct StubEmbeddingProvider {
    dimension: usize,
}

impl StubEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for StubEmbeddingProvider {
    fn default() -> Self {
        Self::new(16)
    }
}

fn hash_to_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = Vec::with_capacity(dimension);
    let mut seed = text.as_bytes().to_vec();
    while vector.len() < dimension {
        let digest = Sha256::digest(&seed);
        for byte in digest.iter() {
            if vector.len() == dimension {
                break;
            }
            vector.push((*byte as f32 / 255.0) * 2.0 - 1.0);
        }
        seed = digest.to_vec();
    }
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    async fn embed(&self, request: EmbeddingRequest) -> KbResult<EmbeddingBatch> {
        let vectors = request.texts.iter().map(|t| hash_to_vector(t, self.dimension)).collect();
        Ok(EmbeddingBatch {
            model: request.model,
            version: request.version,
            dimension: self.dimension,
            vectors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_embeds_identically() {
        let provider = StubEmbeddingProvider::new(8);
        let request = EmbeddingRequest {
            model: "stub".to_string(),
            version: "v1".to_string(),
            texts: vec!["Category: Engine\nValue: 2.0L turbo".to_string(); 2],
        };
        let batch = provider.embed(request).await.unwrap();
        assert_eq!(batch.vectors[0], batch.vectors[1]);
        assert_eq!(batch.dimension, 8);
    }

    #[tokio::test]
    async fn different_text_embeds_differently() {
        let provider = StubEmbeddingProvider::new(8);
        let request = EmbeddingRequest {
            model: "stub".to_string(),
            version: "v1".to_string(),
            texts: vec!["Category: Engine".to_string(), "Category: Interior".to_string()],
        };
        let batch = provider.embed(request).await.unwrap();
        assert_ne!(batch.vectors[0], batch.vectors[1]);
    }
}
