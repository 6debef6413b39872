//! Embedding provider abstraction (spec §4.2): batches chunk text into
//! vectors, pins the first observed dimension, and retries transient
//! failures with exponential backoff.

pub mod provider;
pub mod retry;
pub mod stub;

pub use provider::{EmbeddingBatch, EmbeddingProvider, EmbeddingRequest, HttpEmbeddingProvider};
pub use stub::StubEmbeddingProvider;
