//! Trait definition for embedding providers

use async_trait::async_trait;
use codeindex_core::error::Result;

use crate::error::EmbeddingError;

/// Outcome for one text of a batch
pub type EmbeddingResult = std::result::Result<Vec<f32>, EmbeddingError>;

/// Trait for embedding providers
///
/// Providers are the boundary to the external embedding model. They do not
/// retry; retry and backoff belong to the caller, which knows which texts
/// still need a vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts
    ///
    /// Returns exactly one result per input text, in input order. An `Err`
    /// from the call itself means no text in the batch was embedded.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<EmbeddingResult>>;

    /// Size of the vectors produced by this provider
    fn embedding_dimension(&self) -> usize;
}
