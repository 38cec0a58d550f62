//! Embedding generation for code chunks
//!
//! The embedding model is an external collaborator. This crate defines the
//! [`EmbeddingProvider`] boundary, a deterministic mock and an
//! OpenAI-compatible client, and the [`EmbeddingManager`] that bounds
//! concurrency and applies per-call timeouts across every file in flight.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use codeindex_core::config::EmbeddingsConfig;
use codeindex_core::error::{Error, Result, ResultExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

mod api_provider;
pub mod error;
mod mock_provider;
pub mod provider;

pub use api_provider::create_api_provider;
pub use error::EmbeddingError;
pub use mock_provider::MockEmbeddingProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult};

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderType {
    /// OpenAI-compatible API (vLLM or remote)
    LocalApi,
    /// Deterministic vectors without network access
    Mock,
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = EmbeddingError;

    fn from_str(provider: &str) -> std::result::Result<Self, Self::Err> {
        match provider.to_lowercase().as_str() {
            "localapi" | "api" => Ok(Self::LocalApi),
            "mock" => Ok(Self::Mock),
            other => Err(EmbeddingError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Create an embedding manager from the application's embeddings config
///
/// The API key falls back to the `EMBEDDING_API_KEY` environment variable
/// when the config does not set one.
pub async fn create_embedding_manager_from_app_config(
    embeddings_config: &EmbeddingsConfig,
) -> Result<Arc<EmbeddingManager>> {
    let mut config = embeddings_config.clone();
    if config.api_key.is_none() {
        config.api_key = std::env::var("EMBEDDING_API_KEY").ok();
    }

    let embedding_manager = EmbeddingManager::from_config(&config)
        .await
        .context("Failed to create embedding manager")?;

    Ok(Arc::new(embedding_manager))
}

/// Shared front for the embedding provider
///
/// A single semaphore caps in-flight requests across all callers, so the
/// external model sees bounded load no matter how many files are embedding.
pub struct EmbeddingManager {
    provider: Arc<dyn EmbeddingProvider>,
    model_version: String,
    limiter: Arc<Semaphore>,
    max_concurrent_requests: usize,
    batch_size: usize,
    request_timeout: Duration,
}

impl EmbeddingManager {
    /// Wrap an existing provider
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        model_version: impl Into<String>,
        config: &EmbeddingsConfig,
    ) -> Self {
        let max_concurrent_requests = config.max_concurrent_api_requests.max(1);
        Self {
            provider,
            model_version: model_version.into(),
            limiter: Arc::new(Semaphore::new(max_concurrent_requests)),
            max_concurrent_requests,
            batch_size: config.texts_per_api_request.max(1),
            request_timeout: config.request_timeout(),
        }
    }

    /// Initialize manager from configuration
    pub async fn from_config(config: &EmbeddingsConfig) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = match config.provider.parse::<EmbeddingProviderType>()? {
            EmbeddingProviderType::LocalApi => Arc::from(create_api_provider(config).await?),
            EmbeddingProviderType::Mock => {
                Arc::new(MockEmbeddingProvider::new(config.embedding_dimension))
            }
        };
        Ok(Self::new(provider, config.model.clone(), config))
    }

    /// Get the model version string
    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Texts per request
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Requests allowed in flight across all callers
    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    pub fn embedding_dimension(&self) -> usize {
        self.provider.embedding_dimension()
    }

    /// Embed one batch, returning one result per text in input order
    ///
    /// Waits for a global request slot first. The provider call is bounded by
    /// the configured timeout; an elapsed timeout fails the whole batch with
    /// a transient error.
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<EmbeddingResult>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| Error::embedding(format!("Failed to acquire request permit: {e}")))?;

        let started = Instant::now();
        let results = tokio::time::timeout(self.request_timeout, self.provider.embed(texts))
            .await
            .map_err(|_| Error::timeout("embedding request", started.elapsed()))??;

        if results.len() != expected {
            return Err(Error::embedding(format!(
                "Provider returned {} results for {expected} texts",
                results.len()
            )));
        }

        let dimension = self.provider.embedding_dimension();
        let results = results
            .into_iter()
            .map(|result| match result {
                Ok(vector) if vector.len() != dimension => Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                }),
                other => other,
            })
            .collect::<Vec<_>>();

        debug!(
            texts = expected,
            failed = results.iter().filter(|r| r.is_err()).count(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Embedding request complete"
        );
        Ok(results)
    }
}
