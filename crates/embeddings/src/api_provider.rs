//! OpenAI-compatible API provider for embeddings (vLLM, OpenAI, etc.)

use crate::error::EmbeddingError;
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_openai::error::OpenAIError;
use async_openai::types::{CreateEmbeddingRequest, EmbeddingInput};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use codeindex_core::config::EmbeddingsConfig;
use codeindex_core::error::Result;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// Maximum characters per API request.
/// Treating 1 char = 1 token to stay clear of context overflow.
const MAX_BATCH_CHARS: usize = 32768;

/// OpenAI-compatible API provider
pub struct OpenAiApiProvider {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
    max_context: usize,
    batch_size: usize,
    max_concurrent: usize,
}

impl OpenAiApiProvider {
    /// Create a new API provider from configuration
    pub(crate) async fn new(config: &EmbeddingsConfig) -> Result<Self> {
        info!("Initializing OpenAI-compatible API embeddings");
        info!("  Model: {}", config.model);
        info!("  Dimensions: {}", config.embedding_dimension);
        info!("  Batch size: {}", config.texts_per_api_request);

        let base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:8000/v1".to_string());
        info!("  Base URL: {}", base_url);

        let mut openai_config = OpenAIConfig::new().with_api_base(&base_url);
        if let Some(ref api_key) = config.api_key {
            openai_config = openai_config.with_api_key(api_key);
        }
        let client = Client::with_config(openai_config);

        // Warn on failure, don't block startup
        Self::check_health(&client).await;

        Ok(Self {
            client,
            model: config.model.clone(),
            dimensions: config.embedding_dimension,
            max_context: MAX_BATCH_CHARS,
            batch_size: config.texts_per_api_request.max(1),
            max_concurrent: config.max_concurrent_api_requests.max(1),
        })
    }

    async fn check_health(client: &Client<OpenAIConfig>) {
        debug!("Checking API health via /v1/models endpoint");

        match client.models().list().await {
            Ok(models_response) => {
                info!("API health check passed");
                debug!("  Available models: {}", models_response.data.len());
            }
            Err(e) => {
                warn!("API health check failed: {e}");
                warn!("  The embedding service may not be running or still starting up.");
            }
        }
    }

    /// Split accepted texts into requests bounded by count and total size
    fn build_batches(&self, texts: &[String], accepted: &[usize]) -> Vec<Vec<usize>> {
        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_chars = 0;

        for &idx in accepted {
            let char_count = texts[idx].chars().count();
            // A single text larger than the limit is sent alone
            if current_chars + char_count > MAX_BATCH_CHARS && !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            current.push(idx);
            current_chars += char_count;

            if current.len() >= self.batch_size {
                batches.push(std::mem::take(&mut current));
                current_chars = 0;
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    async fn embed_batch(&self, texts: Vec<String>) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = texts.len();
        let request = CreateEmbeddingRequest {
            model: self.model.clone(),
            input: EmbeddingInput::StringArray(texts),
            encoding_format: None,
            dimensions: None,
            user: None,
        };

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| classify_error(&e))?;

        let mut sorted: Vec<(usize, Vec<f32>)> = response
            .data
            .into_iter()
            .map(|emb| (emb.index as usize, emb.embedding))
            .collect();
        sorted.sort_by_key(|(idx, _)| *idx);

        if sorted.len() != expected {
            return Err(EmbeddingError::Transient(format!(
                "API returned {} embeddings for {expected} texts",
                sorted.len()
            )));
        }
        Ok(sorted.into_iter().map(|(_, emb)| emb).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiApiProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<EmbeddingResult>> {
        let mut results: Vec<EmbeddingResult> = Vec::with_capacity(texts.len());
        let mut accepted = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let char_count = text.chars().count();
            if char_count <= self.max_context {
                results.push(Err(EmbeddingError::Transient("not attempted".to_string())));
                accepted.push(i);
            } else {
                debug!(
                    "Text at index {i} exceeds max_context ({char_count} > {} chars), rejecting",
                    self.max_context
                );
                results.push(Err(EmbeddingError::Rejected(format!(
                    "{char_count} chars exceeds limit of {}",
                    self.max_context
                ))));
            }
        }

        let batches = self.build_batches(&texts, &accepted);
        debug!(
            "Created {} batches for {} texts (batch_size={})",
            batches.len(),
            accepted.len(),
            self.batch_size
        );

        let outcomes = stream::iter(batches)
            .map(|indices| {
                let batch_texts: Vec<String> = indices.iter().map(|i| texts[*i].clone()).collect();
                async move { (indices, self.embed_batch(batch_texts).await) }
            })
            .buffer_unordered(self.max_concurrent)
            .collect::<Vec<_>>()
            .await;

        // A failed request fails only the texts it carried
        for (indices, outcome) in outcomes {
            match outcome {
                Ok(embeddings) => {
                    for (idx, embedding) in indices.into_iter().zip(embeddings) {
                        results[idx] = if embedding.len() == self.dimensions {
                            Ok(embedding)
                        } else {
                            Err(EmbeddingError::DimensionMismatch {
                                expected: self.dimensions,
                                actual: embedding.len(),
                            })
                        };
                    }
                }
                Err(e) => {
                    warn!("Embedding request for {} texts failed: {e}", indices.len());
                    for idx in indices {
                        results[idx] = Err(e.clone());
                    }
                }
            }
        }

        Ok(results)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimensions
    }
}

/// Error types or codes the API uses for load shedding and server faults
const RETRYABLE_API_ERRORS: &[&str] = &[
    "rate_limit_exceeded",
    "requests",
    "tokens",
    "server_error",
    "service_unavailable",
    "overloaded_error",
    "timeout",
];

/// Sort a failed request into retryable and refused
///
/// The client has already retried 5xx and 429 responses by the time an
/// error surfaces. Server errors carry no error type; client errors (bad
/// credentials, exhausted quota, malformed request) do and are refused.
fn classify_error(err: &OpenAIError) -> EmbeddingError {
    match err {
        OpenAIError::ApiError(api) => {
            let labels = [api.r#type.as_deref(), api.code.as_deref()];
            let retryable = labels
                .iter()
                .flatten()
                .any(|label| RETRYABLE_API_ERRORS.contains(label));
            if retryable || labels.iter().all(Option::is_none) {
                EmbeddingError::Transient(err.to_string())
            } else {
                EmbeddingError::Refused(err.to_string())
            }
        }
        OpenAIError::InvalidArgument(_) => EmbeddingError::Refused(err.to_string()),
        _ => EmbeddingError::Transient(err.to_string()),
    }
}

/// Create a new OpenAI-compatible API provider from configuration
pub async fn create_api_provider(config: &EmbeddingsConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider = OpenAiApiProvider::new(config).await?;
    Ok(Box::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    fn api_error(r#type: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: "request failed".to_string(),
            r#type: r#type.map(str::to_string),
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn test_client_errors_are_refused() {
        let auth = classify_error(&api_error(Some("invalid_request_error"), Some("invalid_api_key")));
        assert!(matches!(auth, EmbeddingError::Refused(_)));
        assert!(!auth.is_transient());

        let quota = classify_error(&api_error(Some("insufficient_quota"), None));
        assert!(matches!(quota, EmbeddingError::Refused(_)));

        let bad_args = classify_error(&OpenAIError::InvalidArgument("empty input".to_string()));
        assert!(matches!(bad_args, EmbeddingError::Refused(_)));
    }

    #[test]
    fn test_server_errors_and_rate_limits_are_transient() {
        assert!(classify_error(&api_error(None, None)).is_transient());
        assert!(classify_error(&api_error(Some("requests"), Some("rate_limit_exceeded"))).is_transient());
        assert!(classify_error(&api_error(Some("server_error"), None)).is_transient());
    }
}
