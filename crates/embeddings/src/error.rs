//! Error types for the embeddings module

use thiserror::Error;

/// Errors that can occur during embedding operations
///
/// Per-text failures are reported through this type so a batch can succeed
/// for some texts and fail for others. It is `Clone` so results can be fanned
/// out to every chunk sharing a text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    /// The request may succeed if retried (network failure, rate limit, overload)
    #[error("Embedding request failed: {0}")]
    Transient(String),

    /// The call exceeded its deadline
    #[error("Embedding request timed out after {0}ms")]
    Timeout(u64),

    /// The model will never accept this text (too long, invalid input)
    #[error("Text rejected by embedding model: {0}")]
    Rejected(String),

    /// The service refused the request itself (credentials, quota, bad
    /// request); no text will be embedded until the setup changes
    #[error("Embedding request refused: {0}")]
    Refused(String),

    /// The provider returned a vector of the wrong size
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Unsupported provider
    #[error("Unsupported embedding provider: {0}")]
    UnsupportedProvider(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl EmbeddingError {
    /// Whether retrying the same text may produce a vector
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

impl From<EmbeddingError> for codeindex_core::error::Error {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Timeout(ms) => codeindex_core::error::Error::timeout(
                "embedding request",
                std::time::Duration::from_millis(ms),
            ),
            EmbeddingError::UnsupportedProvider(_) | EmbeddingError::ConfigError(_) => {
                codeindex_core::error::Error::config(err.to_string())
            }
            EmbeddingError::Refused(message) => {
                codeindex_core::error::Error::embedding_refused(message)
            }
            other => codeindex_core::error::Error::embedding(other.to_string()),
        }
    }
}
