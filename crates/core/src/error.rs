use thiserror::Error;

/// Result type for codeindex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for codeindex operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Deterministic parse failures; retrying cannot change the outcome
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// No registered parser accepts the file
    #[error("Unsupported language: {file}")]
    UnsupportedLanguage { file: String },

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The embedding service refused the request (credentials, bad request)
    #[error("Embedding refused: {0}")]
    EmbeddingRefused(String),

    /// Storage related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// An external call exceeded its deadline
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    /// The index backend reported a concurrent write to the same file
    #[error("Reconciliation conflict for {file_id}: {message}")]
    ReconciliationConflict { file_id: String, message: String },

    /// A run was superseded by a newer run for the same file
    #[error("Stale run discarded for {file_id} (generation {generation})")]
    StaleRun { file_id: String, generation: u64 },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a parse error
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported language error
    pub fn unsupported_language(file: impl Into<String>) -> Self {
        Self::UnsupportedLanguage { file: file.into() }
    }

    /// Creates an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Creates a non-retryable embedding error
    pub fn embedding_refused(msg: impl Into<String>) -> Self {
        Self::EmbeddingRefused(msg.into())
    }

    /// Creates a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a timeout error
    pub fn timeout(operation: impl Into<String>, elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a reconciliation conflict error
    pub fn reconciliation_conflict(file_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReconciliationConflict {
            file_id: file_id.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Adds context to any error
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the failed operation may succeed
    ///
    /// Timeouts and collaborator failures are transient. Parse errors are
    /// deterministic and never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Embedding(_) | Self::Storage(_) | Self::Io(_) => true,
            Self::ReconciliationConflict { .. } => true,
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_context(context, e))
    }
}
