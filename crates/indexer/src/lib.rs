//! Incremental indexing pipeline
//!
//! Turns the current bytes of a source file into a reconciled set of
//! embedded chunks in the index:
//!
//! parse → normalize → chunk → deduplicate → embed → reconcile
//!
//! Files move through the stages independently. Unchanged chunk text never
//! reaches the embedding model twice, and a file's visible entries always
//! come from exactly one run.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod chunker;
pub mod dedup;
pub mod index_writer;
pub mod pipeline;
pub mod retry;
pub mod runs;
pub mod stats;
pub mod task;

// Re-export error types from core
pub use codeindex_core::error::{Error, Result};

pub use chunker::Chunker;
pub use dedup::{DedupOutcome, Deduplicator, PriorChunks};
pub use index_writer::{
    IndexWriter, ReconcileCounts, ReconcileOutcome, ReconcileRequest,
};
pub use pipeline::{FileOutcome, FileSubmission, Pipeline, RunHandle};
pub use retry::RetryPolicy;
pub use runs::FileRuns;
pub use stats::PipelineStats;
pub use task::{
    FailureReason, PipelineStage, PipelineTask, SkipReason, TaskEvent, TaskState, TerminalStatus,
};

use codeindex_core::Config;
use codeindex_embeddings::create_embedding_manager_from_app_config;
use codeindex_languages::ParserRegistry;
use codeindex_storage::IndexBackend;
use std::sync::Arc;

/// Create a pipeline from application configuration
///
/// Builds the parser registry for the enabled languages and the embedding
/// manager for the configured provider, then starts the stage workers.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration is invalid
/// - An enabled language has no compiled-in parser
/// - The embedding provider cannot be created
///
/// # Example
///
/// ```no_run
/// use codeindex_core::{Config, FileId};
/// use codeindex_indexer::{create_pipeline, FileSubmission};
/// use codeindex_storage::InMemoryIndex;
/// use std::sync::Arc;
///
/// # async fn example() -> codeindex_indexer::Result<()> {
/// let config = Config::load(None)?;
/// let pipeline = create_pipeline(&config, Arc::new(InMemoryIndex::new())).await?;
///
/// let handle = pipeline
///     .submit(FileSubmission::new(
///         FileId::new("src/lib.rs"),
///         "src/lib.rs",
///         b"fn main() {}".to_vec(),
///     ))
///     .await?;
/// let outcome = handle.outcome().await;
/// println!("{:?}", outcome.status);
///
/// pipeline.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub async fn create_pipeline(config: &Config, backend: Arc<dyn IndexBackend>) -> Result<Pipeline> {
    config.validate()?;
    let registry = Arc::new(ParserRegistry::from_config(&config.parser)?);
    let embeddings = create_embedding_manager_from_app_config(&config.embeddings).await?;
    Pipeline::start(config, registry, embeddings, backend)
}
