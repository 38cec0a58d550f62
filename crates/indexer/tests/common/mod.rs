//! Shared pipeline test harness

#![allow(dead_code)]

use codeindex_core::{Config, FileId};
use codeindex_embeddings::{EmbeddingManager, EmbeddingProvider, MockEmbeddingProvider};
use codeindex_indexer::{FileOutcome, FileSubmission, Pipeline};
use codeindex_languages::ParserRegistry;
use codeindex_storage::{IndexEntry, InMemoryIndex};
use std::sync::Arc;

pub const DIMENSION: usize = 8;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Small, fast configuration: one chunk per function, quick retries
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.embeddings.provider = "mock".to_string();
    config.embeddings.embedding_dimension = DIMENSION;
    config.chunker.merge_below_bytes = 0;
    config.indexer.max_attempts = 3;
    config.indexer.initial_backoff_ms = 1;
    config.indexer.max_backoff_ms = 5;
    config
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub index: InMemoryIndex,
    pub provider: Arc<MockEmbeddingProvider>,
}

impl Harness {
    pub fn start(config: &Config) -> Self {
        let registry = ParserRegistry::from_config(&config.parser).expect("default registry");
        Self::start_with_registry(config, registry)
    }

    pub fn start_with_registry(config: &Config, registry: ParserRegistry) -> Self {
        init_tracing();
        let index = InMemoryIndex::new();
        let provider = Arc::new(MockEmbeddingProvider::new(
            config.embeddings.embedding_dimension,
        ));
        let as_provider: Arc<dyn EmbeddingProvider> = provider.clone();
        let embeddings = Arc::new(EmbeddingManager::new(
            as_provider,
            "mock",
            &config.embeddings,
        ));
        let pipeline = Pipeline::start(
            config,
            Arc::new(registry),
            embeddings,
            Arc::new(index.clone()),
        )
        .expect("pipeline starts");
        Self {
            pipeline,
            index,
            provider,
        }
    }

    /// Submit one file and wait for its run to end
    pub async fn index(&self, path: &str, source: &str) -> FileOutcome {
        self.pipeline
            .submit(FileSubmission::new(FileId::new(path), path, source))
            .await
            .expect("submit")
            .outcome()
            .await
    }

    /// Live entries of one file, sorted by chunk order
    pub async fn entries(&self, path: &str) -> Vec<IndexEntry> {
        let mut entries = self
            .index
            .snapshot()
            .await
            .remove(&FileId::new(path))
            .unwrap_or_default();
        entries.sort_by_key(|e| e.chunk_index);
        entries
    }

    pub async fn names(&self, path: &str) -> Vec<String> {
        self.entries(path)
            .await
            .into_iter()
            .map(|e| e.key.qualified_name)
            .collect()
    }
}
