//! Configuration module for the codeindex pipeline
//!
//! This module provides configuration structures and loading mechanisms.
//! Configuration can be loaded from TOML files and/or environment variables.
//! Every section is optional; missing keys fall back to the defaults in
//! `defaults.rs`.

mod defaults;
mod loading;

#[cfg(test)]
mod tests;

use crate::error::{Error, Result};
use crate::symbol::Language;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use defaults::*;

/// Returns the path to the global configuration file
///
/// The global config is stored at `~/.codeindex/config.toml`.
pub fn global_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::config("Unable to determine home directory".to_string()))?;
    Ok(home_dir.join(".codeindex").join("config.toml"))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub normalizer: NormalizerConfig,

    #[serde(default)]
    pub chunker: ChunkerConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub indexer: IndexerConfig,
}

/// Language parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Upper bound on a single parse; exceeding it is a transient failure
    #[serde(default = "default_parser_timeout_ms")]
    pub timeout_ms: u64,

    /// Languages registered at startup (rust, python, javascript, typescript, go)
    #[serde(default = "default_enabled_languages")]
    pub enabled_languages: Vec<String>,
}

impl ParserConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse `enabled_languages` into [`Language`] values
    pub fn languages(&self) -> Result<Vec<Language>> {
        self.enabled_languages
            .iter()
            .map(|name| {
                Language::from_str(name)
                    .map_err(|_| Error::config(format!("Unknown language '{name}'")))
            })
            .collect()
    }
}

/// Symbol normalization policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Maximum number of blank lines allowed between a comment block and the
    /// declaration it documents. Zero requires the comment to end on the line
    /// directly above.
    #[serde(default = "default_doc_comment_max_gap_lines")]
    pub doc_comment_max_gap_lines: usize,

    /// Remove access modifiers and similar keywords from signatures
    #[serde(default = "default_strip_modifiers")]
    pub strip_modifiers: bool,
}

/// Chunk sizing thresholds, in bytes of UTF-8 chunk text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Hard upper bound on chunk text length
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    /// Symbols smaller than this are merged with small neighbours; 0 disables
    /// merging
    #[serde(default = "default_merge_below_bytes")]
    pub merge_below_bytes: usize,

    /// Trailing lines of a split piece repeated at the start of the next one
    #[serde(default = "default_split_overlap_lines")]
    pub split_overlap_lines: usize,

    /// Orphaned comment blocks shorter than this are dropped
    #[serde(default = "default_min_orphan_doc_bytes")]
    pub min_orphan_doc_bytes: usize,

    /// Container residue shorter than this (after trimming) is dropped
    #[serde(default = "default_min_residual_bytes")]
    pub min_residual_bytes: usize,
}

/// Configuration for embeddings generation
///
/// # Providers
/// - `mock` (default): deterministic hash-based vectors, no network
/// - `localapi`: vLLM or any OpenAI-compatible API
#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Provider type: "mock" (default), "localapi"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name to use
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL for LocalApi provider
    #[serde(default = "default_api_base_url")]
    pub api_base_url: Option<String>,

    /// API key for authentication (or use EMBEDDING_API_KEY env var)
    pub api_key: Option<String>,

    /// Embedding dimension size
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Number of texts sent in a single embedding API request
    #[serde(default = "default_texts_per_api_request")]
    pub texts_per_api_request: usize,

    /// Maximum concurrent embedding API requests across all files
    #[serde(default = "default_max_concurrent_api_requests")]
    pub max_concurrent_api_requests: usize,

    /// Chunks with less non-whitespace text than this are indexed without a vector
    #[serde(default = "default_min_embeddable_bytes")]
    pub min_embeddable_bytes: usize,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl EmbeddingsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl std::fmt::Debug for EmbeddingsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingsConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***REDACTED***"))
            .field("embedding_dimension", &self.embedding_dimension)
            .field("texts_per_api_request", &self.texts_per_api_request)
            .field(
                "max_concurrent_api_requests",
                &self.max_concurrent_api_requests,
            )
            .field("min_embeddable_bytes", &self.min_embeddable_bytes)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Pipeline scheduling and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Capacity of each bounded inter-stage queue
    #[serde(default = "default_pipeline_channel_capacity")]
    pub pipeline_channel_capacity: usize,

    /// Files parsed concurrently
    #[serde(default = "default_parse_workers")]
    pub parse_workers: usize,

    /// Files in the embedding stage concurrently
    #[serde(default = "default_embed_workers")]
    pub embed_workers: usize,

    /// Files reconciled against the index concurrently
    #[serde(default = "default_index_workers")]
    pub index_workers: usize,

    /// Attempts per stage before a transient failure is escalated
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-call timeout for index writes
    #[serde(default = "default_index_write_timeout_ms")]
    pub index_write_timeout_ms: u64,
}

impl IndexerConfig {
    pub fn index_write_timeout(&self) -> Duration {
        Duration::from_millis(self.index_write_timeout_ms)
    }
}

// Default implementations

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_parser_timeout_ms(),
            enabled_languages: default_enabled_languages(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            doc_comment_max_gap_lines: default_doc_comment_max_gap_lines(),
            strip_modifiers: default_strip_modifiers(),
        }
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: default_max_chunk_bytes(),
            merge_below_bytes: default_merge_below_bytes(),
            split_overlap_lines: default_split_overlap_lines(),
            min_orphan_doc_bytes: default_min_orphan_doc_bytes(),
            min_residual_bytes: default_min_residual_bytes(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_base_url: default_api_base_url(),
            api_key: None,
            embedding_dimension: default_embedding_dimension(),
            texts_per_api_request: default_texts_per_api_request(),
            max_concurrent_api_requests: default_max_concurrent_api_requests(),
            min_embeddable_bytes: default_min_embeddable_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            pipeline_channel_capacity: default_pipeline_channel_capacity(),
            parse_workers: default_parse_workers(),
            embed_workers: default_embed_workers(),
            index_workers: default_index_workers(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            index_write_timeout_ms: default_index_write_timeout_ms(),
        }
    }
}

fn require_positive(value: usize, key: &str) -> Result<()> {
    if value == 0 {
        return Err(Error::config(format!("{key} must be greater than 0")));
    }
    Ok(())
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate provider
        let valid_providers = ["mock", "localapi"];
        if !valid_providers.contains(&self.embeddings.provider.as_str()) {
            return Err(Error::config(format!(
                "Invalid provider '{}'. Must be one of: {:?}",
                self.embeddings.provider, valid_providers
            )));
        }

        if self.parser.timeout_ms == 0 {
            return Err(Error::config(
                "parser.timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.parser.languages()?;

        // Validate chunker thresholds
        require_positive(self.chunker.max_chunk_bytes, "chunker.max_chunk_bytes")?;
        if self.chunker.max_chunk_bytes < 64 {
            return Err(Error::config(format!(
                "chunker.max_chunk_bytes too small (min 64, got {})",
                self.chunker.max_chunk_bytes
            )));
        }
        if self.chunker.merge_below_bytes > self.chunker.max_chunk_bytes {
            return Err(Error::config(format!(
                "chunker.merge_below_bytes ({}) must not exceed chunker.max_chunk_bytes ({})",
                self.chunker.merge_below_bytes, self.chunker.max_chunk_bytes
            )));
        }

        // Validate embeddings
        require_positive(
            self.embeddings.embedding_dimension,
            "embeddings.embedding_dimension",
        )?;
        require_positive(
            self.embeddings.texts_per_api_request,
            "embeddings.texts_per_api_request",
        )?;
        require_positive(
            self.embeddings.max_concurrent_api_requests,
            "embeddings.max_concurrent_api_requests",
        )?;
        if self.embeddings.max_concurrent_api_requests > 256 {
            return Err(Error::config(format!(
                "embeddings.max_concurrent_api_requests too large (max 256, got {})",
                self.embeddings.max_concurrent_api_requests
            )));
        }

        // Validate indexer configuration
        require_positive(
            self.indexer.pipeline_channel_capacity,
            "indexer.pipeline_channel_capacity",
        )?;
        require_positive(self.indexer.parse_workers, "indexer.parse_workers")?;
        require_positive(self.indexer.embed_workers, "indexer.embed_workers")?;
        require_positive(self.indexer.index_workers, "indexer.index_workers")?;
        if self.indexer.max_attempts == 0 {
            return Err(Error::config(
                "indexer.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.indexer.initial_backoff_ms > self.indexer.max_backoff_ms {
            return Err(Error::config(format!(
                "indexer.initial_backoff_ms ({}) must not exceed indexer.max_backoff_ms ({})",
                self.indexer.initial_backoff_ms, self.indexer.max_backoff_ms
            )));
        }

        Ok(())
    }
}
