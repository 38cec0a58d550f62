//! Core types for the codeindex parsing and indexing pipeline
//!
//! This crate provides the language-agnostic vocabulary shared by every
//! other crate in the workspace:
//!
//! - **Symbols**: the canonical model of a parsed declaration, stored in an
//!   arena with parent back-references
//! - **Chunks**: bounded-size embeddable units derived from symbols
//! - **Hashing**: content fingerprints and stable chunk identities
//! - **Configuration**: layered file/environment configuration
//! - **Error handling**: unified error types
//!
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod chunk;
pub mod config;
pub mod error;
pub mod hashing;
pub mod symbol;

// Re-export main types for convenience
pub use chunk::{Chunk, ChunkId, ChunkKey, ChunkPart, ContentHash, FileId};
pub use config::{
    ChunkerConfig, Config, EmbeddingsConfig, IndexerConfig, NormalizerConfig, ParserConfig,
};
pub use error::{Error, Result, ResultExt};
pub use hashing::{
    content_hash, file_content_hash, generate_chunk_id, normalize_text, ScopeContext,
};
pub use symbol::{
    ByteRange, Language, LineRange, ParseOutput, ParseResult, ParseStatus, Symbol, SymbolId,
    SymbolKind, SymbolTree, SyntaxIssue,
};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
