#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Index collaborator boundary
//!
//! The index stores one entry per chunk. Writes for a file are staged inside
//! a [`WriteTxn`] and become visible to readers in a single
//! [`IndexBackend::commit_file`] call, so a reader sees either the old chunk
//! set of a file or the new one, never a mix.

pub mod error;
mod memory;

pub use error::StorageError;
pub use memory::InMemoryIndex;

use async_trait::async_trait;
use codeindex_core::{
    ByteRange, Chunk, ChunkId, ChunkKey, ContentHash, Error, FileId, LineRange, SymbolKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==== Traits ====

#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Start a staged write for `file_id`, remembering the version it is based on
    async fn begin_file(&self, file_id: &FileId) -> Result<WriteTxn, Error>;

    /// Stage an insert or replacement of one entry
    async fn upsert(&self, txn: &WriteTxn, entry: IndexEntry) -> Result<(), Error>;

    /// Stage removal of one entry
    async fn delete(&self, txn: &WriteTxn, chunk_id: &ChunkId) -> Result<(), Error>;

    /// Atomically publish the staged writes
    ///
    /// Fails with a conflict when the file's visible version changed since
    /// `begin_file`, with a stale-version error when `version` is older than
    /// the visible one, and with a set mismatch when the resulting entries
    /// differ from `new_chunk_ids`. On failure nothing becomes visible.
    async fn commit_file(
        &self,
        txn: &WriteTxn,
        new_chunk_ids: &BTreeSet<ChunkId>,
        version: FileVersion,
    ) -> Result<(), Error>;

    /// Discard staged writes
    async fn rollback(&self, txn: &WriteTxn) -> Result<(), Error>;

    /// Entries currently visible for a file, in chunk order
    async fn live_entries(&self, file_id: &FileId) -> Result<Vec<IndexEntry>, Error>;

    /// Version of the visible chunk set, if the file was ever committed
    async fn file_version(&self, file_id: &FileId) -> Result<Option<FileVersion>, Error>;
}

// ==== Models ====

/// Staged write handle for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTxn {
    pub txn_id: u64,
    pub file_id: FileId,
    /// Visible version when the transaction began
    pub base: Option<FileVersion>,
}

/// Identifies which run produced a file's visible chunk set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    /// Hash of the source bytes; `None` once the file is deleted
    pub content_hash: Option<ContentHash>,
    /// Monotonic per-file run number; later runs carry larger values
    pub generation: u64,
}

/// One stored chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    pub key: ChunkKey,
    pub kind: SymbolKind,
    pub chunk_index: u32,
    pub context_header: String,
    pub text: String,
    pub byte_range: ByteRange,
    pub line_range: LineRange,
    pub content_hash: ContentHash,
    /// `None` for keyword-only entries
    pub vector: Option<Vec<f32>>,
}

impl IndexEntry {
    pub fn is_keyword_only(&self) -> bool {
        self.vector.is_none()
    }
}

impl From<&Chunk> for IndexEntry {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            file_id: chunk.file_id.clone(),
            key: chunk.key.clone(),
            kind: chunk.kind,
            chunk_index: chunk.chunk_index,
            context_header: chunk.context_header.clone(),
            text: chunk.text.clone(),
            byte_range: chunk.byte_range,
            line_range: chunk.line_range,
            content_hash: chunk.content_hash.clone(),
            vector: chunk.embedding.clone(),
        }
    }
}
