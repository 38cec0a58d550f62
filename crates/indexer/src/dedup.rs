//! Content-hash deduplication
//!
//! Each file remembers the content hashes (and vectors) of its last
//! committed chunk set. A new chunk whose hash is already known reuses the
//! stored vector instead of calling the embedding model again.

use codeindex_core::{Chunk, ContentHash, FileId};
use codeindex_storage::{IndexBackend, IndexEntry};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hashes of a file's committed chunks, with their vectors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorChunks {
    /// `None` marks a keyword-only entry
    by_hash: HashMap<ContentHash, Option<Vec<f32>>>,
}

impl PriorChunks {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        Self {
            by_hash: chunks
                .iter()
                .map(|c| (c.content_hash.clone(), c.embedding.clone()))
                .collect(),
        }
    }

    pub fn from_entries(entries: &[IndexEntry]) -> Self {
        Self {
            by_hash: entries
                .iter()
                .map(|e| (e.content_hash.clone(), e.vector.clone()))
                .collect(),
        }
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

/// Result of [`Deduplicator::filter`]
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub needs_embedding: Vec<Chunk>,
    /// Chunks whose text was seen before; vectors are already attached
    pub unchanged: Vec<Chunk>,
}

/// Per-file prior hashes, keyed by file so unrelated files never contend
#[derive(Debug, Default)]
pub struct Deduplicator {
    prior: DashMap<FileId, (u64, Arc<PriorChunks>)>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prior_for(&self, file_id: &FileId) -> Option<Arc<PriorChunks>> {
        self.prior.get(file_id).map(|slot| slot.1.clone())
    }

    /// Prior hashes for a file, loading them from the index on first use
    ///
    /// A failed load is not fatal: the file is treated as new and every
    /// chunk is embedded.
    pub async fn prior_or_load(
        &self,
        file_id: &FileId,
        backend: &dyn IndexBackend,
    ) -> Arc<PriorChunks> {
        if let Some(prior) = self.prior_for(file_id) {
            return prior;
        }

        match backend.live_entries(file_id).await {
            Ok(entries) => {
                let loaded = Arc::new(PriorChunks::from_entries(&entries));
                debug!(
                    file_id = %file_id,
                    hashes = loaded.len(),
                    "Loaded prior chunk hashes from index"
                );
                self.prior
                    .entry(file_id.clone())
                    .or_insert((0, loaded))
                    .1
                    .clone()
            }
            Err(e) => {
                warn!(file_id = %file_id, "Failed to load prior chunk hashes: {e}");
                Arc::new(PriorChunks::default())
            }
        }
    }

    /// Split chunks into those that need a vector and those whose text is
    /// unchanged, copying the known vector onto the latter
    pub fn filter(&self, chunks: Vec<Chunk>, prior: &PriorChunks) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        for mut chunk in chunks {
            match prior.by_hash.get(&chunk.content_hash) {
                Some(vector) => {
                    chunk.embedding = vector.clone();
                    outcome.unchanged.push(chunk);
                }
                None => outcome.needs_embedding.push(chunk),
            }
        }
        outcome
    }

    /// Remember the chunk set committed by run `generation`
    ///
    /// Ignored when a later run has already recorded its chunks. An empty
    /// set drops the file's entry.
    pub fn record(&self, file_id: &FileId, generation: u64, chunks: &[Chunk]) {
        if chunks.is_empty() {
            self.prior
                .remove_if(file_id, |_, slot| slot.0 <= generation);
            return;
        }
        let prior = Arc::new(PriorChunks::from_chunks(chunks));
        self.prior
            .entry(file_id.clone())
            .and_modify(|slot| {
                if slot.0 <= generation {
                    *slot = (generation, prior.clone());
                }
            })
            .or_insert_with(|| (generation, prior.clone()));
    }
}
