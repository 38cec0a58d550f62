//! In-memory index backend
//!
//! Reference implementation of [`IndexBackend`] used by tests and local
//! runs. Staged writes live per transaction and are applied under one lock
//! at commit time. Faults, conflicts and latency can be injected.

use async_trait::async_trait;
use codeindex_core::{ChunkId, Error, FileId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::{FileVersion, IndexBackend, IndexEntry, WriteTxn};

#[derive(Debug)]
struct StagedWrite {
    file_id: FileId,
    upserts: BTreeMap<ChunkId, IndexEntry>,
    deletes: BTreeSet<ChunkId>,
}

#[derive(Debug, Clone)]
struct FileState {
    version: FileVersion,
    entries: BTreeMap<ChunkId, IndexEntry>,
}

#[derive(Debug, Default)]
struct IndexData {
    files: HashMap<FileId, FileState>,
    staged: HashMap<u64, StagedWrite>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_commits: usize,
    conflicting_commits: usize,
    commit_delay: Option<Duration>,
}

/// Write counters, for asserting how much work a run caused
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub upserts: usize,
    pub deletes: usize,
    pub commits: usize,
}

/// Index backend holding everything in memory
#[derive(Clone, Default)]
pub struct InMemoryIndex {
    data: Arc<Mutex<IndexData>>,
    faults: Arc<Mutex<Faults>>,
    next_txn: Arc<AtomicU64>,
    upserts: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` commits with a transient backend error
    pub async fn fail_next_commits(&self, count: usize) {
        self.faults.lock().await.failing_commits += count;
    }

    /// Report a write conflict on the next `count` commits
    pub async fn conflict_next_commits(&self, count: usize) {
        self.faults.lock().await.conflicting_commits += count;
    }

    /// Sleep before every commit
    pub async fn set_commit_delay(&self, delay: Option<Duration>) {
        self.faults.lock().await.commit_delay = delay;
    }

    pub fn write_counts(&self) -> WriteCounts {
        WriteCounts {
            upserts: self.upserts.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            commits: self.commits.load(Ordering::SeqCst),
        }
    }

    pub fn reset_counts(&self) {
        self.upserts.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
        self.commits.store(0, Ordering::SeqCst);
    }

    /// Every visible entry across all files, ordered by file then chunk id
    pub async fn snapshot(&self) -> BTreeMap<FileId, Vec<IndexEntry>> {
        let data = self.data.lock().await;
        data.files
            .iter()
            .map(|(file_id, state)| (file_id.clone(), state.entries.values().cloned().collect()))
            .collect()
    }

    /// Number of transactions begun but neither committed nor rolled back
    pub async fn open_transactions(&self) -> usize {
        self.data.lock().await.staged.len()
    }

    /// Consume the next injected fault, if any
    async fn injected_fault(&self, file_id: &FileId) -> Option<StorageError> {
        let mut faults = self.faults.lock().await;
        if faults.failing_commits > 0 {
            faults.failing_commits -= 1;
            return Some(StorageError::BackendError("injected commit failure".to_string()));
        }
        if faults.conflicting_commits > 0 {
            faults.conflicting_commits -= 1;
            return Some(StorageError::Conflict {
                file_id: file_id.to_string(),
                message: "injected concurrent write".to_string(),
            });
        }
        None
    }
}

#[async_trait]
impl IndexBackend for InMemoryIndex {
    async fn begin_file(&self, file_id: &FileId) -> Result<WriteTxn, Error> {
        let txn_id = self.next_txn.fetch_add(1, Ordering::SeqCst);
        let mut data = self.data.lock().await;
        let base = data.files.get(file_id).map(|state| state.version.clone());
        data.staged.insert(
            txn_id,
            StagedWrite {
                file_id: file_id.clone(),
                upserts: BTreeMap::new(),
                deletes: BTreeSet::new(),
            },
        );
        Ok(WriteTxn {
            txn_id,
            file_id: file_id.clone(),
            base,
        })
    }

    async fn upsert(&self, txn: &WriteTxn, entry: IndexEntry) -> Result<(), Error> {
        let mut data = self.data.lock().await;
        let staged = data
            .staged
            .get_mut(&txn.txn_id)
            .ok_or(StorageError::UnknownTransaction(txn.txn_id))?;
        staged.deletes.remove(&entry.chunk_id);
        staged.upserts.insert(entry.chunk_id.clone(), entry);
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, txn: &WriteTxn, chunk_id: &ChunkId) -> Result<(), Error> {
        let mut data = self.data.lock().await;
        let staged = data
            .staged
            .get_mut(&txn.txn_id)
            .ok_or(StorageError::UnknownTransaction(txn.txn_id))?;
        staged.upserts.remove(chunk_id);
        staged.deletes.insert(chunk_id.clone());
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_file(
        &self,
        txn: &WriteTxn,
        new_chunk_ids: &BTreeSet<ChunkId>,
        version: FileVersion,
    ) -> Result<(), Error> {
        let delay = self.faults.lock().await.commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(fault) = self.injected_fault(&txn.file_id).await {
            return Err(fault.into());
        }

        let mut data = self.data.lock().await;
        let current = data.files.get(&txn.file_id).cloned();
        let current_version = current.as_ref().map(|s| s.version.clone());

        if current_version != txn.base {
            data.staged.remove(&txn.txn_id);
            return Err(StorageError::Conflict {
                file_id: txn.file_id.to_string(),
                message: "file changed since transaction began".to_string(),
            }
            .into());
        }
        if let Some(current_version) = &current_version {
            if version.generation < current_version.generation {
                data.staged.remove(&txn.txn_id);
                return Err(StorageError::StaleVersion {
                    file_id: txn.file_id.to_string(),
                    attempted: version.generation,
                    current: current_version.generation,
                }
                .into());
            }
        }

        let staged = data
            .staged
            .remove(&txn.txn_id)
            .ok_or(StorageError::UnknownTransaction(txn.txn_id))?;
        let mut entries = current.map(|s| s.entries).unwrap_or_default();
        for chunk_id in &staged.deletes {
            entries.remove(chunk_id);
        }
        entries.extend(staged.upserts);

        let actual: BTreeSet<&ChunkId> = entries.keys().collect();
        let missing = new_chunk_ids.iter().filter(|id| !actual.contains(id)).count();
        let unexpected = actual.iter().filter(|id| !new_chunk_ids.contains(**id)).count();
        if missing > 0 || unexpected > 0 {
            return Err(StorageError::SetMismatch {
                file_id: staged.file_id.to_string(),
                missing,
                unexpected,
            }
            .into());
        }

        debug!(
            file_id = %staged.file_id,
            generation = version.generation,
            entries = entries.len(),
            "Committed file"
        );
        data.files
            .insert(staged.file_id, FileState { version, entries });
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, txn: &WriteTxn) -> Result<(), Error> {
        self.data.lock().await.staged.remove(&txn.txn_id);
        Ok(())
    }

    async fn live_entries(&self, file_id: &FileId) -> Result<Vec<IndexEntry>, Error> {
        let data = self.data.lock().await;
        let mut entries: Vec<IndexEntry> = data
            .files
            .get(file_id)
            .map(|state| state.entries.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.chunk_index);
        Ok(entries)
    }

    async fn file_version(&self, file_id: &FileId) -> Result<Option<FileVersion>, Error> {
        let data = self.data.lock().await;
        Ok(data.files.get(file_id).map(|state| state.version.clone()))
    }
}
