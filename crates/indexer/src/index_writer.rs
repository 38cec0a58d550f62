//! Index reconciliation
//!
//! Brings the index's entries for one file in line with a run's chunk set.
//! The new set is diffed against the live entries, the differences are
//! staged, and a single `commit_file` publishes them. Writes for the same
//! file are serialized through a per-file lock; different files never wait
//! on each other.

use crate::retry::RetryPolicy;
use codeindex_core::error::{Error, Result};
use codeindex_core::{Chunk, ChunkId, ContentHash, FileId};
use codeindex_storage::{FileVersion, IndexBackend, IndexEntry, WriteTxn};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The chunk set a run wants to publish for a file
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub file_id: FileId,
    pub generation: u64,
    /// Hash of the source bytes; `None` when the file was deleted
    pub content_hash: Option<ContentHash>,
    pub chunks: Vec<Chunk>,
}

/// Entry-level effect of one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub inserted: usize,
    /// Same identity, new text, vector or position
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Committed(ReconcileCounts),
    /// A newer run owns the file; nothing was written
    Stale,
}

pub struct IndexWriter {
    backend: Arc<dyn IndexBackend>,
    locks: DashMap<FileId, Arc<Mutex<()>>>,
    write_timeout: Duration,
    policy: RetryPolicy,
}

impl IndexWriter {
    pub fn new(backend: Arc<dyn IndexBackend>, write_timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            backend,
            locks: DashMap::new(),
            write_timeout,
            policy,
        }
    }

    pub fn backend(&self) -> &Arc<dyn IndexBackend> {
        &self.backend
    }

    /// Reconcile one file
    ///
    /// `is_current` is checked before every attempt; once it returns false
    /// the run is reported as stale without writing. A write conflict is
    /// retried once with a fresh diff. Other transient failures back off per
    /// the retry policy, calling `on_retry` before each new attempt.
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        is_current: impl Fn() -> bool,
        on_retry: impl FnMut(u32, &Error),
    ) -> Result<ReconcileOutcome> {
        self.with_file_lock(
            &request.file_id,
            self.reconcile_locked(request, is_current, on_retry),
        )
        .await
    }

    async fn reconcile_locked(
        &self,
        request: &ReconcileRequest,
        is_current: impl Fn() -> bool,
        mut on_retry: impl FnMut(u32, &Error),
    ) -> Result<ReconcileOutcome> {
        let mut attempt = 1;
        let mut conflicted = false;
        loop {
            if !is_current() {
                debug!(
                    file_id = %request.file_id,
                    generation = request.generation,
                    "Run superseded before index write"
                );
                return Ok(ReconcileOutcome::Stale);
            }

            let err = match self.try_reconcile(request).await {
                Ok(counts) => return Ok(ReconcileOutcome::Committed(counts)),
                Err(e) => e,
            };
            match err {
                Error::StaleRun { .. } => {
                    debug!(
                        file_id = %request.file_id,
                        generation = request.generation,
                        "Index holds a newer generation, discarding run"
                    );
                    return Ok(ReconcileOutcome::Stale);
                }
                Error::ReconciliationConflict { .. } if !conflicted => {
                    warn!(
                        file_id = %request.file_id,
                        "Write conflict, retrying with a fresh diff: {err}"
                    );
                    on_retry(attempt, &err);
                    conflicted = true;
                }
                Error::ReconciliationConflict { .. } => return Err(err),
                e if e.is_transient() && attempt < self.policy.max_attempts() => {
                    let backoff = self.policy.backoff(attempt);
                    warn!(
                        file_id = %request.file_id,
                        "Index write failed: {e}. Retrying in {backoff:?} (attempt {attempt}/{})",
                        self.policy.max_attempts()
                    );
                    on_retry(attempt, &e);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                e => return Err(e),
            }
        }
    }

    /// Claim an already indexed chunk set for a newer run
    ///
    /// Under the file's write lock, checks that the visible version was built
    /// from `content_hash` and re-commits the live entries unchanged at
    /// `generation`, so no older run still in flight can publish over it.
    /// Returns `None` when the run was superseded or the index holds other
    /// content; the caller then indexes the file normally.
    pub async fn confirm_unchanged(
        &self,
        file_id: &FileId,
        generation: u64,
        content_hash: &ContentHash,
        is_current: impl Fn() -> bool,
    ) -> Result<Option<ReconcileCounts>> {
        self.with_file_lock(
            file_id,
            self.confirm_locked(file_id, generation, content_hash, is_current),
        )
        .await
    }

    async fn confirm_locked(
        &self,
        file_id: &FileId,
        generation: u64,
        content_hash: &ContentHash,
        is_current: impl Fn() -> bool,
    ) -> Result<Option<ReconcileCounts>> {
        if !is_current() {
            return Ok(None);
        }

        let txn = self.timed(self.backend.begin_file(file_id)).await?;
        let matches = txn
            .base
            .as_ref()
            .is_some_and(|base| base.content_hash.as_ref() == Some(content_hash));
        let result = if matches {
            self.recommit(&txn, generation, content_hash).await.map(Some)
        } else {
            Ok(None)
        };
        if !matches!(result, Ok(Some(_))) {
            if let Err(e) = self.timed(self.backend.rollback(&txn)).await {
                warn!(file_id = %file_id, "Rollback failed: {e}");
            }
        }
        result
    }

    async fn recommit(
        &self,
        txn: &WriteTxn,
        generation: u64,
        content_hash: &ContentHash,
    ) -> Result<ReconcileCounts> {
        let live: BTreeSet<ChunkId> = self
            .timed(self.backend.live_entries(&txn.file_id))
            .await?
            .into_iter()
            .map(|entry| entry.chunk_id)
            .collect();
        let version = FileVersion {
            content_hash: Some(content_hash.clone()),
            generation,
        };
        self.timed(self.backend.commit_file(txn, &live, version))
            .await?;
        debug!(
            file_id = %txn.file_id,
            generation,
            entries = live.len(),
            "Confirmed unchanged file"
        );
        Ok(ReconcileCounts {
            unchanged: live.len(),
            ..Default::default()
        })
    }

    /// Run `work` holding the file's write lock
    ///
    /// The lock entry is dropped again once no other writer holds or waits
    /// on it, so the map only tracks files with a write in progress.
    async fn with_file_lock<T>(&self, file_id: &FileId, work: impl Future<Output = T>) -> T {
        let lock = self.locks.entry(file_id.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.locks
            .remove_if(file_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn try_reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileCounts> {
        let txn = self.timed(self.backend.begin_file(&request.file_id)).await?;
        let result = self.stage_and_commit(&txn, request).await;
        if result.is_err() {
            if let Err(e) = self.timed(self.backend.rollback(&txn)).await {
                warn!(file_id = %request.file_id, "Rollback failed: {e}");
            }
        }
        result
    }

    async fn stage_and_commit(
        &self,
        txn: &WriteTxn,
        request: &ReconcileRequest,
    ) -> Result<ReconcileCounts> {
        let live: BTreeMap<ChunkId, IndexEntry> = self
            .timed(self.backend.live_entries(&request.file_id))
            .await?
            .into_iter()
            .map(|entry| (entry.chunk_id.clone(), entry))
            .collect();

        let mut counts = ReconcileCounts::default();
        let mut new_ids = BTreeSet::new();
        for chunk in &request.chunks {
            let entry = IndexEntry::from(chunk);
            new_ids.insert(entry.chunk_id.clone());
            match live.get(&entry.chunk_id) {
                Some(existing) if *existing == entry => {
                    counts.unchanged += 1;
                    continue;
                }
                Some(_) => counts.updated += 1,
                None => counts.inserted += 1,
            }
            self.timed(self.backend.upsert(txn, entry)).await?;
        }

        for chunk_id in live.keys().filter(|id| !new_ids.contains(*id)) {
            self.timed(self.backend.delete(txn, chunk_id)).await?;
            counts.deleted += 1;
        }

        let version = FileVersion {
            content_hash: request.content_hash.clone(),
            generation: request.generation,
        };
        self.timed(self.backend.commit_file(txn, &new_ids, version))
            .await?;

        debug!(
            file_id = %request.file_id,
            generation = request.generation,
            inserted = counts.inserted,
            updated = counts.updated,
            deleted = counts.deleted,
            unchanged = counts.unchanged,
            "Reconciled file"
        );
        Ok(counts)
    }

    async fn timed<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.write_timeout, call)
            .await
            .map_err(|_| Error::timeout("index write", self.write_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeindex_core::{
        content_hash, file_content_hash, generate_chunk_id, ByteRange, ChunkKey, ChunkPart,
        LineRange, SymbolKind,
    };
    use codeindex_storage::InMemoryIndex;
    use pretty_assertions::assert_eq;

    fn file() -> FileId {
        FileId::new("src/lib.rs")
    }

    fn chunk(name: &str, text: &str, index: u32, start: usize) -> Chunk {
        let key = ChunkKey::new(name, 0, ChunkPart::Whole);
        Chunk {
            chunk_id: generate_chunk_id(&file(), &key),
            file_id: file(),
            chunk_index: index,
            key,
            kind: SymbolKind::Function,
            context_header: String::new(),
            text: text.to_string(),
            byte_range: ByteRange::new(start, start + text.len()),
            line_range: LineRange::new(index as usize, index as usize + 1),
            content_hash: content_hash(name, text),
            embedding: Some(vec![0.5; 4]),
        }
    }

    fn request(generation: u64, chunks: Vec<Chunk>) -> ReconcileRequest {
        ReconcileRequest {
            file_id: file(),
            generation,
            content_hash: Some(file_content_hash(format!("{generation}").as_bytes())),
            chunks,
        }
    }

    fn writer(index: &InMemoryIndex) -> IndexWriter {
        IndexWriter::new(
            Arc::new(index.clone()),
            Duration::from_secs(5),
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40)),
        )
    }

    async fn committed(writer: &IndexWriter, request: &ReconcileRequest) -> ReconcileCounts {
        match writer.reconcile(request, || true, |_, _| {}).await.unwrap() {
            ReconcileOutcome::Committed(counts) => counts,
            ReconcileOutcome::Stale => panic!("unexpected stale outcome"),
        }
    }

    #[tokio::test]
    async fn test_diff_inserts_updates_and_deletes() {
        let index = InMemoryIndex::new();
        let writer = writer(&index);

        let first = request(
            1,
            vec![
                chunk("a", "fn a() {}", 0, 0),
                chunk("b", "fn b() {}", 1, 20),
                chunk("c", "fn c() {}", 2, 40),
            ],
        );
        assert_eq!(
            committed(&writer, &first).await,
            ReconcileCounts {
                inserted: 3,
                ..Default::default()
            }
        );

        let second = request(
            2,
            vec![
                chunk("a", "fn a() {}", 0, 0),
                chunk("c", "fn c() { 1 }", 1, 20),
            ],
        );
        assert_eq!(
            committed(&writer, &second).await,
            ReconcileCounts {
                inserted: 0,
                updated: 1,
                deleted: 1,
                unchanged: 1,
            }
        );

        let live = index.live_entries(&file()).await.unwrap();
        let names: Vec<&str> = live.iter().map(|e| e.key.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(
            index.file_version(&file()).await.unwrap().map(|v| v.generation),
            Some(2)
        );
        assert_eq!(index.open_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_moved_chunk_refreshes_position() {
        let index = InMemoryIndex::new();
        let writer = writer(&index);
        committed(&writer, &request(1, vec![chunk("a", "fn a() {}", 0, 0)])).await;

        let moved = chunk("a", "fn a() {}", 0, 100);
        let counts = committed(&writer, &request(2, vec![moved.clone()])).await;
        assert_eq!(counts.updated, 1);

        let live = index.live_entries(&file()).await.unwrap();
        assert_eq!(live[0].byte_range, moved.byte_range);
        assert_eq!(live[0].content_hash, moved.content_hash);
    }

    #[tokio::test]
    async fn test_superseded_run_writes_nothing() {
        let index = InMemoryIndex::new();
        let writer = writer(&index);

        let outcome = writer
            .reconcile(&request(1, vec![chunk("a", "fn a() {}", 0, 0)]), || false, |_, _| {})
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Stale);
        assert_eq!(index.write_counts().commits, 0);
    }

    #[tokio::test]
    async fn test_older_generation_is_discarded() {
        let index = InMemoryIndex::new();
        let writer = writer(&index);
        committed(&writer, &request(5, vec![chunk("new", "fn new() {}", 0, 0)])).await;

        let outcome = writer
            .reconcile(&request(3, vec![chunk("old", "fn old() {}", 0, 0)]), || true, |_, _| {})
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Stale);

        let live = index.live_entries(&file()).await.unwrap();
        assert_eq!(live[0].key.qualified_name, "new");
        assert_eq!(index.open_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried() {
        let index = InMemoryIndex::new();
        index.conflict_next_commits(1).await;
        let writer = writer(&index);

        let mut retries = 0;
        let outcome = writer
            .reconcile(&request(1, vec![chunk("a", "fn a() {}", 0, 0)]), || true, |_, _| {
                retries += 1
            })
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Committed(_)));
        assert_eq!(retries, 1);
        assert_eq!(index.live_entries(&file()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_conflict_escalates() {
        let index = InMemoryIndex::new();
        index.conflict_next_commits(2).await;
        let writer = writer(&index);

        let result = writer
            .reconcile(&request(1, vec![chunk("a", "fn a() {}", 0, 0)]), || true, |_, _| {})
            .await;

        assert!(matches!(result, Err(Error::ReconciliationConflict { .. })));
        assert!(index.live_entries(&file()).await.unwrap().is_empty());
        assert_eq!(index.open_transactions().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_commit_failures_back_off() {
        let index = InMemoryIndex::new();
        index.fail_next_commits(2).await;
        let writer = writer(&index);

        let outcome = writer
            .reconcile(&request(1, vec![chunk("a", "fn a() {}", 0, 0)]), || true, |_, _| {})
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Committed(_)));

        index.fail_next_commits(3).await;
        let result = writer
            .reconcile(&request(2, vec![]), || true, |_, _| {})
            .await;
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(index.live_entries(&file()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_unchanged_recommits_at_new_generation() {
        let index = InMemoryIndex::new();
        let writer = writer(&index);
        let first = request(1, vec![chunk("a", "fn a() {}", 0, 0), chunk("b", "fn b() {}", 1, 20)]);
        committed(&writer, &first).await;
        let hash = first.content_hash.clone().unwrap();
        index.reset_counts();

        let counts = writer
            .confirm_unchanged(&file(), 7, &hash, || true)
            .await
            .unwrap();
        assert_eq!(
            counts,
            Some(ReconcileCounts {
                unchanged: 2,
                ..Default::default()
            })
        );
        assert_eq!(
            index.file_version(&file()).await.unwrap(),
            Some(FileVersion {
                content_hash: Some(hash),
                generation: 7
            })
        );
        assert_eq!(index.write_counts().commits, 1);
        assert_eq!(index.live_entries(&file()).await.unwrap().len(), 2);

        let stale = writer
            .reconcile(&request(6, vec![]), || true, |_, _| {})
            .await
            .unwrap();
        assert_eq!(stale, ReconcileOutcome::Stale);
        assert_eq!(index.live_entries(&file()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_confirm_unchanged_rejects_other_content() {
        let index = InMemoryIndex::new();
        let writer = writer(&index);
        committed(&writer, &request(1, vec![chunk("a", "fn a() {}", 0, 0)])).await;
        index.reset_counts();

        let other = file_content_hash(b"something else");
        let counts = writer
            .confirm_unchanged(&file(), 2, &other, || true)
            .await
            .unwrap();
        assert_eq!(counts, None);
        assert_eq!(index.write_counts().commits, 0);
        assert_eq!(index.open_transactions().await, 0);
        assert_eq!(
            index.file_version(&file()).await.unwrap().map(|v| v.generation),
            Some(1)
        );

        let superseded = writer
            .confirm_unchanged(&file(), 3, &other, || false)
            .await
            .unwrap();
        assert_eq!(superseded, None);
    }

    #[tokio::test]
    async fn test_lock_entries_are_released_after_writes() {
        let index = InMemoryIndex::new();
        let writer = Arc::new(writer(&index));
        index.set_commit_delay(Some(Duration::from_millis(50))).await;

        let mut writes = tokio::task::JoinSet::new();
        for generation in 1..=4 {
            let writer = writer.clone();
            writes.spawn(async move {
                writer
                    .reconcile(
                        &request(generation, vec![chunk("a", "fn a() {}", 0, 0)]),
                        || true,
                        |_, _| {},
                    )
                    .await
            });
        }
        while let Some(result) = writes.join_next().await {
            result.unwrap().unwrap();
        }

        assert!(writer.locks.is_empty());
        assert_eq!(index.open_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_empty_chunk_set_clears_file() {
        let index = InMemoryIndex::new();
        let writer = writer(&index);
        committed(&writer, &request(1, vec![chunk("a", "fn a() {}", 0, 0)])).await;

        let deletion = ReconcileRequest {
            content_hash: None,
            ..request(2, Vec::new())
        };
        let counts = committed(&writer, &deletion).await;
        assert_eq!(counts.deleted, 1);
        assert!(index.live_entries(&file()).await.unwrap().is_empty());
        assert_eq!(
            index.file_version(&file()).await.unwrap(),
            Some(FileVersion {
                content_hash: None,
                generation: 2
            })
        );
    }
}
