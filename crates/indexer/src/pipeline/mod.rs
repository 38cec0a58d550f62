//! Per-file indexing pipeline
//!
//! Files are submitted one at a time and flow through three concurrent
//! stages connected by bounded channels (see [`stages`]). Every submission
//! starts a new run for its file; the newest run always wins, and older
//! runs still in flight are discarded at the next stage boundary.

mod batches;
mod stages;

use crate::chunker::Chunker;
use crate::dedup::Deduplicator;
use crate::index_writer::{IndexWriter, ReconcileCounts};
use crate::retry::RetryPolicy;
use crate::runs::FileRuns;
use crate::stats::{PipelineStats, StatsRecorder};
use crate::task::{FailureReason, TaskEvent, TerminalStatus};
use anyhow::anyhow;
use batches::{IndexJob, ParseJob, Run};
use codeindex_core::error::{Error, Result};
use codeindex_core::{Config, ContentHash, FileId};
use codeindex_embeddings::EmbeddingManager;
use codeindex_languages::{Normalizer, ParserRegistry};
use codeindex_storage::IndexBackend;
use stages::{stage_embed, stage_index, stage_parse};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shared state read by every stage worker
pub(crate) struct PipelineContext {
    pub registry: Arc<ParserRegistry>,
    pub normalizer: Normalizer,
    pub chunker: Chunker,
    pub dedup: Deduplicator,
    pub runs: FileRuns,
    pub embeddings: Arc<EmbeddingManager>,
    pub writer: IndexWriter,
    pub policy: RetryPolicy,
    /// Chunks with fewer non-whitespace body bytes are indexed keyword-only
    pub min_embeddable_bytes: usize,
    pub stats: StatsRecorder,
}

impl PipelineContext {
    pub fn is_current(&self, run: &Run) -> bool {
        self.runs.is_current(run.file_id(), run.generation())
    }

    /// Re-publish the index's chunk set under this run when it was already
    /// built from `content_hash`
    pub async fn confirm_unchanged(
        &self,
        run: &Run,
        content_hash: &ContentHash,
    ) -> Option<ReconcileCounts> {
        let (file_id, generation) = (run.file_id(), run.generation());
        match self
            .writer
            .confirm_unchanged(file_id, generation, content_hash, || {
                self.runs.is_current(file_id, generation)
            })
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                warn!(file_id = %file_id, "Failed to confirm unchanged file, reindexing: {e}");
                None
            }
        }
    }
}

/// A file's current bytes, ready to be indexed
#[derive(Debug, Clone)]
pub struct FileSubmission {
    pub file_id: FileId,
    /// Used for language resolution only; nothing is read from disk
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    /// Hash the caller last saw indexed, enabling the unchanged fast path
    pub previous_content_hash: Option<ContentHash>,
}

impl FileSubmission {
    pub fn new(file_id: FileId, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_id,
            path: path.into(),
            bytes: bytes.into(),
            previous_content_hash: None,
        }
    }

    pub fn with_previous_hash(mut self, content_hash: ContentHash) -> Self {
        self.previous_content_hash = Some(content_hash);
        self
    }
}

/// Final report for one run
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub file_id: FileId,
    pub generation: u64,
    /// `None` for deletions and runs that ended before hashing
    pub content_hash: Option<ContentHash>,
    pub status: TerminalStatus,
    /// Syntax errors the parser recovered from, if any
    pub parse_error: Option<String>,
    /// Entry-level changes, present once the run committed
    pub counts: Option<ReconcileCounts>,
    pub retries: u32,
}

/// Handle to a submitted run
#[derive(Debug)]
pub struct RunHandle {
    file_id: FileId,
    generation: u64,
    rx: oneshot::Receiver<FileOutcome>,
}

impl RunHandle {
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the run to reach a terminal state
    pub async fn outcome(self) -> FileOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => FileOutcome {
                file_id: self.file_id,
                generation: self.generation,
                content_hash: None,
                status: TerminalStatus::Failed(FailureReason::Internal(
                    "run aborted before completion".to_string(),
                )),
                parse_error: None,
                counts: None,
                retries: 0,
            },
        }
    }
}

/// Running pipeline
pub struct Pipeline {
    context: Arc<PipelineContext>,
    parse_tx: mpsc::Sender<ParseJob>,
    index_tx: mpsc::Sender<IndexJob>,
    stages: Vec<JoinHandle<usize>>,
}

impl Pipeline {
    /// Validate the configuration and spawn the stage workers
    pub fn start(
        config: &Config,
        registry: Arc<ParserRegistry>,
        embeddings: Arc<EmbeddingManager>,
        backend: Arc<dyn IndexBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let indexer = &config.indexer;
        let policy = RetryPolicy::from_config(indexer);

        info!(
            "Starting pipeline with config: parse_workers={}, embed_workers={}, \
             index_workers={}, channel_capacity={}, max_attempts={}, languages={:?}, model={}",
            indexer.parse_workers,
            indexer.embed_workers,
            indexer.index_workers,
            indexer.pipeline_channel_capacity,
            indexer.max_attempts,
            registry.names(),
            embeddings.model_version()
        );

        let context = Arc::new(PipelineContext {
            registry,
            normalizer: Normalizer::new(config.normalizer.clone()),
            chunker: Chunker::new(config.chunker.clone()),
            dedup: Deduplicator::new(),
            runs: FileRuns::new(),
            embeddings,
            writer: IndexWriter::new(backend, indexer.index_write_timeout(), policy.clone()),
            policy,
            min_embeddable_bytes: config.embeddings.min_embeddable_bytes,
            stats: StatsRecorder::default(),
        });

        let capacity = indexer.pipeline_channel_capacity;
        let (parse_tx, parse_rx) = mpsc::channel::<ParseJob>(capacity);
        let (embed_tx, embed_rx) = mpsc::channel(capacity);
        let (index_tx, index_rx) = mpsc::channel::<IndexJob>(capacity);

        let stages = vec![
            tokio::spawn(stage_parse(
                parse_rx,
                embed_tx,
                context.clone(),
                indexer.parse_workers,
            )),
            tokio::spawn(stage_embed(
                embed_rx,
                index_tx.clone(),
                context.clone(),
                indexer.embed_workers,
            )),
            tokio::spawn(stage_index(index_rx, context.clone(), indexer.index_workers)),
        ];

        Ok(Self {
            context,
            parse_tx,
            index_tx,
            stages,
        })
    }

    /// Start a run for the submitted bytes
    ///
    /// Any earlier run for the same file still in flight becomes stale.
    /// Waits for channel capacity when the pipeline is saturated.
    pub async fn submit(&self, submission: FileSubmission) -> Result<RunHandle> {
        let FileSubmission {
            file_id,
            path,
            bytes,
            previous_content_hash,
        } = submission;

        let generation = self.context.runs.begin(&file_id);
        let (reply, rx) = oneshot::channel();
        let job = ParseJob {
            run: Run::new(file_id.clone(), generation, reply),
            path,
            bytes,
            previous_content_hash,
        };
        if self.parse_tx.send(job).await.is_err() {
            self.context.runs.finish(&file_id, generation);
            return Err(Error::Other(anyhow!("Pipeline is shut down")));
        }

        Ok(RunHandle {
            file_id,
            generation,
            rx,
        })
    }

    /// Start a run that removes every entry of a deleted file
    pub async fn delete_file(&self, file_id: FileId) -> Result<RunHandle> {
        let generation = self.context.runs.begin(&file_id);
        let (reply, rx) = oneshot::channel();
        let mut run = Run::new(file_id.clone(), generation, reply);
        if let Err(e) = run.advance(TaskEvent::Delete) {
            self.context.runs.finish(&file_id, generation);
            return Err(e);
        }

        let job = IndexJob {
            run,
            chunks: Vec::new(),
        };
        if self.index_tx.send(job).await.is_err() {
            self.context.runs.finish(&file_id, generation);
            return Err(Error::Other(anyhow!("Pipeline is shut down")));
        }

        Ok(RunHandle {
            file_id,
            generation,
            rx,
        })
    }

    /// Files with a run that has not ended yet
    pub fn files_in_flight(&self) -> usize {
        self.context.runs.in_flight()
    }

    /// Counters accumulated since start
    pub fn stats(&self) -> PipelineStats {
        self.context.stats.snapshot()
    }

    /// Stop accepting files and wait for every submitted run to finish
    pub async fn shutdown(self) -> Result<PipelineStats> {
        let Self {
            context,
            parse_tx,
            index_tx,
            stages,
        } = self;
        drop(parse_tx);
        drop(index_tx);

        for (idx, stage) in stages.into_iter().enumerate() {
            stage
                .await
                .map_err(|e| Error::Other(anyhow!("Stage {} panicked: {e}", idx + 1)))?;
        }

        let stats = context.stats.snapshot();
        info!(
            "Pipeline finished: {} done, {} skipped, {} failed; {} chunk(s) embedded, \
             {} reused, {} keyword-only, {} embedding call(s), {} stale run(s) discarded",
            stats.files_done,
            stats.files_skipped,
            stats.files_failed,
            stats.chunks_embedded,
            stats.chunks_reused,
            stats.chunks_keyword_only,
            stats.embedding_calls,
            stats.stale_runs_discarded
        );
        Ok(stats)
    }
}
