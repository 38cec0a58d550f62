//! Per-file payloads passed between pipeline stages

use crate::index_writer::ReconcileCounts;
use crate::pipeline::FileOutcome;
use crate::task::{PipelineTask, TaskEvent};
use codeindex_core::error::Result;
use codeindex_core::{Chunk, ContentHash, FileId};
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::debug;

/// One file's run, carried from stage to stage until it ends
pub(crate) struct Run {
    pub task: PipelineTask,
    /// Hash of the submitted bytes; `None` for deletions
    pub content_hash: Option<ContentHash>,
    pub parse_error: Option<String>,
    pub counts: Option<ReconcileCounts>,
    pub reply: oneshot::Sender<FileOutcome>,
}

impl Run {
    pub fn new(file_id: FileId, generation: u64, reply: oneshot::Sender<FileOutcome>) -> Self {
        Self {
            task: PipelineTask::new(file_id, generation),
            content_hash: None,
            parse_error: None,
            counts: None,
            reply,
        }
    }

    pub fn file_id(&self) -> &FileId {
        &self.task.file_id
    }

    pub fn generation(&self) -> u64 {
        self.task.generation
    }

    pub fn advance(&mut self, event: TaskEvent) -> Result<()> {
        self.task.apply(event).map(|_| ())
    }

    pub fn record_retry(&mut self, error: impl ToString) {
        if let Err(e) = self.task.apply(TaskEvent::Retry(error.to_string())) {
            debug!(file_id = %self.task.file_id, "Retry not recorded: {e}");
        }
    }
}

/// Submitted file waiting for a parse worker
pub(crate) struct ParseJob {
    pub run: Run,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub previous_content_hash: Option<ContentHash>,
}

/// Chunked file waiting for vectors
pub(crate) struct EmbedJob {
    pub run: Run,
    /// Vectors already attached from the previous run
    pub unchanged: Vec<Chunk>,
    pub needs_embedding: Vec<Chunk>,
}

/// Complete chunk set waiting for reconciliation; empty for deletions
pub(crate) struct IndexJob {
    pub run: Run,
    pub chunks: Vec<Chunk>,
}
