//! Per-file task state machine
//!
//! A run moves `Queued -> Parsing -> Normalizing -> Chunking -> Embedding ->
//! Indexing -> Done`. `Skipped` and `Failed` are terminal and reachable from
//! any non-terminal state. All transitions go through [`PipelineTask::apply`]
//! so the rules can be tested without any worker pools.

use codeindex_core::error::{Error, Result};
use codeindex_core::FileId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages that perform external work and can fail transiently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Parse,
    Embed,
    Index,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => f.write_str("parse"),
            Self::Embed => f.write_str("embed"),
            Self::Index => f.write_str("index"),
        }
    }
}

/// Why a run ended without indexing anything new
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    UnsupportedLanguage,
    /// The file produced no chunks; any previous entries were removed
    NoChunks,
    /// A newer run for the same file exists
    Superseded,
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Deterministic; never retried
    ParseError(String),
    TransientExhausted {
        stage: PipelineStage,
        message: String,
    },
    /// The embedding service refused the request; never retried
    EmbeddingRefused(String),
    /// The backend kept reporting concurrent writes after a fresh diff
    ReconciliationConflict(String),
    Internal(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError(message) => write!(f, "parse error: {message}"),
            Self::TransientExhausted { stage, message } => {
                write!(f, "{stage} stage exhausted retries: {message}")
            }
            Self::EmbeddingRefused(message) => write!(f, "embedding refused: {message}"),
            Self::ReconciliationConflict(message) => {
                write!(f, "reconciliation conflict: {message}")
            }
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Parsing,
    Normalizing,
    Chunking,
    Embedding,
    Indexing,
    Done,
    Skipped(SkipReason),
    Failed(FailureReason),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped(_) | Self::Failed(_))
    }

    /// The external stage this state belongs to, if any
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Parsing | Self::Normalizing | Self::Chunking => Some(PipelineStage::Parse),
            Self::Embedding => Some(PipelineStage::Embed),
            Self::Indexing => Some(PipelineStage::Index),
            _ => None,
        }
    }

    pub fn terminal(&self) -> Option<TerminalStatus> {
        match self {
            Self::Done => Some(TerminalStatus::Done),
            Self::Skipped(reason) => Some(TerminalStatus::Skipped(reason.clone())),
            Self::Failed(reason) => Some(TerminalStatus::Failed(reason.clone())),
            _ => None,
        }
    }
}

/// Status reported to the caller once a run ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    Done,
    Skipped(SkipReason),
    Failed(FailureReason),
}

impl TerminalStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Stage completion events driving [`PipelineTask::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Start,
    Parsed,
    Normalized,
    Chunked,
    Embedded,
    Indexed,
    /// The committed version already matches the submitted bytes
    Unchanged,
    /// The file was removed; only reconciliation remains
    Delete,
    /// A transient failure will be retried in the current state
    Retry(String),
    Skip(SkipReason),
    Fail(FailureReason),
}

/// Unit of work moving through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTask {
    pub file_id: FileId,
    pub generation: u64,
    /// Last stage the run must complete
    pub target: PipelineStage,
    state: TaskState,
    /// Retries spent in the current state
    attempts: u32,
    total_retries: u32,
    last_error: Option<String>,
}

impl PipelineTask {
    pub fn new(file_id: FileId, generation: u64) -> Self {
        Self {
            file_id,
            generation,
            target: PipelineStage::Index,
            state: TaskState::Queued,
            attempts: 0,
            total_retries: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn total_retries(&self) -> u32 {
        self.total_retries
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Apply one event, returning the new state
    ///
    /// Events that do not fit the current state are rejected and leave the
    /// task unchanged.
    pub fn apply(&mut self, event: TaskEvent) -> Result<&TaskState> {
        use TaskEvent as E;
        use TaskState as S;

        if self.state.is_terminal() {
            return Err(self.invalid(&event));
        }

        let next = match (&self.state, event) {
            (_, E::Retry(error)) => {
                self.attempts += 1;
                self.total_retries += 1;
                self.last_error = Some(error);
                return Ok(&self.state);
            }
            (_, E::Skip(reason)) => S::Skipped(reason),
            (_, E::Fail(reason)) => {
                self.last_error = Some(reason.to_string());
                S::Failed(reason)
            }
            (S::Queued, E::Start) => S::Parsing,
            (S::Queued, E::Delete) => S::Indexing,
            (S::Parsing, E::Parsed) => S::Normalizing,
            (S::Parsing, E::Unchanged) => S::Done,
            (S::Normalizing, E::Normalized) => S::Chunking,
            (S::Chunking, E::Chunked) => S::Embedding,
            (S::Embedding, E::Embedded) => S::Indexing,
            (S::Indexing, E::Indexed) => S::Done,
            (_, event) => return Err(self.invalid(&event)),
        };

        if next.stage() != self.state.stage() {
            self.attempts = 0;
        }
        self.state = next;
        Ok(&self.state)
    }

    fn invalid(&self, event: &TaskEvent) -> Error {
        Error::invalid_input(format!(
            "event {event:?} is not valid for {} in state {:?}",
            self.file_id, self.state
        ))
    }
}
