//! Pipeline-wide counters

use crate::task::TerminalStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Totals across every run a pipeline has finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub files_done: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    /// Chunks that received a fresh vector
    pub chunks_embedded: usize,
    /// Chunks whose vector was reused from a previous run
    pub chunks_reused: usize,
    /// Chunks indexed without a vector
    pub chunks_keyword_only: usize,
    pub embedding_calls: usize,
    /// Runs dropped because a newer run for the same file exists
    pub stale_runs_discarded: usize,
}

impl PipelineStats {
    pub fn total_files(&self) -> usize {
        self.files_done + self.files_skipped + self.files_failed
    }

    /// Merge another stats instance into this one
    pub fn merge(&mut self, other: &PipelineStats) {
        self.files_done += other.files_done;
        self.files_skipped += other.files_skipped;
        self.files_failed += other.files_failed;
        self.chunks_embedded += other.chunks_embedded;
        self.chunks_reused += other.chunks_reused;
        self.chunks_keyword_only += other.chunks_keyword_only;
        self.embedding_calls += other.embedding_calls;
        self.stale_runs_discarded += other.stale_runs_discarded;
    }
}

/// Lock-free recorder shared by the stage workers
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    files_done: AtomicUsize,
    files_skipped: AtomicUsize,
    files_failed: AtomicUsize,
    chunks_embedded: AtomicUsize,
    chunks_reused: AtomicUsize,
    chunks_keyword_only: AtomicUsize,
    embedding_calls: AtomicUsize,
    stale_runs_discarded: AtomicUsize,
}

impl StatsRecorder {
    pub(crate) fn record_terminal(&self, status: &TerminalStatus) {
        let counter = match status {
            TerminalStatus::Done => &self.files_done,
            TerminalStatus::Skipped(_) => &self.files_skipped,
            TerminalStatus::Failed(_) => &self.files_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_embedded(&self, count: usize) {
        self.chunks_embedded.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_reused(&self, count: usize) {
        self.chunks_reused.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_keyword_only(&self, count: usize) {
        self.chunks_keyword_only.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_embedding_calls(&self, count: usize) {
        self.embedding_calls.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_stale_run(&self) {
        self.stale_runs_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            files_done: self.files_done.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            chunks_embedded: self.chunks_embedded.load(Ordering::Relaxed),
            chunks_reused: self.chunks_reused.load(Ordering::Relaxed),
            chunks_keyword_only: self.chunks_keyword_only.load(Ordering::Relaxed),
            embedding_calls: self.embedding_calls.load(Ordering::Relaxed),
            stale_runs_discarded: self.stale_runs_discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{FailureReason, SkipReason};

    #[test]
    fn test_recorder_snapshot() {
        let recorder = StatsRecorder::default();
        recorder.record_terminal(&TerminalStatus::Done);
        recorder.record_terminal(&TerminalStatus::Skipped(SkipReason::Superseded));
        recorder.record_terminal(&TerminalStatus::Failed(FailureReason::ParseError(
            "bad".into(),
        )));
        recorder.add_embedded(3);
        recorder.add_reused(2);
        recorder.add_stale_run();

        let stats = recorder.snapshot();
        assert_eq!(stats.total_files(), 3);
        assert_eq!(stats.chunks_embedded, 3);
        assert_eq!(stats.chunks_reused, 2);
        assert_eq!(stats.stale_runs_discarded, 1);
    }

    #[test]
    fn test_merge_adds_counters() {
        let mut total = PipelineStats {
            files_done: 1,
            embedding_calls: 2,
            ..Default::default()
        };
        total.merge(&PipelineStats {
            files_done: 2,
            files_failed: 1,
            embedding_calls: 3,
            ..Default::default()
        });
        assert_eq!(total.files_done, 3);
        assert_eq!(total.files_failed, 1);
        assert_eq!(total.embedding_calls, 5);
    }
}
