//! Pipeline stage workers
//!
//! The pipeline consists of 3 stages that run concurrently:
//! 1. **Parse** - Resolve, parse, normalize, chunk and deduplicate a file
//! 2. **Embed** - Fill vectors for chunks whose text is new
//! 3. **Index** - Reconcile the file's chunk set against the index
//!
//! Each stage owns a bounded worker pool. Every file is handled by its own
//! task, so a failure or panic in one file never reaches another.

mod embed;
mod index;
mod parse;

pub(crate) use embed::stage_embed;
pub(crate) use index::stage_index;
pub(crate) use parse::stage_parse;

use crate::pipeline::batches::Run;
use crate::pipeline::{FileOutcome, PipelineContext};
use crate::task::{FailureReason, SkipReason, TaskEvent, TerminalStatus};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

/// Pull jobs from `rx` and run `handler` on each, at most `workers` at once
///
/// Returns once the channel is closed and every started job has finished.
pub(crate) async fn run_stage<J, F, Fut>(
    name: &'static str,
    mut rx: mpsc::Receiver<J>,
    workers: usize,
    handler: F,
) -> usize
where
    J: Send + 'static,
    F: Fn(J) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut processed = 0;

    while let Some(job) = rx.recv().await {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("{name}: worker pool closed: {e}");
                break;
            }
        };
        let work = handler(job);
        tasks.spawn(async move {
            work.await;
            drop(permit);
        });
        processed += 1;

        while let Some(result) = tasks.try_join_next() {
            log_worker_result(name, result);
        }
    }

    while let Some(result) = tasks.join_next().await {
        log_worker_result(name, result);
    }
    info!("{name}: drained after {processed} file(s)");
    processed
}

fn log_worker_result(name: &str, result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!("{name}: worker panicked: {e}");
    }
}

/// Event that fails a run because of a bug rather than bad input
pub(crate) fn internal(error: impl ToString) -> TaskEvent {
    TaskEvent::Fail(FailureReason::Internal(error.to_string()))
}

/// Apply the final event to a run and report its outcome
pub(crate) fn finish(ctx: &PipelineContext, run: Run, event: TaskEvent) {
    let Run {
        mut task,
        content_hash,
        parse_error,
        counts,
        reply,
    } = run;

    let applied = match task.apply(event) {
        Ok(state) => state.terminal(),
        Err(e) => Some(TerminalStatus::Failed(FailureReason::Internal(e.to_string()))),
    };
    let status = applied.unwrap_or_else(|| {
        TerminalStatus::Failed(FailureReason::Internal(format!(
            "run ended in non-terminal state {:?}",
            task.state()
        )))
    });

    match &status {
        TerminalStatus::Done => debug!(
            file_id = %task.file_id,
            generation = task.generation,
            retries = task.total_retries(),
            "Run done"
        ),
        TerminalStatus::Skipped(reason) => {
            if *reason == SkipReason::Superseded {
                ctx.stats.add_stale_run();
            }
            debug!(
                file_id = %task.file_id,
                generation = task.generation,
                reason = ?reason,
                "Run skipped"
            );
        }
        TerminalStatus::Failed(reason) => error!(
            file_id = %task.file_id,
            generation = task.generation,
            retries = task.total_retries(),
            "Run failed: {reason}"
        ),
    }
    ctx.stats.record_terminal(&status);
    ctx.runs.finish(&task.file_id, task.generation);

    let outcome = FileOutcome {
        file_id: task.file_id.clone(),
        generation: task.generation,
        content_hash,
        status,
        parse_error,
        counts,
        retries: task.total_retries(),
    };
    if reply.send(outcome).is_err() {
        debug!(file_id = %task.file_id, "Run handle dropped before completion");
    }
}
