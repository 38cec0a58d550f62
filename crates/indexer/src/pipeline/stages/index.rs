//! Stage 3: Index reconciliation

use crate::index_writer::{ReconcileOutcome, ReconcileRequest};
use crate::pipeline::batches::IndexJob;
use crate::pipeline::stages::{finish, internal, run_stage};
use crate::pipeline::PipelineContext;
use crate::task::{FailureReason, PipelineStage, SkipReason, TaskEvent};
use codeindex_core::error::Error;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Stage 3: Publish each file's chunk set to the index
pub(crate) async fn stage_index(
    rx: mpsc::Receiver<IndexJob>,
    ctx: Arc<PipelineContext>,
    workers: usize,
) -> usize {
    info!("Stage 3: Reconciling with {workers} worker(s)");
    run_stage("Stage 3", rx, workers, move |job: IndexJob| {
        let ctx = ctx.clone();
        async move { index_file(&ctx, job).await }
    })
    .await
}

async fn index_file(ctx: &PipelineContext, job: IndexJob) {
    let IndexJob { mut run, chunks } = job;
    let deletion = run.content_hash.is_none();
    let request = ReconcileRequest {
        file_id: run.file_id().clone(),
        generation: run.generation(),
        content_hash: run.content_hash.clone(),
        chunks,
    };

    let result = ctx
        .writer
        .reconcile(
            &request,
            || ctx.runs.is_current(&request.file_id, request.generation),
            |_, e| run.record_retry(e),
        )
        .await;

    let event = match result {
        Ok(ReconcileOutcome::Committed(counts)) => {
            run.counts = Some(counts);
            ctx.dedup
                .record(&request.file_id, request.generation, &request.chunks);
            if request.chunks.is_empty() && !deletion {
                TaskEvent::Skip(SkipReason::NoChunks)
            } else {
                TaskEvent::Indexed
            }
        }
        Ok(ReconcileOutcome::Stale) => TaskEvent::Skip(SkipReason::Superseded),
        Err(e @ Error::ReconciliationConflict { .. }) => {
            TaskEvent::Fail(FailureReason::ReconciliationConflict(e.to_string()))
        }
        Err(e) if e.is_transient() => TaskEvent::Fail(FailureReason::TransientExhausted {
            stage: PipelineStage::Index,
            message: e.to_string(),
        }),
        Err(e) => internal(e),
    };
    finish(ctx, run, event);
}
