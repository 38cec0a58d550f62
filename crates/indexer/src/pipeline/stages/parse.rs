//! Stage 1: Parse
//!
//! Parses each file off the async runtime, then normalizes, chunks and
//! deduplicates it before handing it to the embed stage.

use crate::dedup::DedupOutcome;
use crate::pipeline::batches::{EmbedJob, ParseJob, Run};
use crate::pipeline::stages::{finish, internal, run_stage};
use crate::pipeline::PipelineContext;
use crate::task::{FailureReason, PipelineStage, SkipReason, TaskEvent};
use anyhow::anyhow;
use codeindex_core::error::Error;
use codeindex_core::{file_content_hash, ContentHash, ParseResult, ParseStatus};
use codeindex_languages::Resolution;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stage 1: Parse submitted files in parallel
pub(crate) async fn stage_parse(
    rx: mpsc::Receiver<ParseJob>,
    embed_tx: mpsc::Sender<EmbedJob>,
    ctx: Arc<PipelineContext>,
    workers: usize,
) -> usize {
    info!("Stage 1: Parsing with {workers} worker(s)");
    run_stage("Stage 1", rx, workers, move |job: ParseJob| {
        let ctx = ctx.clone();
        let embed_tx = embed_tx.clone();
        async move {
            let ParseJob {
                mut run,
                path,
                bytes,
                previous_content_hash,
            } = job;
            match prepare(&ctx, &mut run, &path, bytes, previous_content_hash).await {
                Ok(DedupOutcome {
                    needs_embedding,
                    unchanged,
                }) => {
                    let job = EmbedJob {
                        run,
                        unchanged,
                        needs_embedding,
                    };
                    if let Err(e) = embed_tx.send(job).await {
                        finish(&ctx, e.0.run, internal("embed stage closed"));
                    }
                }
                Err(event) => finish(&ctx, run, event),
            }
        }
    })
    .await
}

/// Everything up to deduplication; `Err` carries the event that ends the run
async fn prepare(
    ctx: &PipelineContext,
    run: &mut Run,
    path: &Path,
    bytes: Vec<u8>,
    previous_content_hash: Option<ContentHash>,
) -> Result<DedupOutcome, TaskEvent> {
    if !ctx.is_current(run) {
        return Err(TaskEvent::Skip(SkipReason::Superseded));
    }

    let content_hash = file_content_hash(&bytes);
    run.content_hash = Some(content_hash.clone());
    run.advance(TaskEvent::Start).map_err(internal)?;

    if previous_content_hash.as_ref() == Some(&content_hash) {
        if let Some(counts) = ctx.confirm_unchanged(run, &content_hash).await {
            debug!(file_id = %run.file_id(), "Content unchanged since last commit");
            run.counts = Some(counts);
            return Err(TaskEvent::Unchanged);
        }
        if !ctx.is_current(run) {
            return Err(TaskEvent::Skip(SkipReason::Superseded));
        }
    }

    let handle = match ctx.registry.resolve(path, &bytes) {
        Resolution::Supported(handle) => handle,
        Resolution::Unsupported => {
            debug!(file_id = %run.file_id(), path = %path.display(), "No parser for file");
            return Err(TaskEvent::Skip(SkipReason::UnsupportedLanguage));
        }
    };

    let bytes = Arc::new(bytes);
    let parsed = ctx
        .policy
        .run(
            "parse",
            || {
                let handle = handle.clone();
                let bytes = bytes.clone();
                let path = path.to_path_buf();
                async move {
                    tokio::task::spawn_blocking(move || handle.parse(&bytes, &path))
                        .await
                        .map_err(|e| Error::Other(anyhow!("parse task panicked: {e}")))?
                }
            },
            |_, e| run.record_retry(e),
        )
        .await;

    let output = match parsed {
        Ok(output) => ParseResult::new(
            run.file_id().clone(),
            path,
            handle.language(),
            content_hash,
            output,
        ),
        Err(e) if e.is_transient() => {
            return Err(TaskEvent::Fail(FailureReason::TransientExhausted {
                stage: PipelineStage::Parse,
                message: e.to_string(),
            }))
        }
        Err(e @ Error::Other(_)) => return Err(internal(e)),
        Err(e) => return Err(TaskEvent::Fail(FailureReason::ParseError(e.to_string()))),
    };

    if let ParseStatus::Failed { reason } = &output.status {
        return Err(TaskEvent::Fail(FailureReason::ParseError(reason.clone())));
    }
    run.parse_error = output.status.error_summary();
    if let Some(summary) = &run.parse_error {
        warn!(
            file_id = %run.file_id(),
            "Indexing symbols recovered around syntax errors: {summary}"
        );
    }
    run.advance(TaskEvent::Parsed).map_err(internal)?;

    let tree = ctx
        .normalizer
        .normalize(&output.symbols, &bytes, handle.boilerplate_keywords());
    run.advance(TaskEvent::Normalized).map_err(internal)?;

    let chunks = ctx.chunker.chunk(run.file_id(), &tree, &bytes);
    run.advance(TaskEvent::Chunked).map_err(internal)?;

    let prior = ctx
        .dedup
        .prior_or_load(run.file_id(), ctx.writer.backend().as_ref())
        .await;
    let total = chunks.len();
    let outcome = ctx.dedup.filter(chunks, &prior);
    debug!(
        file_id = %run.file_id(),
        language = %output.language,
        symbols = tree.len(),
        chunks = total,
        unchanged = outcome.unchanged.len(),
        "Prepared file"
    );
    Ok(outcome)
}
