//! Stage 2: Embedding generation
//!
//! Texts are deduplicated within the run and sent in bounded batches. When
//! a batch partly fails, only the failed texts are retried. A file moves on
//! only after every chunk has a vector or is marked keyword-only.

use crate::pipeline::batches::{EmbedJob, IndexJob, Run};
use crate::pipeline::stages::{finish, internal, run_stage};
use crate::pipeline::PipelineContext;
use crate::task::{FailureReason, PipelineStage, SkipReason, TaskEvent};
use codeindex_core::{Chunk, ContentHash};
use codeindex_embeddings::EmbeddingError;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A distinct text awaiting a vector
type PendingText = (ContentHash, String);

/// Stage 2: Generate embeddings for new chunks
pub(crate) async fn stage_embed(
    rx: mpsc::Receiver<EmbedJob>,
    index_tx: mpsc::Sender<IndexJob>,
    ctx: Arc<PipelineContext>,
    workers: usize,
) -> usize {
    info!(
        "Stage 2: Embedding with {workers} worker(s), batch size {}, {} request(s) in flight",
        ctx.embeddings.batch_size(),
        ctx.embeddings.max_concurrent_requests()
    );
    run_stage("Stage 2", rx, workers, move |job: EmbedJob| {
        let ctx = ctx.clone();
        let index_tx = index_tx.clone();
        async move {
            let EmbedJob {
                mut run,
                unchanged,
                needs_embedding,
            } = job;
            match embed_file(&ctx, &mut run, unchanged, needs_embedding).await {
                Ok(chunks) => {
                    if let Err(e) = index_tx.send(IndexJob { run, chunks }).await {
                        finish(&ctx, e.0.run, internal("index stage closed"));
                    }
                }
                Err(event) => finish(&ctx, run, event),
            }
        }
    })
    .await
}

/// Attach vectors to every chunk of one file, in chunk order
async fn embed_file(
    ctx: &PipelineContext,
    run: &mut Run,
    unchanged: Vec<Chunk>,
    needs_embedding: Vec<Chunk>,
) -> Result<Vec<Chunk>, TaskEvent> {
    if !ctx.is_current(run) {
        return Err(TaskEvent::Skip(SkipReason::Superseded));
    }

    let mut seen = HashSet::new();
    let pending: Vec<PendingText> = needs_embedding
        .iter()
        .filter(|chunk| informative_len(chunk) >= ctx.min_embeddable_bytes)
        .filter(|chunk| seen.insert(chunk.content_hash.clone()))
        .map(|chunk| (chunk.content_hash.clone(), chunk.text.clone()))
        .collect();

    let vectors = embed_texts(ctx, run, pending).await?;

    let mut embedded = 0;
    let mut keyword_only = 0;
    let reused = unchanged.len();
    let mut chunks = unchanged;
    for mut chunk in needs_embedding {
        chunk.embedding = vectors.get(&chunk.content_hash).cloned();
        if chunk.embedding.is_some() {
            embedded += 1;
        } else {
            keyword_only += 1;
        }
        chunks.push(chunk);
    }
    chunks.sort_by_key(|c| c.chunk_index);

    // Cancellation point: a superseded run never reaches the index
    if !ctx.is_current(run) {
        return Err(TaskEvent::Skip(SkipReason::Superseded));
    }

    ctx.stats.add_embedded(embedded);
    ctx.stats.add_reused(reused);
    ctx.stats.add_keyword_only(keyword_only);
    debug!(
        file_id = %run.file_id(),
        embedded,
        reused,
        keyword_only,
        "Embedded file"
    );
    run.advance(TaskEvent::Embedded).map_err(internal)?;
    Ok(chunks)
}

/// Bytes of the chunk body that are not whitespace
fn informative_len(chunk: &Chunk) -> usize {
    let body = if chunk.context_header.is_empty() {
        chunk.text.as_str()
    } else {
        chunk
            .text
            .get(chunk.context_header.len()..)
            .unwrap_or(chunk.text.as_str())
    };
    body.bytes().filter(|b| !b.is_ascii_whitespace()).count()
}

/// Outcome of one text in one round
enum TextResult {
    Embedded(Vec<f32>),
    Retry(String),
    /// The model will never accept this text
    Rejected(String),
    /// The service refused the request; the run cannot succeed
    Refused(String),
}

/// Embed distinct texts, retrying only the ones that fail transiently
///
/// Rejected texts are left out of the result and indexed keyword-only.
async fn embed_texts(
    ctx: &PipelineContext,
    run: &mut Run,
    mut pending: Vec<PendingText>,
) -> Result<HashMap<ContentHash, Vec<f32>>, TaskEvent> {
    let mut vectors = HashMap::new();
    let max_attempts = ctx.policy.max_attempts();
    let mut attempt = 1;

    while !pending.is_empty() {
        let mut retry = Vec::new();
        let mut last_error = String::new();
        for ((hash, text), result) in embed_round(ctx, pending).await? {
            match result {
                TextResult::Embedded(vector) => {
                    vectors.insert(hash, vector);
                }
                TextResult::Retry(message) => {
                    last_error = message;
                    retry.push((hash, text));
                }
                TextResult::Rejected(message) => {
                    warn!(
                        file_id = %run.file_id(),
                        "Text rejected by embedding model, indexing keyword-only: {message}"
                    );
                }
                TextResult::Refused(message) => {
                    return Err(TaskEvent::Fail(FailureReason::EmbeddingRefused(message)));
                }
            }
        }

        if retry.is_empty() {
            break;
        }
        if attempt >= max_attempts {
            return Err(TaskEvent::Fail(FailureReason::TransientExhausted {
                stage: PipelineStage::Embed,
                message: last_error,
            }));
        }

        let backoff = ctx.policy.backoff(attempt);
        warn!(
            file_id = %run.file_id(),
            "{} text(s) failed to embed: {last_error}. Retrying in {backoff:?} (attempt {attempt}/{max_attempts})",
            retry.len()
        );
        run.record_retry(&last_error);
        tokio::time::sleep(backoff).await;
        attempt += 1;
        pending = retry;
    }
    Ok(vectors)
}

/// Send every pending text once, in concurrent batches
async fn embed_round(
    ctx: &PipelineContext,
    pending: Vec<PendingText>,
) -> Result<Vec<(PendingText, TextResult)>, TaskEvent> {
    let batches: Vec<Vec<PendingText>> = pending
        .chunks(ctx.embeddings.batch_size())
        .map(<[PendingText]>::to_vec)
        .collect();
    ctx.stats.add_embedding_calls(batches.len());

    let responses: Vec<_> = stream::iter(batches)
        .map(|batch| async move {
            let texts = batch.iter().map(|(_, text)| text.clone()).collect();
            let response = ctx.embeddings.embed(texts).await;
            (batch, response)
        })
        .buffer_unordered(ctx.embeddings.max_concurrent_requests())
        .collect()
        .await;

    let mut results = Vec::new();
    for (batch, response) in responses {
        match response {
            Ok(items) => {
                for (item, result) in batch.into_iter().zip(items) {
                    let outcome = match result {
                        Ok(vector) => TextResult::Embedded(vector),
                        Err(e) if e.is_transient() => TextResult::Retry(e.to_string()),
                        Err(e @ EmbeddingError::Refused(_)) => TextResult::Refused(e.to_string()),
                        Err(e) => TextResult::Rejected(e.to_string()),
                    };
                    results.push((item, outcome));
                }
            }
            Err(e) if e.is_transient() => {
                let message = e.to_string();
                results.extend(
                    batch
                        .into_iter()
                        .map(|item| (item, TextResult::Retry(message.clone()))),
                );
            }
            Err(e) => {
                return Err(TaskEvent::Fail(FailureReason::EmbeddingRefused(
                    e.to_string(),
                )))
            }
        }
    }
    Ok(results)
}
