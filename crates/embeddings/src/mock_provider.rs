//! Mock embedding provider for testing

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use crate::error::EmbeddingError;
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use codeindex_core::error::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Texts containing `needle` fail with `error` `remaining` more times
#[derive(Debug)]
struct ItemFault {
    needle: String,
    remaining: usize,
    error: EmbeddingError,
}

#[derive(Debug, Default)]
struct Faults {
    items: Vec<ItemFault>,
    /// Whole requests that fail before any text is embedded
    failing_requests: usize,
    /// Whole requests refused as if the credentials were wrong
    refused_requests: usize,
    /// Requests containing the needle are delayed
    delays: Vec<(String, Duration)>,
}

/// Mock embedding provider that returns deterministic vectors
///
/// Vectors are derived from a hash of the text, so equal texts always map to
/// equal vectors. Calls and embedded texts are counted, and failures or
/// delays can be injected for texts containing a given substring.
pub struct MockEmbeddingProvider {
    embedding_dim: usize,
    calls: AtomicUsize,
    texts_embedded: AtomicUsize,
    faults: Mutex<Faults>,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with specified embedding dimension
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Fail every text containing `needle` for the next `times` requests it
    /// appears in; `usize::MAX` fails it forever
    pub fn fail_texts_containing(&self, needle: impl Into<String>, times: usize) {
        self.faults.lock().unwrap().items.push(ItemFault {
            needle: needle.into(),
            remaining: times,
            error: EmbeddingError::Transient("injected item failure".to_string()),
        });
    }

    /// Refuse every text containing `needle`, permanently
    pub fn refuse_texts_containing(&self, needle: impl Into<String>) {
        self.faults.lock().unwrap().items.push(ItemFault {
            needle: needle.into(),
            remaining: usize::MAX,
            error: EmbeddingError::Refused("injected refusal".to_string()),
        });
    }

    /// Fail the next `count` requests outright
    pub fn fail_next_requests(&self, count: usize) {
        self.faults.lock().unwrap().failing_requests += count;
    }

    /// Refuse the next `count` requests outright, without retry hope
    pub fn refuse_next_requests(&self, count: usize) {
        self.faults.lock().unwrap().refused_requests += count;
    }

    /// Delay any request that contains a text with `needle`
    pub fn delay_texts_containing(&self, needle: impl Into<String>, delay: Duration) {
        self.faults
            .lock()
            .unwrap()
            .delays
            .push((needle.into(), delay));
    }

    /// Number of `embed` calls received, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts for which a vector was returned
    pub fn embedded_text_count(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.texts_embedded.store(0, Ordering::SeqCst);
    }

    /// The vector this provider returns for `text`
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector: Vec<f32> = (0..self.embedding_dim)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                let bits = hasher.finish();
                (bits % 2001) as f32 / 1000.0 - 1.0
            })
            .collect();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn request_delay(&self, texts: &[String]) -> Option<Duration> {
        let faults = self.faults.lock().unwrap();
        faults
            .delays
            .iter()
            .filter(|(needle, _)| texts.iter().any(|t| t.contains(needle.as_str())))
            .map(|(_, delay)| *delay)
            .max()
    }

    fn take_request_failure(&self) -> Option<Error> {
        let mut faults = self.faults.lock().unwrap();
        if faults.refused_requests > 0 {
            faults.refused_requests -= 1;
            return Some(Error::embedding_refused("injected request refusal"));
        }
        if faults.failing_requests > 0 {
            faults.failing_requests -= 1;
            return Some(Error::embedding("injected request failure"));
        }
        None
    }

    fn take_item_failure(&self, text: &str) -> Option<EmbeddingError> {
        let mut faults = self.faults.lock().unwrap();
        let fault = faults
            .items
            .iter_mut()
            .find(|f| f.remaining > 0 && text.contains(f.needle.as_str()));
        match fault {
            Some(fault) => {
                if fault.remaining != usize::MAX {
                    fault.remaining -= 1;
                }
                Some(fault.error.clone())
            }
            None => None,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<EmbeddingResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.request_delay(&texts) {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.take_request_failure() {
            return Err(err);
        }

        let results: Vec<EmbeddingResult> = texts
            .iter()
            .map(|text| match self.take_item_failure(text) {
                Some(err) => Err(err),
                None => Ok(self.vector_for(text)),
            })
            .collect();

        let embedded = results.iter().filter(|r| r.is_ok()).count();
        self.texts_embedded.fetch_add(embedded, Ordering::SeqCst);
        Ok(results)
    }

    fn embedding_dimension(&self) -> usize {
        self.embedding_dim
    }
}
