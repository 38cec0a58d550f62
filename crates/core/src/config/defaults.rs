//! Default values and functions for configuration

// Default constants
pub(crate) const DEFAULT_PROVIDER: &str = "mock";
pub(crate) const DEFAULT_MODEL: &str = "nomic-embed-code";
pub(crate) const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/v1";

pub(crate) fn default_parser_timeout_ms() -> u64 {
    5_000
}

pub(crate) fn default_enabled_languages() -> Vec<String> {
    vec![
        "rust".to_string(),
        "python".to_string(),
        "javascript".to_string(),
        "typescript".to_string(),
        "go".to_string(),
    ]
}

pub(crate) fn default_doc_comment_max_gap_lines() -> usize {
    1
}

pub(crate) fn default_strip_modifiers() -> bool {
    true
}

pub(crate) fn default_max_chunk_bytes() -> usize {
    1_500
}

/// Merging is opt-in: a merged chunk changes identity whenever any member
/// changes, so it is re-embedded when a neighbour is edited or removed
pub(crate) fn default_merge_below_bytes() -> usize {
    0
}

pub(crate) fn default_split_overlap_lines() -> usize {
    2
}

pub(crate) fn default_min_orphan_doc_bytes() -> usize {
    80
}

pub(crate) fn default_min_residual_bytes() -> usize {
    40
}

pub(crate) fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

pub(crate) fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

pub(crate) fn default_api_base_url() -> Option<String> {
    Some(DEFAULT_API_BASE_URL.to_string())
}

pub(crate) fn default_embedding_dimension() -> usize {
    384
}

pub(crate) fn default_texts_per_api_request() -> usize {
    32
}

pub(crate) fn default_max_concurrent_api_requests() -> usize {
    4
}

pub(crate) fn default_min_embeddable_bytes() -> usize {
    24
}

pub(crate) fn default_request_timeout_ms() -> u64 {
    30_000
}

pub(crate) fn default_pipeline_channel_capacity() -> usize {
    64
}

pub(crate) fn default_parse_workers() -> usize {
    4
}

pub(crate) fn default_embed_workers() -> usize {
    4
}

pub(crate) fn default_index_workers() -> usize {
    2
}

pub(crate) fn default_max_attempts() -> u32 {
    4
}

pub(crate) fn default_initial_backoff_ms() -> u64 {
    200
}

pub(crate) fn default_max_backoff_ms() -> u64 {
    10_000
}

pub(crate) fn default_index_write_timeout_ms() -> u64 {
    10_000
}
