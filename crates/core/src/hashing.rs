//! Content hashing and deterministic chunk identity

use twox_hash::XxHash3_128;

use crate::chunk::{ChunkId, ChunkKey, ContentHash, FileId};

/// Separator between scope segments in qualified names
pub const SCOPE_SEPARATOR: &str = "::";

/// Context for tracking scope while walking a symbol tree
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    /// Stack of scope names from root to current position
    pub scope_stack: Vec<String>,
}

impl ScopeContext {
    /// Create a new root scope context
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new named scope onto the stack
    pub fn push_scope(&mut self, name: impl Into<String>) {
        self.scope_stack.push(name.into());
    }

    /// Pop the current scope from the stack
    pub fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    /// Build a fully qualified name from the current scope
    pub fn build_qualified_name(&self, name: &str) -> String {
        let mut parts: Vec<&str> = self
            .scope_stack
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        if !name.is_empty() {
            parts.push(name);
        }
        parts.join(SCOPE_SEPARATOR)
    }
}

/// Normalize text before hashing
///
/// Line endings become `\n`, trailing whitespace is trimmed from every line
/// and trailing blank lines are dropped, so editor noise does not change
/// the fingerprint.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split('\n') {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    let trimmed = out.trim_end_matches('\n').len();
    out.truncate(trimmed);
    out
}

/// Hash raw file bytes
pub fn file_content_hash(bytes: &[u8]) -> ContentHash {
    ContentHash::from_hex(format!("{:032x}", XxHash3_128::oneshot(bytes)))
}

/// Hash a chunk over its qualified name and normalized text
pub fn content_hash(qualified_name: &str, text: &str) -> ContentHash {
    let normalized = normalize_text(text);
    let mut buf = Vec::with_capacity(qualified_name.len() + 1 + normalized.len());
    buf.extend_from_slice(qualified_name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(normalized.as_bytes());
    ContentHash::from_hex(format!("{:032x}", XxHash3_128::oneshot(&buf)))
}

/// Generate a chunk ID from the file identity and logical chunk key
///
/// Positions are not part of the ID, so code moved within a file keeps its
/// identity.
pub fn generate_chunk_id(file_id: &FileId, key: &ChunkKey) -> ChunkId {
    let unique_str = format!("{}\0{}", file_id.as_str(), key);
    ChunkId::from_raw(format!(
        "chunk-{:032x}",
        XxHash3_128::oneshot(unique_str.as_bytes())
    ))
}
