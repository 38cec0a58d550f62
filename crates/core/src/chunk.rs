//! Chunk records derived from normalized symbols

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::symbol::{ByteRange, LineRange, SymbolKind};

/// Stable identity of a source file, supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 128-bit xxh3 fingerprint rendered as 32 hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index-facing identifier of a chunk, derived from file and [`ChunkKey`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which part of a symbol a chunk covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChunkPart {
    /// The whole symbol
    Whole,
    /// One piece of an oversized symbol, zero-based
    Split(u32),
    /// An oversized container's own text with its children removed
    Residual,
    /// Several small adjacent symbols
    Merged,
}

impl fmt::Display for ChunkPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => f.write_str("whole"),
            Self::Split(n) => write!(f, "split-{n}"),
            Self::Residual => f.write_str("residual"),
            Self::Merged => f.write_str("merged"),
        }
    }
}

/// Logical identity of a chunk within its file
///
/// `occurrence` disambiguates symbols that share a qualified name in the
/// same file (overloads, repeated anonymous blocks); it counts in source
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub qualified_name: String,
    pub occurrence: u32,
    pub part: ChunkPart,
}

impl ChunkKey {
    pub fn new(qualified_name: impl Into<String>, occurrence: u32, part: ChunkPart) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            occurrence,
            part,
        }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}/{}", self.qualified_name, self.occurrence, self.part)
    }
}

/// An embeddable unit derived from one or more symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub file_id: FileId,
    /// Position of the chunk within its file, in source order
    pub chunk_index: u32,
    pub chunk_id: ChunkId,
    pub key: ChunkKey,
    /// Kind of the primary symbol
    pub kind: SymbolKind,
    /// Enclosing namespace/type signatures
    pub context_header: String,
    /// `context_header` followed by the body, within the size limit
    pub text: String,
    pub byte_range: ByteRange,
    pub line_range: LineRange,
    pub content_hash: ContentHash,
    /// Absent until embedded; stays absent for keyword-only entries
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn qualified_name(&self) -> &str {
        &self.key.qualified_name
    }
}
