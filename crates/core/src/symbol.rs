//! Canonical, language-agnostic symbol model
//!
//! Symbols are stored in an arena ([`SymbolTree`]) addressed by [`SymbolId`].
//! Each symbol keeps a back-reference to its parent and an ordered list of
//! child ids, so the tree can be walked in either direction without owning
//! pointers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::chunk::{ContentHash, FileId};

/// Programming language enumeration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
}

/// Kind of structural element found in a file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    /// Class, struct, interface or trait
    Type,
    Enum,
    Union,
    /// Namespace, module or impl block
    Namespace,
    /// Comment block not attached to any declaration
    Documentation,
    /// Consecutive top-level statements that are not declarations
    TopLevelStatements,
}

impl SymbolKind {
    /// Declarations can receive doc comments and contribute to qualified names
    pub fn is_declaration(self) -> bool {
        !matches!(self, Self::Documentation | Self::TopLevelStatements)
    }

    /// Kinds whose children are scoped under their name
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Type | Self::Enum | Self::Union | Self::Namespace
        )
    }
}

/// Half-open byte range into the original source bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "inverted byte range {start}..{end}");
        Self { start, end }
    }

    pub fn from_node(node: tree_sitter::Node) -> Self {
        Self::new(node.start_byte(), node.end_byte())
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when `other` lies entirely within `self`
    pub fn contains(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest range covering both
    pub fn cover(&self, other: &ByteRange) -> ByteRange {
        ByteRange::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Half-open, zero-based line range
///
/// A symbol occupying lines 3 through 5 (zero-based) has `start = 3, end = 6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Create a LineRange from tree-sitter node positions
    pub fn from_node(node: tree_sitter::Node) -> Self {
        Self::new(node.start_position().row, node.end_position().row + 1)
    }

    /// Compute the line range spanned by `range` within `source`
    pub fn of_bytes(source: &[u8], range: ByteRange) -> Self {
        let end = range.end.min(source.len());
        let start = range.start.min(end);
        let start_line = bytecount_newlines(&source[..start]);
        let inner = &source[start..end];
        let mut lines = bytecount_newlines(inner);
        if !inner.ends_with(b"\n") {
            lines += 1;
        }
        Self::new(start_line, start_line + lines)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Last line covered by this range, inclusive
    pub fn last_line(&self) -> usize {
        self.end.saturating_sub(1).max(self.start)
    }
}

fn bytecount_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| **b == b'\n').count()
}

/// Index of a symbol inside its [`SymbolTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One structural element found in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    /// Simple name; empty for anonymous blocks
    pub name: String,
    /// Type a method is declared against when that type does not enclose it
    /// (Go receivers)
    pub receiver: Option<String>,
    /// Scoped path from enclosing namespaces/types, filled by the normalizer
    pub qualified_name: String,
    /// Declaration header on one line, used for context headers
    pub signature: String,
    pub byte_range: ByteRange,
    pub line_range: LineRange,
    pub doc_comment: Option<String>,
    /// Source range of the attached doc comment
    pub doc_range: Option<ByteRange>,
    /// Verbatim source text spanning `byte_range`
    pub body_text: String,
    pub parent: Option<SymbolId>,
    pub children: Vec<SymbolId>,
    /// The grammar reported a syntax error inside this symbol
    pub has_error: bool,
}

impl Symbol {
    /// Create a symbol without parent, children or doc comment
    pub fn new(
        kind: SymbolKind,
        name: impl Into<String>,
        byte_range: ByteRange,
        line_range: LineRange,
        body_text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            receiver: None,
            qualified_name: String::new(),
            signature: String::new(),
            byte_range,
            line_range,
            doc_comment: None,
            doc_range: None,
            body_text: body_text.into(),
            parent: None,
            children: Vec::new(),
            has_error: false,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Byte range including the attached doc comment, if any
    pub fn full_range(&self) -> ByteRange {
        match self.doc_range {
            Some(doc) => doc.cover(&self.byte_range),
            None => self.byte_range,
        }
    }
}

/// Arena of symbols with parent back-references
///
/// Symbols must be pushed in source order; children of a parent are kept in
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTree {
    symbols: Vec<Symbol>,
    roots: Vec<SymbolId>,
}

impl SymbolTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol under `parent` (or as a root) and return its id
    pub fn push(&mut self, parent: Option<SymbolId>, mut symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        symbol.parent = parent;
        symbol.children.clear();
        self.symbols.push(symbol);
        match parent {
            Some(p) => self.symbols[p.index()].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn roots(&self) -> &[SymbolId] {
        &self.roots
    }

    pub fn children(&self, id: SymbolId) -> &[SymbolId] {
        &self.symbols[id.index()].children
    }

    /// Ancestors from the direct parent up to the root
    pub fn ancestors(&self, id: SymbolId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).parent,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterate in arena order (which is also source pre-order)
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    /// Ids in source pre-order: parent before children, siblings by position
    pub fn preorder(&self) -> Vec<SymbolId> {
        let mut out = Vec::with_capacity(self.symbols.len());
        let mut stack: Vec<SymbolId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Check range nesting: children lie within their parent and siblings
    /// are ordered and disjoint
    pub fn validate(&self) -> Result<()> {
        self.validate_siblings(&self.roots)?;
        for (id, symbol) in self.iter() {
            for child in &symbol.children {
                let child_sym = self.get(*child);
                if !symbol.byte_range.contains(&child_sym.byte_range) {
                    return Err(Error::invalid_input(format!(
                        "symbol {:?} ({}) range {:?} escapes parent {:?} range {:?}",
                        child, child_sym.name, child_sym.byte_range, id, symbol.byte_range
                    )));
                }
            }
            self.validate_siblings(&symbol.children)?;
        }
        Ok(())
    }

    fn validate_siblings(&self, ids: &[SymbolId]) -> Result<()> {
        for pair in ids.windows(2) {
            let (a, b) = (self.get(pair[0]), self.get(pair[1]));
            if a.byte_range.end > b.byte_range.start {
                return Err(Error::invalid_input(format!(
                    "sibling symbols {} {:?} and {} {:?} overlap or are out of order",
                    a.name, a.byte_range, b.name, b.byte_range
                )));
            }
        }
        Ok(())
    }
}

/// Iterator returned by [`SymbolTree::ancestors`]
pub struct Ancestors<'a> {
    tree: &'a SymbolTree,
    next: Option<SymbolId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = SymbolId;

    fn next(&mut self) -> Option<SymbolId> {
        let current = self.next?;
        self.next = self.tree.get(current).parent;
        Some(current)
    }
}

/// A syntax error reported by a grammar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    pub byte_range: ByteRange,
    /// Zero-based line of the error start
    pub line: usize,
    pub message: String,
}

/// Outcome of parsing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseStatus {
    Complete,
    /// Symbols were recovered around one or more syntax errors
    Partial { errors: Vec<SyntaxIssue> },
    /// Nothing could be recovered
    Failed { reason: String },
}

impl ParseStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Human-readable summary of the errors, if any
    pub fn error_summary(&self) -> Option<String> {
        match self {
            Self::Complete => None,
            Self::Partial { errors } => {
                let lines: Vec<String> = errors.iter().map(|e| (e.line + 1).to_string()).collect();
                Some(format!(
                    "{} syntax error(s) at line(s) {}",
                    errors.len(),
                    lines.join(", ")
                ))
            }
            Self::Failed { reason } => Some(reason.clone()),
        }
    }
}

/// What a language parser hands back for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    pub symbols: SymbolTree,
    pub status: ParseStatus,
}

/// Parse output bound to the file it came from
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub file_id: FileId,
    pub path: PathBuf,
    pub language: Language,
    pub content_hash: ContentHash,
    pub symbols: SymbolTree,
    pub status: ParseStatus,
}

impl ParseResult {
    pub fn new(
        file_id: FileId,
        path: impl Into<PathBuf>,
        language: Language,
        content_hash: ContentHash,
        output: ParseOutput,
    ) -> Self {
        Self {
            file_id,
            path: path.into(),
            language,
            content_hash,
            symbols: output.symbols,
            status: output.status,
        }
    }
}
