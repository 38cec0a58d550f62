//! Chunker: groups and splits normalized symbols into embeddable chunks
//!
//! Symbols are walked in source order. Runs of small siblings are merged,
//! symbols that fit are emitted whole, oversized containers emit a residual
//! chunk and recurse into their members, and anything else that is too
//! large is split at line boundaries, falling back to whitespace and then to
//! character boundaries for single over-long tokens. Every chunk carries a
//! context header built from the signatures of its enclosing symbols.

use codeindex_core::config::ChunkerConfig;
use codeindex_core::hashing::SCOPE_SEPARATOR;
use codeindex_core::{
    content_hash, generate_chunk_id, ByteRange, Chunk, ChunkKey, ChunkPart, FileId, LineRange,
    SymbolId, SymbolKind, SymbolTree,
};
use std::collections::HashMap;
use tracing::debug;

/// Joins the bodies of merged symbols
const MERGE_SEPARATOR: &str = "\n\n";

/// Text of one symbol as a candidate chunk
struct Unit {
    name: String,
    kind: SymbolKind,
    text: String,
    range: ByteRange,
}

/// Accumulates chunks for one file
struct Emitter<'a> {
    file_id: &'a FileId,
    source: &'a [u8],
    occurrences: HashMap<String, u32>,
    chunks: Vec<Chunk>,
}

impl Emitter<'_> {
    fn next_occurrence(&mut self, name: &str) -> u32 {
        let slot = self.occurrences.entry(name.to_string()).or_insert(0);
        let occurrence = *slot;
        *slot += 1;
        occurrence
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        name: &str,
        occurrence: u32,
        part: ChunkPart,
        kind: SymbolKind,
        header: &str,
        body: &str,
        range: ByteRange,
    ) {
        let text = if header.is_empty() {
            body.to_string()
        } else {
            format!("{header}\n{body}")
        };
        let key = ChunkKey::new(name, occurrence, part);
        self.chunks.push(Chunk {
            file_id: self.file_id.clone(),
            chunk_index: self.chunks.len() as u32,
            chunk_id: generate_chunk_id(self.file_id, &key),
            content_hash: content_hash(name, &text),
            key,
            kind,
            context_header: header.to_string(),
            text,
            byte_range: range,
            line_range: LineRange::of_bytes(self.source, range),
            embedding: None,
        });
    }
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk a normalized symbol tree
    ///
    /// A tree without symbols yields no chunks.
    pub fn chunk(&self, file_id: &FileId, tree: &SymbolTree, source: &[u8]) -> Vec<Chunk> {
        let mut out = Emitter {
            file_id,
            source,
            occurrences: HashMap::new(),
            chunks: Vec::new(),
        };
        self.chunk_siblings(tree, tree.roots(), &[], &mut out);

        debug!(
            file_id = %file_id,
            symbols = tree.len(),
            chunks = out.chunks.len(),
            "Chunked file"
        );
        out.chunks
    }

    fn chunk_siblings(
        &self,
        tree: &SymbolTree,
        ids: &[SymbolId],
        scope: &[String],
        out: &mut Emitter<'_>,
    ) {
        let header = self.render_header(scope);
        let budget = self.body_budget(&header);
        let mut run: Vec<Unit> = Vec::new();

        for &id in ids {
            let symbol = tree.get(id);
            let range = symbol.full_range();
            let unit = Unit {
                name: key_name(tree, id),
                kind: symbol.kind,
                text: slice(out.source, range),
                range,
            };
            if unit.text.trim().is_empty() {
                continue;
            }

            if symbol.kind == SymbolKind::Documentation {
                self.flush(&mut run, &header, budget, out);
                if unit.text.trim().len() >= self.config.min_orphan_doc_bytes {
                    self.emit_unit(unit, &header, budget, out);
                } else {
                    debug!(range = ?unit.range, "Dropping short orphaned comment");
                }
                continue;
            }

            if unit.text.len() < self.config.merge_below_bytes {
                if !run.is_empty()
                    && merged_len(&run) + MERGE_SEPARATOR.len() + unit.text.len() > budget
                {
                    self.flush(&mut run, &header, budget, out);
                }
                run.push(unit);
                continue;
            }

            self.flush(&mut run, &header, budget, out);
            let has_members = symbol
                .children
                .iter()
                .any(|child| tree.get(*child).kind.is_declaration());
            if unit.text.len() > budget && has_members {
                self.emit_residual(tree, id, unit, &header, budget, out);
                let mut inner = scope.to_vec();
                inner.push(signature_line(tree, id));
                self.chunk_siblings(tree, &symbol.children, &inner, out);
            } else {
                self.emit_unit(unit, &header, budget, out);
            }
        }
        self.flush(&mut run, &header, budget, out);
    }

    /// Emit pending small symbols: one whole chunk, or one merged chunk
    fn flush(&self, run: &mut Vec<Unit>, header: &str, budget: usize, out: &mut Emitter<'_>) {
        if run.len() == 1 {
            if let Some(unit) = run.pop() {
                self.emit_unit(unit, header, budget, out);
            }
            return;
        }
        if run.is_empty() {
            return;
        }

        let units = std::mem::take(run);
        let name = units
            .iter()
            .map(|u| u.name.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let body = units
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(MERGE_SEPARATOR);
        let range = units
            .iter()
            .skip(1)
            .fold(units[0].range, |acc, u| acc.cover(&u.range));
        let occurrence = out.next_occurrence(&name);
        out.emit(
            &name,
            occurrence,
            ChunkPart::Merged,
            units[0].kind,
            header,
            &body,
            range,
        );
    }

    /// Emit one symbol whole, or split into pieces when over budget
    fn emit_unit(&self, unit: Unit, header: &str, budget: usize, out: &mut Emitter<'_>) {
        let occurrence = out.next_occurrence(&unit.name);
        if unit.text.len() <= budget {
            out.emit(
                &unit.name,
                occurrence,
                ChunkPart::Whole,
                unit.kind,
                header,
                &unit.text,
                unit.range,
            );
            return;
        }
        let range = unit.range;
        self.emit_split(
            &unit,
            occurrence,
            &unit.text,
            |start, end| sub_range(range, start, end),
            header,
            budget,
            out,
        );
    }

    /// Emit `text` as ordered pieces; `locate` maps a piece back to source
    #[allow(clippy::too_many_arguments)]
    fn emit_split(
        &self,
        unit: &Unit,
        occurrence: u32,
        text: &str,
        locate: impl Fn(usize, usize) -> ByteRange,
        header: &str,
        budget: usize,
        out: &mut Emitter<'_>,
    ) {
        let pieces = split_points(text, budget, self.config.split_overlap_lines)
            .into_iter()
            .filter(|(start, end)| !text[*start..*end].trim().is_empty());
        for (index, (start, end)) in pieces.enumerate() {
            out.emit(
                &unit.name,
                occurrence,
                ChunkPart::Split(index as u32),
                unit.kind,
                header,
                &text[start..end],
                locate(start, end),
            );
        }
    }

    /// The container's own text with every member removed
    fn emit_residual(
        &self,
        tree: &SymbolTree,
        id: SymbolId,
        unit: Unit,
        header: &str,
        budget: usize,
        out: &mut Emitter<'_>,
    ) {
        let occurrence = out.next_occurrence(&unit.name);
        let residual = Residual::of(tree, id, unit.range, out.source);

        if residual.text.trim().len() < self.config.min_residual_bytes {
            debug!(name = %unit.name, "Residual below threshold, dropping");
            return;
        }
        if residual.text.len() <= budget {
            out.emit(
                &unit.name,
                occurrence,
                ChunkPart::Residual,
                unit.kind,
                header,
                &residual.text,
                unit.range,
            );
        } else {
            let bounds = unit.range;
            self.emit_split(
                &unit,
                occurrence,
                &residual.text,
                |start, end| residual.source_range(start, end, bounds),
                header,
                budget,
                out,
            );
        }
    }

    /// Enclosing signatures, outermost first, capped at half the chunk size
    ///
    /// Outer scopes are dropped first when the cap is exceeded.
    fn render_header(&self, scope: &[String]) -> String {
        let cap = self.config.max_chunk_bytes / 2;
        let mut lines: Vec<&str> = scope
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        let mut header = lines.join("\n");
        while header.len() > cap && lines.len() > 1 {
            lines.remove(0);
            header = lines.join("\n");
        }
        if header.len() > cap {
            let mut cut = cap;
            while !header.is_char_boundary(cut) {
                cut -= 1;
            }
            header.truncate(cut);
        }
        header
    }

    /// Bytes left for the body once the header and its newline are added
    fn body_budget(&self, header: &str) -> usize {
        let overhead = if header.is_empty() { 0 } else { header.len() + 1 };
        self.config.max_chunk_bytes.saturating_sub(overhead).max(1)
    }
}

/// Chunk key name: the qualified name, or `<kind>` under the nearest named
/// ancestor for anonymous symbols
fn key_name(tree: &SymbolTree, id: SymbolId) -> String {
    let symbol = tree.get(id);
    if !symbol.qualified_name.is_empty() {
        return symbol.qualified_name.clone();
    }
    let leaf = format!("<{}>", symbol.kind);
    let scope = tree
        .ancestors(id)
        .map(|a| tree.get(a))
        .find(|a| !a.qualified_name.is_empty());
    match scope {
        Some(parent) => format!("{}{SCOPE_SEPARATOR}{leaf}", parent.qualified_name),
        None => leaf,
    }
}

fn signature_line(tree: &SymbolTree, id: SymbolId) -> String {
    let symbol = tree.get(id);
    let signature = symbol.signature.trim();
    if signature.is_empty() {
        format!("{} {}", symbol.kind, symbol.name).trim().to_string()
    } else {
        signature.to_string()
    }
}

/// A container's text outside its members, blank lines dropped
struct Residual {
    text: String,
    /// `(offset in text, offset in source)` at the start of each kept line
    origins: Vec<(usize, usize)>,
}

impl Residual {
    fn of(tree: &SymbolTree, id: SymbolId, range: ByteRange, source: &[u8]) -> Self {
        let mut gaps = Vec::new();
        let mut cursor = range.start;
        for child in tree.children(id) {
            let child_range = tree.get(*child).full_range();
            if child_range.start > cursor {
                gaps.push(ByteRange::new(cursor, child_range.start));
            }
            cursor = cursor.max(child_range.end);
        }
        if range.end > cursor {
            gaps.push(ByteRange::new(cursor, range.end));
        }

        let mut residual = Self {
            text: String::new(),
            origins: Vec::new(),
        };
        for gap in gaps {
            let mut at = gap.start;
            for line in slice(source, gap).split_inclusive('\n') {
                let content = line.trim_end_matches(['\n', '\r']);
                if !content.trim().is_empty() {
                    if !residual.text.is_empty() {
                        residual.text.push('\n');
                    }
                    residual.origins.push((residual.text.len(), at));
                    residual.text.push_str(content);
                }
                at += line.len();
            }
        }
        residual
    }

    fn source_offset(&self, offset: usize) -> usize {
        let line = self.origins.partition_point(|(at, _)| *at <= offset);
        match line.checked_sub(1).and_then(|i| self.origins.get(i)) {
            Some((at, origin)) => origin + (offset - at),
            None => offset,
        }
    }

    /// Source span of `text[start..end]`, clamped to the container
    fn source_range(&self, start: usize, end: usize, bounds: ByteRange) -> ByteRange {
        let from = self.source_offset(start);
        let to = match end.checked_sub(1) {
            Some(last) if end > start => self.source_offset(last) + 1,
            _ => from,
        };
        ByteRange::new(
            from.clamp(bounds.start, bounds.end),
            to.clamp(bounds.start, bounds.end),
        )
    }
}

fn merged_len(run: &[Unit]) -> usize {
    let bodies: usize = run.iter().map(|u| u.text.len()).sum();
    bodies + MERGE_SEPARATOR.len() * run.len().saturating_sub(1)
}

fn slice(source: &[u8], range: ByteRange) -> String {
    source
        .get(range.as_range())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

fn sub_range(range: ByteRange, start: usize, end: usize) -> ByteRange {
    ByteRange::new(
        (range.start + start).min(range.end),
        (range.start + end).min(range.end),
    )
}

/// Contiguous pieces of `text`, in order, each no larger than `limit`
/// (unless a single character is)
fn atoms(text: &str, limit: usize) -> Vec<&str> {
    let mut out = Vec::new();
    for line in text.split_inclusive('\n') {
        if line.len() <= limit {
            out.push(line);
            continue;
        }
        for word in line.split_inclusive(char::is_whitespace) {
            if word.len() <= limit {
                out.push(word);
                continue;
            }
            let mut rest = word;
            while rest.len() > limit {
                let mut cut = limit;
                while cut > 0 && !rest.is_char_boundary(cut) {
                    cut -= 1;
                }
                if cut == 0 {
                    cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
                }
                let (head, tail) = rest.split_at(cut);
                out.push(head);
                rest = tail;
            }
            if !rest.is_empty() {
                out.push(rest);
            }
        }
    }
    out
}

/// Byte spans packing whole lines where possible
///
/// Each piece after the first repeats up to `overlap` trailing atoms (lines,
/// or fragments of an over-long line) of the piece before it, always moving
/// forward by at least one atom.
fn split_points(text: &str, limit: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut offset = 0;
    for atom in atoms(text, limit) {
        bounds.push((offset, offset + atom.len()));
        offset += atom.len();
    }

    let mut pieces = Vec::new();
    let mut first = 0;
    while let Some(&(start, first_end)) = bounds.get(first) {
        let mut last = first;
        let mut end = first_end;
        while let Some(&(_, next_end)) = bounds.get(last + 1) {
            if next_end - start > limit {
                break;
            }
            last += 1;
            end = next_end;
        }
        pieces.push((start, end));
        if last + 1 >= bounds.len() {
            break;
        }
        first = (last + 1).saturating_sub(overlap).max(first + 1);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeindex_core::Symbol;
    use pretty_assertions::assert_eq;

    struct TreeBuilder<'s> {
        source: &'s str,
        tree: SymbolTree,
    }

    impl<'s> TreeBuilder<'s> {
        fn new(source: &'s str) -> Self {
            Self {
                source,
                tree: SymbolTree::new(),
            }
        }

        fn add(
            &mut self,
            parent: Option<SymbolId>,
            kind: SymbolKind,
            qualified_name: &str,
            signature: &str,
            snippet: &str,
        ) -> SymbolId {
            let start = self.source.find(snippet).expect("snippet in source");
            let range = ByteRange::new(start, start + snippet.len());
            let name = qualified_name.rsplit("::").next().unwrap_or_default();
            let mut symbol = Symbol::new(
                kind,
                name,
                range,
                LineRange::of_bytes(self.source.as_bytes(), range),
                snippet,
            )
            .with_signature(signature);
            symbol.qualified_name = qualified_name.to_string();
            self.tree.push(parent, symbol)
        }
    }

    fn config(max_chunk_bytes: usize, merge_below_bytes: usize) -> ChunkerConfig {
        ChunkerConfig {
            max_chunk_bytes,
            merge_below_bytes,
            split_overlap_lines: 0,
            min_orphan_doc_bytes: 80,
            min_residual_bytes: 10,
        }
    }

    fn file() -> FileId {
        FileId::new("src/math.rs")
    }

    const ADD: &str = "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}";
    const SUB: &str = "fn sub(a: i32, b: i32) -> i32 {\n    a - b\n}";

    fn add_sub_source() -> String {
        format!("{ADD}\n\n{SUB}\n")
    }

    fn add_sub_tree(source: &str) -> SymbolTree {
        let mut b = TreeBuilder::new(source);
        b.add(None, SymbolKind::Function, "add", "fn add(a: i32, b: i32) -> i32", ADD);
        b.add(None, SymbolKind::Function, "sub", "fn sub(a: i32, b: i32) -> i32", SUB);
        b.tree
    }

    #[test]
    fn test_small_neighbours_merge() {
        let source = add_sub_source();
        let chunks = Chunker::new(config(1500, 300)).chunk(
            &file(),
            &add_sub_tree(&source),
            source.as_bytes(),
        );

        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.key, ChunkKey::new("add+sub", 0, ChunkPart::Merged));
        assert_eq!(chunk.text, format!("{ADD}\n\n{SUB}"));
        assert_eq!(chunk.context_header, "");
        assert_eq!(chunk.byte_range, ByteRange::new(0, source.len() - 1));
        assert_eq!(chunk.line_range, LineRange::new(0, 7));
    }

    #[test]
    fn test_merging_disabled_emits_whole_chunks() {
        let source = add_sub_source();
        let chunks = Chunker::new(config(1500, 0)).chunk(
            &file(),
            &add_sub_tree(&source),
            source.as_bytes(),
        );

        let keys: Vec<String> = chunks.iter().map(|c| c.key.to_string()).collect();
        assert_eq!(keys, vec!["add#0/whole", "sub#0/whole"]);
        assert_eq!(chunks[0].text, ADD);
        assert_eq!(chunks[1].text, SUB);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[1].line_range, LineRange::new(4, 7));
    }

    #[test]
    fn test_merge_stops_at_budget() {
        let source = add_sub_source();
        // Each body fits but the pair does not
        let chunks = Chunker::new(config(ADD.len() + 10, ADD.len() + 5)).chunk(
            &file(),
            &add_sub_tree(&source),
            source.as_bytes(),
        );
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.key.part == ChunkPart::Whole));
    }

    fn method(name: &str) -> String {
        let mut body = format!("    def {name}(self):\n");
        for i in 0..6 {
            body.push_str(&format!("        total_{i} = self.{name}_{i}\n"));
        }
        body.push_str("        return total_0");
        body
    }

    #[test]
    fn test_oversized_container_emits_residual_and_members() {
        let area = method("area");
        let perimeter = method("perimeter");
        let source = format!(
            "class Shape:\n    \"\"\"Base shape.\"\"\"\n    sides = 0\n\n{area}\n\n{perimeter}\n"
        );
        let class_text = source.trim_end().to_string();

        let mut b = TreeBuilder::new(&source);
        let class = b.add(None, SymbolKind::Type, "Shape", "class Shape:", &class_text);
        b.add(Some(class), SymbolKind::Method, "Shape::area", "def area(self):", &area);
        b.add(
            Some(class),
            SymbolKind::Method,
            "Shape::perimeter",
            "def perimeter(self):",
            &perimeter,
        );

        let chunks = Chunker::new(config(300, 0)).chunk(&file(), &b.tree, source.as_bytes());
        let keys: Vec<String> = chunks.iter().map(|c| c.key.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "Shape#0/residual",
                "Shape::area#0/whole",
                "Shape::perimeter#0/whole"
            ]
        );

        let residual = &chunks[0];
        assert_eq!(
            residual.text,
            "class Shape:\n    \"\"\"Base shape.\"\"\"\n    sides = 0"
        );
        assert_eq!(residual.kind, SymbolKind::Type);

        let area_chunk = &chunks[1];
        assert_eq!(area_chunk.context_header, "class Shape:");
        assert_eq!(area_chunk.text, format!("class Shape:\n{area}"));
        assert!(chunks.iter().all(|c| c.text.len() <= 300));
    }

    #[test]
    fn test_oversized_leaf_splits_at_line_boundaries() {
        let mut body = String::from("fn long() {\n");
        for i in 0..40 {
            body.push_str(&format!("    let value_{i} = {i};\n"));
        }
        body.push('}');
        let source = format!("{body}\n");

        let mut b = TreeBuilder::new(&source);
        b.add(None, SymbolKind::Function, "long", "fn long()", &body);
        let chunks = Chunker::new(config(200, 0)).chunk(&file(), &b.tree, source.as_bytes());

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.key, ChunkKey::new("long", 0, ChunkPart::Split(i as u32)));
            assert!(chunk.text.len() <= 200, "piece {i} too long");
            if i + 1 < chunks.len() {
                assert!(chunk.text.ends_with('\n'), "piece {i} not at a line end");
            }
        }
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined, body);
        assert_eq!(chunks[0].byte_range.start, 0);
        assert_eq!(chunks.last().unwrap().byte_range.end, body.len());
    }

    #[test]
    fn test_split_pieces_repeat_trailing_lines() {
        let mut body = String::from("fn long() {\n");
        for i in 0..40 {
            body.push_str(&format!("    let value_{i} = {i};\n"));
        }
        body.push('}');
        let source = format!("{body}\n");

        let mut b = TreeBuilder::new(&source);
        b.add(None, SymbolKind::Function, "long", "fn long()", &body);
        let chunker = Chunker::new(ChunkerConfig {
            split_overlap_lines: 2,
            ..config(200, 0)
        });
        let chunks = chunker.chunk(&file(), &b.tree, source.as_bytes());

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let mut tail: Vec<&str> = pair[0].text.lines().rev().take(2).collect();
            tail.reverse();
            let head: Vec<&str> = pair[1].text.lines().take(2).collect();
            assert_eq!(head, tail);
            assert!(pair[1].byte_range.start < pair[0].byte_range.end);
        }
        for chunk in &chunks {
            assert!(chunk.text.len() <= 200);
            assert_eq!(&source[chunk.byte_range.as_range()], chunk.text);
        }
        assert_eq!(chunks[0].byte_range.start, 0);
        assert_eq!(chunks.last().unwrap().byte_range.end, body.len());
    }

    #[test]
    fn test_residual_pieces_point_back_to_source() {
        let area = method("area");
        let mut fields = String::new();
        for i in 0..12 {
            fields.push_str(&format!("    field_{i} = {i}\n"));
        }
        let source = format!("class Shape:\n{fields}\n{area}\n\n    tail_marker = 99\n");
        let class_text = source.trim_end().to_string();

        let mut b = TreeBuilder::new(&source);
        let class = b.add(None, SymbolKind::Type, "Shape", "class Shape:", &class_text);
        b.add(Some(class), SymbolKind::Method, "Shape::area", "def area(self):", &area);

        let chunks = Chunker::new(config(160, 0)).chunk(&file(), &b.tree, source.as_bytes());
        let residual: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.key.qualified_name == "Shape")
            .collect();

        assert!(residual.len() > 1);
        for piece in residual {
            let located = &source[piece.byte_range.as_range()];
            let first = piece.text.lines().next().unwrap();
            let last = piece.text.lines().last().unwrap();
            assert!(located.starts_with(first), "{located:?} vs {first:?}");
            assert!(located.ends_with(last), "{located:?} vs {last:?}");
            assert!(!located.contains("def area") || piece.text.contains("tail_marker"));
        }
    }

    #[test]
    fn test_over_long_token_splits_at_char_boundaries() {
        let token = "é".repeat(150);
        let statement = format!("x = '{token}'");
        let source = format!("{statement}\n");

        let mut b = TreeBuilder::new(&source);
        b.add(None, SymbolKind::TopLevelStatements, "", "", &statement);
        let chunks = Chunker::new(config(64, 0)).chunk(&file(), &b.tree, source.as_bytes());

        assert!(chunks.len() >= 5);
        assert!(chunks.iter().all(|c| !c.text.is_empty() && c.text.len() <= 64));
        assert!(chunks
            .iter()
            .all(|c| c.key.qualified_name == "<top_level_statements>"));
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined, statement);
    }

    #[test]
    fn test_orphaned_comments_kept_only_when_long() {
        let long_note = format!("// {}", "explains the module layout in detail ".repeat(3));
        let source = format!("// short note\n\nfn main() {{}}\n\n{long_note}\n");

        let mut b = TreeBuilder::new(&source);
        b.add(None, SymbolKind::Documentation, "", "", "// short note");
        b.add(None, SymbolKind::Function, "main", "fn main()", "fn main() {}");
        b.add(None, SymbolKind::Documentation, "", "", &long_note);

        let chunks = Chunker::new(config(1500, 0)).chunk(&file(), &b.tree, source.as_bytes());
        let keys: Vec<String> = chunks.iter().map(|c| c.key.to_string()).collect();
        assert_eq!(keys, vec!["main#0/whole", "<documentation>#0/whole"]);
        assert_eq!(chunks[1].text, long_note);
        assert_eq!(chunks[1].kind, SymbolKind::Documentation);
    }

    #[test]
    fn test_header_cap_drops_outer_scopes_first() {
        let chunker = Chunker::new(config(100, 0));
        let scope = vec![
            "mod an_extremely_long_module_name_for_testing".to_string(),
            "impl Widget".to_string(),
            "trait Render".to_string(),
        ];

        let header = chunker.render_header(&scope);
        assert_eq!(header, "impl Widget\ntrait Render");
        assert!(header.len() <= 50);

        let single = vec!["x".repeat(80)];
        assert_eq!(chunker.render_header(&single).len(), 50);
        assert_eq!(chunker.render_header(&[]), "");
    }

    #[test]
    fn test_repeated_names_get_distinct_occurrences() {
        let strukt = "struct Point { x: f64, y: f64 }";
        let imp = "impl Point { fn origin() -> Self { Point { x: 0.0, y: 0.0 } } }";
        let source = format!("{strukt}\n\n{imp}\n");

        let mut b = TreeBuilder::new(&source);
        b.add(None, SymbolKind::Type, "Point", "struct Point", strukt);
        b.add(None, SymbolKind::Namespace, "Point", "impl Point", imp);

        let chunks = Chunker::new(config(1500, 0)).chunk(&file(), &b.tree, source.as_bytes());
        assert_eq!(chunks[0].key.occurrence, 0);
        assert_eq!(chunks[1].key.occurrence, 1);
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
    }

    #[test]
    fn test_empty_tree_yields_no_chunks() {
        let chunks = Chunker::new(config(1500, 300)).chunk(&file(), &SymbolTree::new(), b"");
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let source = add_sub_source();
        let tree = add_sub_tree(&source);
        let chunker = Chunker::new(config(1500, 300));
        assert_eq!(
            chunker.chunk(&file(), &tree, source.as_bytes()),
            chunker.chunk(&file(), &tree, source.as_bytes())
        );
    }
}
