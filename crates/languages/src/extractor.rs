//! Tree-sitter extraction driven by declarative grammar specs
//!
//! The walker visits each scope's children in source order. Declarations
//! become symbols, comment blocks become documentation symbols placed right
//! before whatever follows them, and at the root, runs of non-declaration
//! statements are grouped. Error nodes are descended into so declarations
//! after a syntax error are still found.

use codeindex_core::error::{Error, Result};
use codeindex_core::{
    ByteRange, Language, LineRange, ParseOutput, ParseStatus, Symbol, SymbolId, SymbolKind,
    SymbolTree, SyntaxIssue,
};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use tree_sitter::{Node, Parser};

use crate::LanguageParser;

/// Longest signature kept, in bytes
const MAX_SIGNATURE_LEN: usize = 240;

/// Reads a declaration's name; `None` means the node does not declare
/// anything this rule cares about
pub(crate) type NameFn = fn(Node, &[u8]) -> Option<String>;

pub(crate) struct DeclarationRule {
    pub node_kind: &'static str,
    pub kind: SymbolKind,
    pub name: NameFn,
}

pub(crate) struct GrammarSpec {
    pub language: Language,
    pub grammar: fn() -> tree_sitter::Language,
    pub declarations: &'static [DeclarationRule],
    pub comment_kinds: &'static [&'static str],
    /// Nodes preceding a declaration that belong to it (attributes, decorators)
    pub attribute_kinds: &'static [&'static str],
    /// Wrappers looked through; their start is folded into the wrapped item
    pub transparent_kinds: &'static [&'static str],
    /// Declarations whose nested functions are methods
    pub method_parent_kinds: &'static [&'static str],
    /// Receiver type for methods declared outside their type
    pub receiver: Option<NameFn>,
    pub boilerplate: &'static [&'static str],
}

/// Text of the `name` field
pub(crate) fn name_field(node: Node, source: &[u8]) -> Option<String> {
    field_text(node, "name", source)
}

pub(crate) fn field_text(node: Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| n.utf8_text(source).ok())
        .map(str::to_string)
}

/// Drop generic arguments and pointer sigils from a type name
pub(crate) fn bare_type_name(text: &str) -> String {
    let text = text.trim().trim_start_matches(['*', '&']);
    let end = text.find(['<', '[', '(']).unwrap_or(text.len());
    text[..end].trim().to_string()
}

/// Parser for any language described by a [`GrammarSpec`]
pub(crate) struct TreeSitterParser {
    spec: &'static GrammarSpec,
    timeout: Duration,
}

impl TreeSitterParser {
    pub(crate) fn new(spec: &'static GrammarSpec, timeout: Duration) -> Self {
        Self { spec, timeout }
    }
}

impl LanguageParser for TreeSitterParser {
    fn language(&self) -> Language {
        self.spec.language
    }

    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutput> {
        let mut parser = Parser::new();
        parser
            .set_language(&(self.spec.grammar)())
            .map_err(|e| Error::config(format!("Failed to load {} grammar: {e}", self.spec.language)))?;
        parser.set_timeout_micros(u64::try_from(self.timeout.as_micros()).unwrap_or(u64::MAX));

        let started = Instant::now();
        let tree = parser.parse(source, None).ok_or_else(|| {
            Error::timeout(format!("parsing {}", file_path.display()), started.elapsed())
        })?;
        let root = tree.root_node();

        let mut walker = Walker {
            spec: self.spec,
            source,
            tree: SymbolTree::new(),
        };
        let scope = Scope::root();
        let mut pending = Pending::default();
        walker.visit_children(root, scope, &mut pending);
        walker.finish_scope(scope, &mut pending);
        let symbols = walker.tree;

        let status = if root.has_error() {
            let mut errors = Vec::new();
            collect_issues(root, source, &mut errors);
            let declarations = symbols
                .iter()
                .filter(|(_, s)| s.kind.is_declaration())
                .count();
            if declarations == 0 && !source.iter().all(u8::is_ascii_whitespace) {
                let reason = ParseStatus::Partial { errors }
                    .error_summary()
                    .unwrap_or_else(|| "syntax errors".to_string());
                ParseStatus::Failed {
                    reason: format!("no declarations recovered: {reason}"),
                }
            } else {
                ParseStatus::Partial { errors }
            }
        } else {
            ParseStatus::Complete
        };

        debug!(
            file = %file_path.display(),
            language = %self.spec.language,
            symbols = symbols.len(),
            elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
            complete = status.is_complete(),
            "Parsed file"
        );

        Ok(ParseOutput { symbols, status })
    }

    fn boilerplate_keywords(&self) -> &'static [&'static str] {
        self.spec.boilerplate
    }
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    parent: Option<SymbolId>,
    at_root: bool,
    /// Comment blocks are collected (false inside function bodies)
    collect_docs: bool,
    /// Nested functions are methods
    methods: bool,
}

impl Scope {
    fn root() -> Self {
        Self {
            parent: None,
            at_root: true,
            collect_docs: true,
            methods: false,
        }
    }
}

/// State carried across the children of one scope
#[derive(Debug, Default)]
struct Pending {
    /// Current comment block
    comments: Option<ByteRange>,
    /// Start of attributes or wrappers awaiting their item
    attrs_start: Option<usize>,
    /// Root-level statement group under construction
    statements: Option<ByteRange>,
}

struct Walker<'a> {
    spec: &'static GrammarSpec,
    source: &'a [u8],
    tree: SymbolTree,
}

impl Walker<'_> {
    fn visit_children(&mut self, node: Node<'_>, scope: Scope, pending: &mut Pending) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit_node(child, scope, pending);
        }
    }

    fn visit_node(&mut self, node: Node<'_>, scope: Scope, pending: &mut Pending) {
        let kind = node.kind();

        if self.spec.comment_kinds.contains(&kind) {
            self.on_comment(node, scope, pending);
            return;
        }

        if scope.collect_docs && self.spec.attribute_kinds.contains(&kind) {
            pending.attrs_start.get_or_insert(node.start_byte());
            return;
        }

        if let Some((rule, name)) = self.match_rule(node) {
            self.on_declaration(node, rule, name, scope, pending);
            return;
        }

        if node.is_error() {
            trace!(start = node.start_byte(), "Descending into error node");
            self.visit_children(node, scope, pending);
            return;
        }

        if self.spec.transparent_kinds.contains(&kind) {
            if scope.collect_docs {
                pending.attrs_start.get_or_insert(node.start_byte());
            }
            self.visit_children(node, scope, pending);
            return;
        }

        if scope.at_root {
            self.on_statement(node, pending);
            return;
        }

        // Attributes only bind to a declaration that directly follows them
        if pending.attrs_start.is_some_and(|start| node.start_byte() > start) {
            pending.attrs_start = None;
        }
        self.visit_children(node, scope, pending);
    }

    fn match_rule(&self, node: Node<'_>) -> Option<(&'static DeclarationRule, String)> {
        self.spec
            .declarations
            .iter()
            .filter(|rule| rule.node_kind == node.kind())
            .find_map(|rule| (rule.name)(node, self.source).map(|name| (rule, name)))
    }

    fn on_comment(&mut self, node: Node<'_>, scope: Scope, pending: &mut Pending) {
        if !scope.collect_docs || pending.attrs_start.is_some() {
            return;
        }
        if self.has_code_before_on_line(node.start_byte()) {
            // Trailing comment on a line of code
            return;
        }

        let range = ByteRange::from_node(node);
        match pending.comments {
            Some(block) if self.is_blank_between(block.end, range.start, 1) => {
                pending.comments = Some(block.cover(&range));
            }
            Some(_) => {
                self.flush_statements(scope, pending);
                self.flush_comments(scope, pending);
                pending.comments = Some(range);
            }
            None => pending.comments = Some(range),
        }
    }

    fn on_statement(&mut self, node: Node<'_>, pending: &mut Pending) {
        extend_statements(pending, node.start_byte(), node.end_byte());
    }

    fn on_declaration(
        &mut self,
        node: Node<'_>,
        rule: &'static DeclarationRule,
        name: String,
        scope: Scope,
        pending: &mut Pending,
    ) {
        let start = match pending.attrs_start.take() {
            Some(attrs) => attrs.min(node.start_byte()),
            None => node.start_byte(),
        };
        self.flush_statements(scope, pending);
        self.flush_comments(scope, pending);

        let kind = match rule.kind {
            SymbolKind::Function if scope.methods => SymbolKind::Method,
            other => other,
        };
        let range = ByteRange::new(start, node.end_byte());
        let mut symbol = Symbol::new(
            kind,
            name,
            range,
            LineRange::of_bytes(self.source, range),
            self.text(range),
        )
        .with_signature(self.signature(node));
        symbol.has_error = node.has_error();
        if kind == SymbolKind::Method {
            symbol.receiver = self.spec.receiver.and_then(|f| f(node, self.source));
        }
        let id = self.tree.push(scope.parent, symbol);

        let inner = Scope {
            parent: Some(id),
            at_root: false,
            collect_docs: kind.is_container(),
            methods: self.spec.method_parent_kinds.contains(&node.kind()),
        };
        let mut inner_pending = Pending::default();
        self.visit_children(node, inner, &mut inner_pending);
        self.finish_scope(inner, &mut inner_pending);
    }

    fn finish_scope(&mut self, scope: Scope, pending: &mut Pending) {
        if scope.at_root {
            // Dangling attributes at the root behave like statements
            if let Some(attrs) = pending.attrs_start {
                let end = self.trimmed_end(attrs);
                if end > attrs {
                    extend_statements(pending, attrs, end);
                }
            }
        }
        self.flush_statements(scope, pending);
        self.flush_comments(scope, pending);
    }

    fn flush_statements(&mut self, scope: Scope, pending: &mut Pending) {
        if let Some(range) = pending.statements.take() {
            let symbol = Symbol::new(
                SymbolKind::TopLevelStatements,
                "",
                range,
                LineRange::of_bytes(self.source, range),
                self.text(range),
            );
            self.tree.push(scope.parent, symbol);
        }
    }

    fn flush_comments(&mut self, scope: Scope, pending: &mut Pending) {
        if let Some(range) = pending.comments.take() {
            let symbol = Symbol::new(
                SymbolKind::Documentation,
                "",
                range,
                LineRange::of_bytes(self.source, range),
                self.text(range),
            );
            self.tree.push(scope.parent, symbol);
        }
    }

    fn text(&self, range: ByteRange) -> String {
        String::from_utf8_lossy(&self.source[range.as_range()]).into_owned()
    }

    /// Declaration header: from the node start up to its body, on one line
    fn signature(&self, node: Node<'_>) -> String {
        let start = node.start_byte();
        let end = match node.child_by_field_name("body") {
            Some(body) if body.start_byte() > start => body.start_byte(),
            _ => {
                let rest = &self.source[start..node.end_byte()];
                start + rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len())
            }
        };
        let raw = String::from_utf8_lossy(&self.source[start..end]);
        let mut signature = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = signature.trim_end_matches(['{', ':', '=']).trim_end().len();
        signature.truncate(trimmed);
        if signature.len() > MAX_SIGNATURE_LEN {
            let mut cut = MAX_SIGNATURE_LEN;
            while !signature.is_char_boundary(cut) {
                cut -= 1;
            }
            signature.truncate(cut);
        }
        signature
    }

    fn has_code_before_on_line(&self, offset: usize) -> bool {
        self.source[..offset]
            .iter()
            .rev()
            .take_while(|b| **b != b'\n')
            .any(|b| !b.is_ascii_whitespace())
    }

    /// True when `source[from..to]` is whitespace spanning at most
    /// `max_newlines` line breaks
    fn is_blank_between(&self, from: usize, to: usize, max_newlines: usize) -> bool {
        if from > to {
            return false;
        }
        let gap = &self.source[from..to];
        gap.iter().all(u8::is_ascii_whitespace)
            && gap.iter().filter(|b| **b == b'\n').count() <= max_newlines
    }

    /// End of the line starting at or after `offset`, minus trailing whitespace
    fn trimmed_end(&self, offset: usize) -> usize {
        let rest = &self.source[offset..];
        let line_end = offset + rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
        let mut end = line_end;
        while end > offset && self.source[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        end
    }
}

/// Grow the root statement group to cover `start..end`, absorbing any
/// pending attributes and comments that precede it
fn extend_statements(pending: &mut Pending, start: usize, end: usize) {
    let mut start = start;
    if let Some(attrs) = pending.attrs_start.take() {
        start = start.min(attrs);
    }
    if let Some(comments) = pending.comments.take() {
        start = start.min(comments.start);
    }
    let range = ByteRange::new(start, end);
    pending.statements = Some(match pending.statements {
        Some(group) => group.cover(&range),
        None => range,
    });
}

fn collect_issues(node: Node<'_>, source: &[u8], out: &mut Vec<SyntaxIssue>) {
    if node.is_error() || node.is_missing() {
        let message = if node.is_missing() {
            format!("missing {}", node.kind())
        } else {
            let snippet = node
                .utf8_text(source)
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(40)
                .collect::<String>();
            format!("unexpected `{snippet}`")
        };
        out.push(SyntaxIssue {
            byte_range: ByteRange::from_node(node),
            line: node.start_position().row,
            message,
        });
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    for child in children {
        collect_issues(child, source, out);
    }
}
