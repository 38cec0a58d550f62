//! Normalization of raw parser output into the canonical symbol shape
//!
//! - attaches comment blocks to the declaration that follows them when they
//!   are close enough, removing the standalone documentation symbol
//! - resolves qualified names from the nesting of declarations
//! - strips boilerplate keywords from signatures
//!
//! Output order is source order and depends only on the input tree and
//! bytes.

use codeindex_core::config::NormalizerConfig;
use codeindex_core::{ScopeContext, Symbol, SymbolId, SymbolKind, SymbolTree};

/// Canonicalizes a parser's [`SymbolTree`]
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
}

struct Attachments {
    /// Doc block attached to each declaration, by raw id
    doc_of: Vec<Option<SymbolId>>,
    /// Documentation symbols folded into a declaration
    absorbed: Vec<bool>,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, raw: &SymbolTree, source: &[u8], boilerplate: &[&str]) -> SymbolTree {
        let attachments = self.attach_docs(raw, source);
        let mut out = SymbolTree::new();
        let mut scope = ScopeContext::new();
        for root in raw.roots() {
            self.copy_symbol(raw, *root, None, &attachments, boilerplate, &mut scope, &mut out);
        }
        out
    }

    fn attach_docs(&self, raw: &SymbolTree, source: &[u8]) -> Attachments {
        let mut attachments = Attachments {
            doc_of: vec![None; raw.len()],
            absorbed: vec![false; raw.len()],
        };
        let mut sibling_lists: Vec<&[SymbolId]> = vec![raw.roots()];
        sibling_lists.extend(raw.iter().map(|(id, _)| raw.children(id)));

        for siblings in sibling_lists {
            for pair in siblings.windows(2) {
                let (doc, decl) = (raw.get(pair[0]), raw.get(pair[1]));
                if doc.kind == SymbolKind::Documentation
                    && decl.kind.is_declaration()
                    && self.is_close_enough(doc, decl, source)
                {
                    attachments.doc_of[pair[1].index()] = Some(pair[0]);
                    attachments.absorbed[pair[0].index()] = true;
                }
            }
        }
        attachments
    }

    /// The gap between comment and declaration must be blank and hold no
    /// more blank lines than configured
    fn is_close_enough(&self, doc: &Symbol, decl: &Symbol, source: &[u8]) -> bool {
        let (from, to) = (doc.byte_range.end, decl.byte_range.start);
        if from > to || to > source.len() {
            return false;
        }
        let gap = &source[from..to];
        if !gap.iter().all(u8::is_ascii_whitespace) {
            return false;
        }
        let newlines = gap.iter().filter(|b| **b == b'\n').count();
        newlines.saturating_sub(1) <= self.config.doc_comment_max_gap_lines
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_symbol(
        &self,
        raw: &SymbolTree,
        id: SymbolId,
        parent: Option<SymbolId>,
        attachments: &Attachments,
        boilerplate: &[&str],
        scope: &mut ScopeContext,
        out: &mut SymbolTree,
    ) {
        if attachments.absorbed[id.index()] {
            return;
        }

        let mut symbol = raw.get(id).clone();
        if let Some(doc_id) = attachments.doc_of[id.index()] {
            let doc = raw.get(doc_id);
            symbol.doc_range = Some(doc.byte_range);
            symbol.doc_comment = Some(clean_comment(&doc.body_text));
        }
        if self.config.strip_modifiers {
            symbol.signature = strip_keywords(&symbol.signature, boilerplate);
        }

        let scoped_name = match &symbol.receiver {
            Some(receiver) if !symbol.name.is_empty() => format!("{receiver}::{}", symbol.name),
            _ => symbol.name.clone(),
        };
        symbol.qualified_name = if symbol.kind.is_declaration() {
            scope.build_qualified_name(&scoped_name)
        } else {
            String::new()
        };

        let new_id = out.push(parent, symbol);
        scope.push_scope(scoped_name);
        for child in raw.children(id) {
            self.copy_symbol(raw, *child, Some(new_id), attachments, boilerplate, scope, out);
        }
        scope.pop_scope();
    }
}

/// Remove whole-word keywords and collapse whitespace
fn strip_keywords(signature: &str, keywords: &[&str]) -> String {
    signature
        .split_whitespace()
        .filter(|token| !keywords.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Comment text without comment markers
fn clean_comment(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(|line| {
            let line = line.trim();
            let line = line
                .strip_suffix("*/")
                .unwrap_or(line)
                .trim_end();
            let line = ["///", "//!", "//", "/**", "/*", "#", "*"]
                .iter()
                .find_map(|marker| line.strip_prefix(marker))
                .unwrap_or(line);
            line.trim()
        })
        .collect();
    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeindex_core::{ByteRange, LineRange};
    use pretty_assertions::assert_eq;

    fn symbol_at(source: &str, kind: SymbolKind, name: &str, needle: &str) -> Symbol {
        let start = source.find(needle).expect("needle present");
        let range = ByteRange::new(start, start + needle.len());
        Symbol::new(
            kind,
            name,
            range,
            LineRange::of_bytes(source.as_bytes(), range),
            needle,
        )
    }

    fn normalizer(max_gap: usize) -> Normalizer {
        Normalizer::new(NormalizerConfig {
            doc_comment_max_gap_lines: max_gap,
            strip_modifiers: true,
        })
    }

    #[test]
    fn test_clean_comment() {
        assert_eq!(clean_comment("/// Adds two numbers.\n/// Returns the sum."), "Adds two numbers.\nReturns the sum.");
        assert_eq!(clean_comment("/**\n * Docs here\n */"), "Docs here");
        assert_eq!(clean_comment("# python comment"), "python comment");
    }

    #[test]
    fn test_strip_keywords() {
        assert_eq!(
            strip_keywords("pub(crate)   async fn  run(x: u8)", &["pub", "pub(crate)"]),
            "async fn run(x: u8)"
        );
        assert_eq!(
            strip_keywords("export default function main()", &["export", "default"]),
            "function main()"
        );
    }

    #[test]
    fn test_gap_threshold_tight_and_loose() {
        let source = "// helper docs\n\nfn helper() {}\n";
        let mut raw = SymbolTree::new();
        raw.push(None, symbol_at(source, SymbolKind::Documentation, "", "// helper docs"));
        raw.push(None, symbol_at(source, SymbolKind::Function, "helper", "fn helper() {}"));

        // One blank line in between: rejected at gap 0, accepted at gap 1
        let tight = normalizer(0).normalize(&raw, source.as_bytes(), &[]);
        assert_eq!(tight.roots().len(), 2);
        assert_eq!(tight.get(tight.roots()[1]).doc_comment, None);

        let loose = normalizer(1).normalize(&raw, source.as_bytes(), &[]);
        assert_eq!(loose.roots().len(), 1);
        let helper = loose.get(loose.roots()[0]);
        assert_eq!(helper.doc_comment.as_deref(), Some("helper docs"));
        assert_eq!(helper.doc_range, Some(ByteRange::new(0, 14)));
    }

    #[test]
    fn test_intervening_code_blocks_attachment() {
        let source = "// about x\nlet x = 1;\nfn f() {}\n";
        let mut raw = SymbolTree::new();
        raw.push(None, symbol_at(source, SymbolKind::Documentation, "", "// about x"));
        raw.push(None, symbol_at(source, SymbolKind::Function, "f", "fn f() {}"));

        let tree = normalizer(5).normalize(&raw, source.as_bytes(), &[]);
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.get(tree.roots()[0]).kind, SymbolKind::Documentation);
    }

    #[test]
    fn test_qualified_names_follow_nesting() {
        let source = "mod geo { struct Circle { } impl Circle { fn area() {} } }";
        let mut raw = SymbolTree::new();
        let module = raw.push(None, symbol_at(source, SymbolKind::Namespace, "geo", source));
        raw.push(
            Some(module),
            symbol_at(source, SymbolKind::Type, "Circle", "struct Circle { }"),
        );
        let imp = raw.push(
            Some(module),
            symbol_at(source, SymbolKind::Namespace, "Circle", "impl Circle { fn area() {} }"),
        );
        raw.push(Some(imp), symbol_at(source, SymbolKind::Method, "area", "fn area() {}"));

        let tree = normalizer(1).normalize(&raw, source.as_bytes(), &[]);
        let names: Vec<String> = tree
            .preorder()
            .into_iter()
            .map(|id| tree.get(id).qualified_name.clone())
            .collect();
        assert_eq!(names, vec!["geo", "geo::Circle", "geo::Circle", "geo::Circle::area"]);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_receiver_prefixes_qualified_name() {
        let source = "func (p *Point) Norm() float64 { return 0 }";
        let mut raw = SymbolTree::new();
        let mut method = symbol_at(source, SymbolKind::Method, "Norm", source);
        method.receiver = Some("Point".to_string());
        raw.push(None, method);

        let tree = normalizer(1).normalize(&raw, source.as_bytes(), &[]);
        assert_eq!(tree.get(tree.roots()[0]).qualified_name, "Point::Norm");
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let source = "// a\nfn a() {}\n// b\nfn b() {}\n";
        let mut raw = SymbolTree::new();
        raw.push(None, symbol_at(source, SymbolKind::Documentation, "", "// a"));
        raw.push(None, symbol_at(source, SymbolKind::Function, "a", "fn a() {}"));
        raw.push(None, symbol_at(source, SymbolKind::Documentation, "", "// b"));
        raw.push(None, symbol_at(source, SymbolKind::Function, "b", "fn b() {}"));

        let first = normalizer(1).normalize(&raw, source.as_bytes(), &[]);
        let second = normalizer(1).normalize(&raw, source.as_bytes(), &[]);
        assert_eq!(first, second);
        assert_eq!(first.roots().len(), 2);
    }
}
