//! Shared helpers for language extraction tests

#![allow(dead_code)]

use codeindex_core::config::{NormalizerConfig, ParserConfig};
use codeindex_core::{ParseStatus, Symbol, SymbolKind, SymbolTree};
use codeindex_languages::{Normalizer, ParserRegistry, Resolution};
use std::path::Path;

pub fn registry() -> ParserRegistry {
    ParserRegistry::from_config(&ParserConfig::default()).expect("default registry builds")
}

/// Resolve, parse and normalize `source` as if read from `path`
pub fn parse_normalized(path: &str, source: &str) -> (ParseStatus, SymbolTree) {
    let registry = registry();
    let path = Path::new(path);
    let handle = match registry.resolve(path, source.as_bytes()) {
        Resolution::Supported(handle) => handle,
        Resolution::Unsupported => panic!("no parser for {}", path.display()),
    };
    let output = handle
        .parse(source.as_bytes(), path)
        .expect("parse should not fail");
    output
        .symbols
        .validate()
        .expect("raw tree should be well nested");

    let normalizer = Normalizer::new(NormalizerConfig::default());
    let tree = normalizer.normalize(
        &output.symbols,
        source.as_bytes(),
        handle.boilerplate_keywords(),
    );
    tree.validate().expect("normalized tree should be well nested");
    (output.status, tree)
}

/// Qualified names of declarations in source order
pub fn declaration_names(tree: &SymbolTree) -> Vec<String> {
    tree.preorder()
        .into_iter()
        .map(|id| tree.get(id))
        .filter(|s| s.kind.is_declaration())
        .map(|s| s.qualified_name.clone())
        .collect()
}

pub fn find<'a>(tree: &'a SymbolTree, qualified_name: &str) -> &'a Symbol {
    tree.iter()
        .map(|(_, s)| s)
        .find(|s| s.qualified_name == qualified_name)
        .unwrap_or_else(|| {
            panic!(
                "no symbol named {qualified_name}; have {:?}",
                declaration_names(tree)
            )
        })
}

pub fn count_kind(tree: &SymbolTree, kind: SymbolKind) -> usize {
    tree.iter().filter(|(_, s)| s.kind == kind).count()
}

pub fn print_tree(tree: &SymbolTree) {
    for id in tree.preorder() {
        let symbol = tree.get(id);
        let depth = tree.ancestors(id).count();
        println!(
            "{}{:?} {} {:?}",
            "  ".repeat(depth),
            symbol.kind,
            symbol.qualified_name,
            symbol.byte_range
        );
    }
}
