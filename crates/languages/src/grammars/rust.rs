use codeindex_core::config::ParserConfig;
use codeindex_core::{Language, SymbolKind};
use std::sync::Arc;
use tree_sitter::Node;

use crate::extractor::{
    bare_type_name, field_text, name_field, DeclarationRule, GrammarSpec, TreeSitterParser,
};
use crate::{LanguageDescriptor, LanguageParser};

/// `mod foo { ... }`; a bodiless `mod foo;` is a plain statement
fn inline_module_name(node: Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("body")?;
    name_field(node, source)
}

/// `impl<T> Display for Point<T>` is scoped under `Point`
fn impl_type_name(node: Node, source: &[u8]) -> Option<String> {
    field_text(node, "type", source).map(|t| bare_type_name(&t))
}

static DECLARATIONS: &[DeclarationRule] = &[
    DeclarationRule {
        node_kind: "function_item",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "function_signature_item",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "struct_item",
        kind: SymbolKind::Type,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "trait_item",
        kind: SymbolKind::Type,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "enum_item",
        kind: SymbolKind::Enum,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "union_item",
        kind: SymbolKind::Union,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "mod_item",
        kind: SymbolKind::Namespace,
        name: inline_module_name,
    },
    DeclarationRule {
        node_kind: "impl_item",
        kind: SymbolKind::Namespace,
        name: impl_type_name,
    },
];

pub(crate) static RUST: GrammarSpec = GrammarSpec {
    language: Language::Rust,
    grammar: || tree_sitter_rust::LANGUAGE.into(),
    declarations: DECLARATIONS,
    comment_kinds: &["line_comment", "block_comment"],
    attribute_kinds: &["attribute_item"],
    transparent_kinds: &[],
    method_parent_kinds: &["impl_item", "trait_item"],
    receiver: None,
    boilerplate: &["pub", "pub(crate)", "pub(super)", "pub(self)"],
};

fn create_parser(config: &ParserConfig) -> Arc<dyn LanguageParser> {
    Arc::new(TreeSitterParser::new(&RUST, config.timeout()))
}

inventory::submit! {
    LanguageDescriptor {
        language: Language::Rust,
        name: "rust",
        extensions: &["rs"],
        interpreters: &["rust-script"],
        markers: &["fn ", "let mut ", "impl ", "use std::", "pub fn ", "#[derive("],
        factory: create_parser,
    }
}
