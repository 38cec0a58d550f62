use codeindex_core::config::ParserConfig;
use codeindex_core::{Language, SymbolKind};
use std::sync::Arc;
use tree_sitter::Node;

use crate::extractor::{
    bare_type_name, field_text, name_field, DeclarationRule, GrammarSpec, TreeSitterParser,
};
use crate::{LanguageDescriptor, LanguageParser};

/// `type ( A struct{}; B int )` is named after its first spec
fn type_declaration_name(node: Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let spec = node
        .named_children(&mut cursor)
        .find(|c| matches!(c.kind(), "type_spec" | "type_alias"))?;
    name_field(spec, source)
}

/// `func (s *Server) Start()` has receiver `Server`
fn receiver_type(node: Node, source: &[u8]) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    let param = receiver
        .named_children(&mut cursor)
        .find(|c| c.kind() == "parameter_declaration")?;
    field_text(param, "type", source).map(|t| bare_type_name(&t))
}

static DECLARATIONS: &[DeclarationRule] = &[
    DeclarationRule {
        node_kind: "function_declaration",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "method_declaration",
        kind: SymbolKind::Method,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "type_declaration",
        kind: SymbolKind::Type,
        name: type_declaration_name,
    },
];

pub(crate) static GO: GrammarSpec = GrammarSpec {
    language: Language::Go,
    grammar: || tree_sitter_go::LANGUAGE.into(),
    declarations: DECLARATIONS,
    comment_kinds: &["comment"],
    attribute_kinds: &[],
    transparent_kinds: &[],
    method_parent_kinds: &[],
    receiver: Some(receiver_type),
    boilerplate: &[],
};

fn create_parser(config: &ParserConfig) -> Arc<dyn LanguageParser> {
    Arc::new(TreeSitterParser::new(&GO, config.timeout()))
}

inventory::submit! {
    LanguageDescriptor {
        language: Language::Go,
        name: "go",
        extensions: &["go"],
        interpreters: &[],
        markers: &["package ", "func ", ":=", "import (", "fmt."],
        factory: create_parser,
    }
}
