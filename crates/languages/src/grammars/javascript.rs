use codeindex_core::config::ParserConfig;
use codeindex_core::{Language, SymbolKind};
use std::sync::Arc;
use tree_sitter::Node;

use crate::extractor::{field_text, name_field, DeclarationRule, GrammarSpec, TreeSitterParser};
use crate::{LanguageDescriptor, LanguageParser};

const FUNCTION_VALUE_KINDS: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

fn is_function_value(node: Node) -> bool {
    node.child_by_field_name("value")
        .is_some_and(|v| FUNCTION_VALUE_KINDS.contains(&v.kind()))
}

/// `const handler = (req) => { ... }` declares a function named `handler`
pub(crate) fn function_variable_name(node: Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let declarator = node
        .named_children(&mut cursor)
        .find(|c| c.kind() == "variable_declarator")?;
    if !is_function_value(declarator) {
        return None;
    }
    name_field(declarator, source)
}

/// Class fields initialised with a function: `onClick = () => { ... }`
pub(crate) fn function_field_name(node: Node, source: &[u8]) -> Option<String> {
    if !is_function_value(node) {
        return None;
    }
    // JavaScript names the field `property`, TypeScript `name`
    field_text(node, "property", source).or_else(|| name_field(node, source))
}

static DECLARATIONS: &[DeclarationRule] = &[
    DeclarationRule {
        node_kind: "function_declaration",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "generator_function_declaration",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "class_declaration",
        kind: SymbolKind::Type,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "method_definition",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "lexical_declaration",
        kind: SymbolKind::Function,
        name: function_variable_name,
    },
    DeclarationRule {
        node_kind: "variable_declaration",
        kind: SymbolKind::Function,
        name: function_variable_name,
    },
    DeclarationRule {
        node_kind: "field_definition",
        kind: SymbolKind::Function,
        name: function_field_name,
    },
];

pub(crate) static JAVASCRIPT: GrammarSpec = GrammarSpec {
    language: Language::JavaScript,
    grammar: || tree_sitter_javascript::LANGUAGE.into(),
    declarations: DECLARATIONS,
    comment_kinds: &["comment"],
    attribute_kinds: &[],
    transparent_kinds: &["export_statement"],
    method_parent_kinds: &["class_declaration", "class"],
    receiver: None,
    boilerplate: &["export", "default"],
};

fn create_parser(config: &ParserConfig) -> Arc<dyn LanguageParser> {
    Arc::new(TreeSitterParser::new(&JAVASCRIPT, config.timeout()))
}

inventory::submit! {
    LanguageDescriptor {
        language: Language::JavaScript,
        name: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
        interpreters: &["node"],
        markers: &["function ", "const ", "=>", "require(", "module.exports", "let "],
        factory: create_parser,
    }
}
