use codeindex_core::config::ParserConfig;
use codeindex_core::{Language, SymbolKind};
use std::sync::Arc;
use tree_sitter::Node;

use crate::extractor::{name_field, DeclarationRule, GrammarSpec, TreeSitterParser};
use crate::grammars::javascript::{function_field_name, function_variable_name};
use crate::{LanguageDescriptor, LanguageParser};

/// `namespace Shapes { ... }` parses as an expression statement
fn namespace_statement_name(node: Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let module = node
        .named_children(&mut cursor)
        .find(|c| c.kind() == "internal_module")?;
    name_field(module, source)
}

/// Namespaces wrapped in an expression statement are named by the wrapper
fn namespace_name(node: Node, source: &[u8]) -> Option<String> {
    if node
        .parent()
        .is_some_and(|p| p.kind() == "expression_statement")
    {
        return None;
    }
    name_field(node, source)
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
        node_kind: "function_signature",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "class_declaration",
        kind: SymbolKind::Type,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "abstract_class_declaration",
        kind: SymbolKind::Type,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "interface_declaration",
        kind: SymbolKind::Type,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "type_alias_declaration",
        kind: SymbolKind::Type,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "enum_declaration",
        kind: SymbolKind::Enum,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "internal_module",
        kind: SymbolKind::Namespace,
        name: namespace_name,
    },
    DeclarationRule {
        node_kind: "expression_statement",
        kind: SymbolKind::Namespace,
        name: namespace_statement_name,
    },
    DeclarationRule {
        node_kind: "method_definition",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "method_signature",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "abstract_method_signature",
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
        node_kind: "public_field_definition",
        kind: SymbolKind::Function,
        name: function_field_name,
    },
];

const COMMENT_KINDS: &[&str] = &["comment"];
const TRANSPARENT_KINDS: &[&str] = &["export_statement", "ambient_declaration"];
const METHOD_PARENT_KINDS: &[&str] = &[
    "class_declaration",
    "abstract_class_declaration",
    "class",
    "interface_declaration",
];
const BOILERPLATE: &[&str] = &[
    "export",
    "default",
    "declare",
    "public",
    "private",
    "protected",
];

pub(crate) static TYPESCRIPT: GrammarSpec = GrammarSpec {
    language: Language::TypeScript,
    grammar: || tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
    declarations: DECLARATIONS,
    comment_kinds: COMMENT_KINDS,
    attribute_kinds: &[],
    transparent_kinds: TRANSPARENT_KINDS,
    method_parent_kinds: METHOD_PARENT_KINDS,
    receiver: None,
    boilerplate: BOILERPLATE,
};

pub(crate) static TSX: GrammarSpec = GrammarSpec {
    language: Language::TypeScript,
    grammar: || tree_sitter_typescript::LANGUAGE_TSX.into(),
    declarations: DECLARATIONS,
    comment_kinds: COMMENT_KINDS,
    attribute_kinds: &[],
    transparent_kinds: TRANSPARENT_KINDS,
    method_parent_kinds: METHOD_PARENT_KINDS,
    receiver: None,
    boilerplate: BOILERPLATE,
};

fn create_typescript_parser(config: &ParserConfig) -> Arc<dyn LanguageParser> {
    Arc::new(TreeSitterParser::new(&TYPESCRIPT, config.timeout()))
}

fn create_tsx_parser(config: &ParserConfig) -> Arc<dyn LanguageParser> {
    Arc::new(TreeSitterParser::new(&TSX, config.timeout()))
}

inventory::submit! {
    LanguageDescriptor {
        language: Language::TypeScript,
        name: "typescript",
        extensions: &["ts", "mts", "cts"],
        interpreters: &["ts-node", "deno"],
        markers: &["interface ", ": string", ": number", "export type ", "import type ", "readonly "],
        factory: create_typescript_parser,
    }
}

inventory::submit! {
    LanguageDescriptor {
        language: Language::TypeScript,
        name: "tsx",
        extensions: &["tsx"],
        interpreters: &[],
        markers: &[],
        factory: create_tsx_parser,
    }
}
