use codeindex_core::config::ParserConfig;
use codeindex_core::{Language, SymbolKind};
use std::sync::Arc;

use crate::extractor::{name_field, DeclarationRule, GrammarSpec, TreeSitterParser};
use crate::{LanguageDescriptor, LanguageParser};

static DECLARATIONS: &[DeclarationRule] = &[
    DeclarationRule {
        node_kind: "function_definition",
        kind: SymbolKind::Function,
        name: name_field,
    },
    DeclarationRule {
        node_kind: "class_definition",
        kind: SymbolKind::Type,
        name: name_field,
    },
];

pub(crate) static PYTHON: GrammarSpec = GrammarSpec {
    language: Language::Python,
    grammar: || tree_sitter_python::LANGUAGE.into(),
    declarations: DECLARATIONS,
    comment_kinds: &["comment"],
    attribute_kinds: &["decorator"],
    transparent_kinds: &["decorated_definition"],
    method_parent_kinds: &["class_definition"],
    receiver: None,
    boilerplate: &[],
};

fn create_parser(config: &ParserConfig) -> Arc<dyn LanguageParser> {
    Arc::new(TreeSitterParser::new(&PYTHON, config.timeout()))
}

inventory::submit! {
    LanguageDescriptor {
        language: Language::Python,
        name: "python",
        extensions: &["py", "pyi"],
        interpreters: &["python"],
        markers: &["def ", "import ", "self.", "elif ", "__name__", "print("],
        factory: create_parser,
    }
}
