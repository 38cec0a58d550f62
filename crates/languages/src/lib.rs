#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Language parsers, the parser registry and the symbol normalizer
//!
//! Every supported language is described by a declarative grammar spec and
//! registered through an inventory [`LanguageDescriptor`]. The
//! [`ParserRegistry`] collects the enabled descriptors once at startup and
//! is read-only afterwards.

use codeindex_core::config::ParserConfig;
use codeindex_core::error::Result;
use codeindex_core::{Language, ParseOutput};
use std::path::Path;
use std::sync::Arc;

// All internal modules are private
mod extractor;
mod grammars;
mod sniff;

// Public modules
pub mod normalizer;
pub mod registry;

pub use normalizer::Normalizer;
pub use registry::{ParserHandle, ParserRegistry, ParserRegistryBuilder, Resolution};

/// Contract every language parser satisfies
///
/// Implementations are pure functions of their input bytes: no hidden
/// state and no filesystem access. Syntax errors degrade to
/// [`ParseStatus::Partial`](codeindex_core::ParseStatus::Partial) with
/// whatever symbols could be recovered. `Err` is reserved for transient
/// conditions such as a parse timeout.
pub trait LanguageParser: Send + Sync {
    /// Language of the symbols this parser produces
    fn language(&self) -> Language;

    /// Extract raw symbols from source bytes
    fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutput>;

    /// Keywords the normalizer strips from signatures (access modifiers etc.)
    fn boilerplate_keywords(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Language descriptor for automatic registration
pub struct LanguageDescriptor {
    pub language: Language,
    /// Registry name; distinct dialects of one language (tsx) get their own
    pub name: &'static str,
    /// Lowercase file extensions without the dot
    pub extensions: &'static [&'static str],
    /// Shebang interpreter prefixes (`python` matches `python3`)
    pub interpreters: &'static [&'static str],
    /// Characteristic source fragments used for content sniffing
    pub markers: &'static [&'static str],
    pub factory: fn(&ParserConfig) -> Arc<dyn LanguageParser>,
}

inventory::collect!(LanguageDescriptor);

/// Iterate every compiled-in language descriptor
pub fn descriptors() -> impl Iterator<Item = &'static LanguageDescriptor> {
    inventory::iter::<LanguageDescriptor>.into_iter()
}
