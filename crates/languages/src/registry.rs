//! Parser registry: maps files to the parser that handles them
//!
//! Registration happens through [`ParserRegistryBuilder`] and is closed by
//! [`ParserRegistryBuilder::build`]. The built registry is immutable, so it
//! can be shared across worker tasks behind an `Arc` without locking.

use codeindex_core::config::ParserConfig;
use codeindex_core::error::{Error, Result};
use codeindex_core::{Language, ParseOutput};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::sniff::{interpreter_matches, marker_score, shebang_interpreter};
use crate::{descriptors, LanguageDescriptor, LanguageParser};

/// Minimum number of distinct markers before sniffing claims a file
const MIN_MARKER_HITS: usize = 2;

/// Everything the registry knows about one registered parser
struct Registration {
    name: String,
    extensions: Vec<String>,
    interpreters: Vec<String>,
    markers: Vec<String>,
    parser: Arc<dyn LanguageParser>,
}

/// Cheap, cloneable reference to a registered parser
#[derive(Clone)]
pub struct ParserHandle {
    name: Arc<str>,
    parser: Arc<dyn LanguageParser>,
}

impl ParserHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> Language {
        self.parser.language()
    }

    pub fn parse(&self, source: &[u8], file_path: &Path) -> Result<ParseOutput> {
        self.parser.parse(source, file_path)
    }

    pub fn boilerplate_keywords(&self) -> &'static [&'static str] {
        self.parser.boilerplate_keywords()
    }
}

impl fmt::Debug for ParserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserHandle")
            .field("name", &self.name)
            .field("language", &self.language())
            .finish()
    }
}

/// Outcome of resolving a file against the registry
#[derive(Debug, Clone)]
pub enum Resolution {
    Supported(ParserHandle),
    /// No registered parser claims the file; callers skip it
    Unsupported,
}

impl Resolution {
    pub fn handle(&self) -> Option<&ParserHandle> {
        match self {
            Self::Supported(handle) => Some(handle),
            Self::Unsupported => None,
        }
    }
}

/// Collects registrations before the registry is closed
#[derive(Default)]
pub struct ParserRegistryBuilder {
    registrations: Vec<Registration>,
}

impl ParserRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled-in language descriptor
    pub fn with_descriptor(mut self, descriptor: &LanguageDescriptor, config: &ParserConfig) -> Self {
        self.registrations.push(Registration {
            name: descriptor.name.to_string(),
            extensions: descriptor.extensions.iter().map(|e| e.to_string()).collect(),
            interpreters: descriptor
                .interpreters
                .iter()
                .map(|i| i.to_string())
                .collect(),
            markers: descriptor.markers.iter().map(|m| m.to_string()).collect(),
            parser: (descriptor.factory)(config),
        });
        self
    }

    /// Register an arbitrary parser implementation
    ///
    /// Later registrations never displace earlier ones for the same
    /// extension; ambiguity is settled by content sniffing at resolve time.
    pub fn with_parser(
        mut self,
        name: impl Into<String>,
        extensions: &[&str],
        markers: &[&str],
        parser: Arc<dyn LanguageParser>,
    ) -> Self {
        self.registrations.push(Registration {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            interpreters: Vec::new(),
            markers: markers.iter().map(|m| m.to_string()).collect(),
            parser,
        });
        self
    }

    /// Close registration
    pub fn build(self) -> Result<ParserRegistry> {
        let mut by_extension: HashMap<String, Vec<usize>> = HashMap::new();
        let mut names: HashMap<&str, usize> = HashMap::new();
        for (idx, registration) in self.registrations.iter().enumerate() {
            if names.insert(registration.name.as_str(), idx).is_some() {
                return Err(Error::config(format!(
                    "Parser '{}' registered twice",
                    registration.name
                )));
            }
            for ext in &registration.extensions {
                by_extension.entry(ext.clone()).or_default().push(idx);
            }
        }

        let handles = self
            .registrations
            .iter()
            .map(|r| ParserHandle {
                name: Arc::from(r.name.as_str()),
                parser: Arc::clone(&r.parser),
            })
            .collect();

        Ok(ParserRegistry {
            registrations: self.registrations,
            handles,
            by_extension,
        })
    }
}

/// Read-only mapping from files to parsers
pub struct ParserRegistry {
    registrations: Vec<Registration>,
    handles: Vec<ParserHandle>,
    by_extension: HashMap<String, Vec<usize>>,
}

impl ParserRegistry {
    pub fn builder() -> ParserRegistryBuilder {
        ParserRegistryBuilder::new()
    }

    /// Build a registry holding every compiled-in language enabled in `config`
    pub fn from_config(config: &ParserConfig) -> Result<Self> {
        let enabled = config.languages()?;
        let mut builder = ParserRegistryBuilder::new();
        // Inventory order is unspecified; sort for reproducible resolution
        let mut selected: Vec<&'static LanguageDescriptor> = descriptors()
            .filter(|d| enabled.contains(&d.language))
            .collect();
        selected.sort_by_key(|d| d.name);
        for descriptor in selected {
            builder = builder.with_descriptor(descriptor, config);
        }
        builder.build()
    }

    /// Registered parser names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.name.as_str()).collect()
    }

    /// Select the parser for a file
    ///
    /// The extension decides when exactly one parser claims it. Otherwise
    /// the shebang line and then characteristic tokens are consulted, among
    /// the extension's claimants if there are several, or among all parsers
    /// if there are none.
    pub fn resolve(&self, file_path: &Path, source: &[u8]) -> Resolution {
        let extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        let all: Vec<usize> = (0..self.registrations.len()).collect();
        let claimants = extension
            .as_deref()
            .and_then(|e| self.by_extension.get(e));
        let candidates: &[usize] = match claimants {
            Some(claimants) if claimants.len() == 1 => {
                return Resolution::Supported(self.handles[claimants[0]].clone());
            }
            Some(claimants) => claimants,
            None => &all,
        };

        match self.sniff(candidates, source) {
            Some(idx) => {
                debug!(
                    file = %file_path.display(),
                    parser = %self.registrations[idx].name,
                    "Resolved parser by content"
                );
                Resolution::Supported(self.handles[idx].clone())
            }
            None if claimants.is_some() => {
                // Ambiguous extension with no content signal: first claimant wins
                Resolution::Supported(self.handles[candidates[0]].clone())
            }
            None => Resolution::Unsupported,
        }
    }

    fn sniff(&self, candidates: &[usize], source: &[u8]) -> Option<usize> {
        if let Some(interpreter) = shebang_interpreter(source) {
            let by_shebang = candidates.iter().copied().find(|idx| {
                let prefixes: Vec<&str> = self.registrations[*idx]
                    .interpreters
                    .iter()
                    .map(String::as_str)
                    .collect();
                interpreter_matches(&interpreter, &prefixes)
            });
            if by_shebang.is_some() {
                return by_shebang;
            }
        }

        let mut best: Option<(usize, usize)> = None;
        let mut tied = false;
        for idx in candidates.iter().copied() {
            let markers: Vec<&str> = self.registrations[idx]
                .markers
                .iter()
                .map(String::as_str)
                .collect();
            let score = marker_score(source, &markers);
            match best {
                Some((_, top)) if score == top => tied = true,
                Some((_, top)) if score < top => {}
                _ => {
                    best = Some((idx, score));
                    tied = false;
                }
            }
        }
        match best {
            Some((idx, score)) if score >= MIN_MARKER_HITS && !tied => Some(idx),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeindex_core::{ParseStatus, SymbolTree};

    struct StubParser(Language);

    impl LanguageParser for StubParser {
        fn language(&self) -> Language {
            self.0
        }

        fn parse(&self, _source: &[u8], _file_path: &Path) -> Result<ParseOutput> {
            Ok(ParseOutput {
                symbols: SymbolTree::new(),
                status: ParseStatus::Complete,
            })
        }
    }

    fn stub_registry() -> ParserRegistry {
        ParserRegistry::builder()
            .with_parser("alpha", &["al", "shared"], &["alpha!", "begin"], Arc::new(StubParser(Language::Rust)))
            .with_parser("beta", &["be", "SHARED"], &["beta!", "end"], Arc::new(StubParser(Language::Go)))
            .build()
            .expect("registry builds")
    }

    fn resolved_name(resolution: &Resolution) -> Option<&str> {
        resolution.handle().map(ParserHandle::name)
    }

    #[test]
    fn test_unique_extension_wins() {
        let registry = stub_registry();
        let resolution = registry.resolve(Path::new("x/y.AL"), b"beta! end");
        assert_eq!(resolved_name(&resolution), Some("alpha"));
    }

    #[test]
    fn test_ambiguous_extension_sniffs_content() {
        let registry = stub_registry();
        let resolution = registry.resolve(Path::new("f.shared"), b"beta!\nend\n");
        assert_eq!(resolved_name(&resolution), Some("beta"));
    }

    #[test]
    fn test_ambiguous_extension_without_signal_takes_first() {
        let registry = stub_registry();
        let resolution = registry.resolve(Path::new("f.shared"), b"nothing here");
        assert_eq!(resolved_name(&resolution), Some("alpha"));
    }

    #[test]
    fn test_unknown_extension_without_signal_is_unsupported() {
        let registry = stub_registry();
        assert!(matches!(
            registry.resolve(Path::new("notes.txt"), b"plain prose"),
            Resolution::Unsupported
        ));
        assert!(matches!(
            registry.resolve(Path::new("Makefile"), b"all:\n\tcc main.c"),
            Resolution::Unsupported
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = ParserRegistry::builder()
            .with_parser("dup", &["a"], &[], Arc::new(StubParser(Language::Rust)))
            .with_parser("dup", &["b"], &[], Arc::new(StubParser(Language::Rust)))
            .build();
        assert!(result.is_err());
    }
}
