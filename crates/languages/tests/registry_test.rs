//! Parser resolution over the compiled-in languages

use codeindex_core::config::ParserConfig;
use codeindex_core::Language;
use codeindex_languages::{ParserRegistry, Resolution};
use pretty_assertions::assert_eq;
use std::path::Path;

fn resolve(registry: &ParserRegistry, path: &str, source: &str) -> Option<String> {
    registry
        .resolve(Path::new(path), source.as_bytes())
        .handle()
        .map(|h| h.name().to_string())
}

#[test]
fn test_default_registry_has_every_language() {
    let registry = ParserRegistry::from_config(&ParserConfig::default()).expect("builds");
    assert_eq!(
        registry.names(),
        vec!["go", "javascript", "python", "rust", "tsx", "typescript"]
    );
}

#[test]
fn test_resolution_by_extension() {
    let registry = ParserRegistry::from_config(&ParserConfig::default()).expect("builds");

    assert_eq!(resolve(&registry, "a/lib.rs", "").as_deref(), Some("rust"));
    assert_eq!(resolve(&registry, "a/app.PY", "").as_deref(), Some("python"));
    assert_eq!(resolve(&registry, "a/b.mjs", "").as_deref(), Some("javascript"));
    assert_eq!(resolve(&registry, "a/c.ts", "").as_deref(), Some("typescript"));
    assert_eq!(resolve(&registry, "a/d.tsx", "").as_deref(), Some("tsx"));
    assert_eq!(resolve(&registry, "a/main.go", "").as_deref(), Some("go"));
}

#[test]
fn test_resolution_by_shebang() {
    let registry = ParserRegistry::from_config(&ParserConfig::default()).expect("builds");

    let script = "#!/usr/bin/env python3\nprint('hi')\n";
    assert_eq!(resolve(&registry, "bin/tool", script).as_deref(), Some("python"));

    let handle = registry.resolve(Path::new("bin/tool"), script.as_bytes());
    assert_eq!(handle.handle().map(|h| h.language()), Some(Language::Python));
}

#[test]
fn test_unknown_files_are_unsupported() {
    let registry = ParserRegistry::from_config(&ParserConfig::default()).expect("builds");

    assert!(matches!(
        registry.resolve(Path::new("README.md"), b"Some prose about the project."),
        Resolution::Unsupported
    ));
}

#[test]
fn test_enabled_languages_limit_registry() {
    let config = ParserConfig {
        enabled_languages: vec!["rust".to_string()],
        ..ParserConfig::default()
    };
    let registry = ParserRegistry::from_config(&config).expect("builds");

    assert_eq!(registry.names(), vec!["rust"]);
    assert!(matches!(
        registry.resolve(Path::new("x.py"), b"def f():\n    pass\n"),
        Resolution::Unsupported
    ));
}

#[test]
fn test_unknown_language_rejected() {
    let config = ParserConfig {
        enabled_languages: vec!["cobol".to_string()],
        ..ParserConfig::default()
    };
    assert!(ParserRegistry::from_config(&config).is_err());
}
