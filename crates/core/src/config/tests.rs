//! Tests for configuration module

use super::*;
use crate::error::{Error, Result};
use std::io::Write;
use tempfile::NamedTempFile;

fn create_temp_config_file(content: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .map_err(|e| Error::config(format!("Failed to create temp file: {e}")))?;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::config(format!("Failed to write temp file: {e}")))?;
    file.flush()
        .map_err(|e| Error::config(format!("Failed to flush temp file: {e}")))?;
    Ok(file)
}

fn with_env_var<F, T>(key: &str, value: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    std::env::set_var(key, value);
    let result = f();
    std::env::remove_var(key);
    result
}

#[test]
fn test_from_toml_str_valid() {
    let toml = r#"
        [chunker]
        max_chunk_bytes = 2000
        merge_below_bytes = 200

        [embeddings]
        provider = "localapi"
        model = "bge-code"
        embedding_dimension = 768

        [normalizer]
        doc_comment_max_gap_lines = 0
    "#;

    let config = Config::from_toml_str(toml).expect("Failed to parse valid TOML");
    assert_eq!(config.embeddings.provider, "localapi");
    assert_eq!(config.embeddings.embedding_dimension, 768);
    assert_eq!(config.chunker.max_chunk_bytes, 2000);
    assert_eq!(config.normalizer.doc_comment_max_gap_lines, 0);
    // Unset keys in a present section still get defaults
    assert_eq!(config.chunker.min_orphan_doc_bytes, 80);
}

#[test]
fn test_from_toml_str_empty_uses_defaults() {
    let config = Config::from_toml_str("").expect("Failed to parse empty TOML");
    assert_eq!(config.embeddings.provider, "mock");
    assert_eq!(config.chunker.max_chunk_bytes, 1500);
    assert_eq!(config.normalizer.doc_comment_max_gap_lines, 1);
    assert!(config.normalizer.strip_modifiers);
    assert_eq!(config.indexer.max_attempts, 4);
    assert_eq!(config.parser.enabled_languages.len(), 5);
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_toml_str_invalid_syntax() {
    let toml = r#"
        [embeddings
        provider = "localapi"
    "#;

    let result = Config::from_toml_str(toml);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("Failed to parse TOML"));
}

#[test]
fn test_validate_invalid_provider() {
    let toml = r#"
        [embeddings]
        provider = "invalid_provider"
    "#;

    let config = Config::from_toml_str(toml).expect("Failed to parse TOML");
    let result = config.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("Invalid provider"));
}

#[test]
fn test_validate_merge_threshold_above_max() {
    let toml = r#"
        [chunker]
        max_chunk_bytes = 500
        merge_below_bytes = 800
    "#;

    let config = Config::from_toml_str(toml).expect("Failed to parse TOML");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("merge_below_bytes"));
}

#[test]
fn test_validate_zero_workers() {
    let toml = r#"
        [indexer]
        embed_workers = 0
    "#;

    let config = Config::from_toml_str(toml).expect("Failed to parse TOML");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("indexer.embed_workers"));
}

#[test]
fn test_validate_unknown_language() {
    let toml = r#"
        [parser]
        enabled_languages = ["rust", "cobol"]
    "#;

    let config = Config::from_toml_str(toml).expect("Failed to parse TOML");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("cobol"));
}

#[test]
fn test_parser_languages() {
    let config = Config::default();
    let languages = config.parser.languages().expect("default languages parse");
    assert!(languages.contains(&Language::Rust));
    assert!(languages.contains(&Language::TypeScript));
}

#[test]
fn test_from_file() {
    let toml = r#"
        [indexer]
        parse_workers = 8
        max_attempts = 6

        [embeddings]
        texts_per_api_request = 16
    "#;

    let file = create_temp_config_file(toml).expect("Failed to create temp file");
    let config = Config::from_file(file.path()).expect("Failed to load config from file");

    assert_eq!(config.indexer.parse_workers, 8);
    assert_eq!(config.indexer.max_attempts, 6);
    assert_eq!(config.embeddings.texts_per_api_request, 16);
    assert_eq!(config.indexer.index_workers, 2);
}

#[test]
fn test_from_file_missing_path_uses_defaults() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = Config::from_file(&dir.path().join("absent.toml"))
        .expect("Missing file should fall back to defaults");
    assert_eq!(config.chunker.merge_below_bytes, 0);
    assert_eq!(config.chunker.split_overlap_lines, 2);
}

#[test]
fn test_env_override() {
    let toml = r#"
        [chunker]
        max_chunk_bytes = 1000
    "#;

    let file = create_temp_config_file(toml).expect("Failed to create temp file");

    let config = with_env_var("CODEINDEX_CHUNKER__MAX_CHUNK_CHARS", "2500", || {
        Config::from_file(file.path()).expect("Failed to load config")
    });

    assert_eq!(config.chunker.max_chunk_bytes, 2500);
}

#[test]
fn test_embedding_api_key_env() {
    let file = create_temp_config_file("").expect("Failed to create temp file");

    let config = with_env_var("EMBEDDING_API_KEY", "sk-test", || {
        Config::from_file(file.path()).expect("Failed to load config")
    });

    assert_eq!(config.embeddings.api_key.as_deref(), Some("sk-test"));
}

#[test]
fn test_debug_redacts_api_key() {
    let config = EmbeddingsConfig {
        api_key: Some("super-secret".to_string()),
        ..EmbeddingsConfig::default()
    };
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("super-secret"));
    assert!(rendered.contains("***REDACTED***"));
}

#[test]
fn test_global_config_path() {
    let path = global_config_path().expect("home directory available");
    assert!(path.ends_with(".codeindex/config.toml"));
}
