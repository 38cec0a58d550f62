//! Configuration loading from files and environment variables

use crate::error::{Error, Result};
use config::{Config as ConfigLib, ConfigBuilder as LibConfigBuilder, Environment, File};
use std::path::Path;

use super::{global_config_path, Config};

/// Helper to set a config override with consistent error mapping
fn set_config_override<T: Into<config::Value>>(
    builder: LibConfigBuilder<config::builder::DefaultState>,
    key: &str,
    value: T,
) -> Result<LibConfigBuilder<config::builder::DefaultState>> {
    builder
        .set_override(key, value)
        .map_err(|e| Error::config(format!("Failed to set {key}: {e}")))
}

impl Config {
    /// Loads configuration from a TOML file with environment variable overrides
    ///
    /// Environment variables are prefixed with `CODEINDEX_` and use double underscores
    /// for nested values. For example:
    /// - `CODEINDEX_EMBEDDINGS__PROVIDER=localapi`
    /// - `CODEINDEX_CHUNKER__MAX_CHUNK_BYTES=2000`
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut builder = ConfigLib::builder();

        // Add the config file if it exists
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        // Add environment variables with CODEINDEX_ prefix
        builder = builder.add_source(
            Environment::with_prefix("CODEINDEX")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("parser.enabled_languages"),
        );

        // Conventional API key variable shared with other embedding clients
        if let Ok(api_key) = std::env::var("EMBEDDING_API_KEY") {
            builder = set_config_override(builder, "embeddings.api_key", api_key)?;
        }

        let config = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build config: {e}")))?;

        let config: Config = config
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize config: {e}")))?;

        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Creates a config from a TOML string (useful for testing)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from a single file
    ///
    /// Precedence (lowest to highest):
    /// 1. Hardcoded defaults
    /// 2. Config file (~/.codeindex/config.toml or a custom path)
    /// 3. Environment variables (CODEINDEX_*)
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => global_config_path()?,
        };
        Self::from_file(&path)
    }
}
