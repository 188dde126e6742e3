//! Project configuration for the jsongen CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration loaded from `.jsongen.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Schema URLs to load into the catalog
    #[serde(default)]
    pub urls: Vec<String>,

    /// Seed for reproducible output (omit for fresh entropy)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Resolve schema URLs against files in this directory instead of
    /// fetching over HTTP
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,

    /// Overrides for the `format` → provider mapping
    #[serde(default)]
    pub formats: BTreeMap<String, String>,
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from default location (.jsongen.toml)
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".jsongen.toml", ".jsongen.json", "jsongen.toml"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        // No config file, return default
        Ok(Self::default())
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# jsongen configuration

# Schema URLs to load into the catalog. The last path segment names
# the schema.
urls = [
    "https://schemas.example.com/v1/person.json",
    "https://schemas.example.com/v1/order.json",
]

# Seed for reproducible output (omit for fresh entropy on every run)
# seed = 42

# Resolve schema URLs against *.json files in a local directory
# instead of fetching over HTTP
# schema_dir = "schemas/"

# Override which provider backs a string format
# [formats]
# date-time = "iso8601"
# email = "email"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}
