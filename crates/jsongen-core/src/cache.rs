//! Pluggable schema fetching
//!
//! The resolver never does I/O itself; it asks a [`Cache`] for the raw
//! bytes behind a URL. The default generator has no cache at all and
//! fails on any reference it has not already seen.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

/// Opaque fetch failure, same shape the `jsonschema` retriever uses.
pub type CacheError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves a URL to raw schema bytes.
pub trait Cache: Send + Sync {
    fn resolve(&self, url: &str) -> Result<Vec<u8>, CacheError>;
}

/// Preloaded in-memory store. No I/O; the workhorse for tests and for
/// fully offline generation.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(url.into(), bytes.into());
    }

    /// Store a schema document under a URL.
    pub fn insert_json(&mut self, url: impl Into<String>, document: &Value) {
        self.entries.insert(url.into(), document.to_string().into_bytes());
    }
}

impl Cache for MemoryCache {
    fn resolve(&self, url: &str) -> Result<Vec<u8>, CacheError> {
        self.entries
            .get(url)
            .cloned()
            .ok_or_else(|| format!("{url} is not cached").into())
    }
}

/// Maps the last path segment of a URL onto files in a local directory.
///
/// `https://schemas.example.com/v1/person` resolves to `<root>/person`,
/// falling back to `<root>/person.json`.
#[derive(Debug, Clone)]
pub struct DirCache {
    root: PathBuf,
}

impl DirCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Cache for DirCache {
    fn resolve(&self, url: &str) -> Result<Vec<u8>, CacheError> {
        let name = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
        let exact = self.root.join(name);
        let path = if exact.exists() {
            exact
        } else {
            self.root.join(format!("{name}.json"))
        };
        std::fs::read(&path).map_err(|e| format!("cannot read {}: {e}", path.display()).into())
    }
}

/// Bridges a [`Cache`] into the validator, so self-validation fetches
/// remote references through the same source the generator used.
pub(crate) struct CacheRetriever {
    cache: Arc<dyn Cache>,
}

impl CacheRetriever {
    pub(crate) fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

impl jsonschema::Retrieve for CacheRetriever {
    fn retrieve(&self, uri: &jsonschema::Uri<String>) -> Result<Value, CacheError> {
        let bytes = self.cache.resolve(uri.as_str())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
