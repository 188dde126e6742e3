//! Named-schema façade
//!
//! A catalog is built from a list of schema URLs. Each URL becomes a
//! stub `{"$ref": url, "id": url}` keyed by its last path segment;
//! generation inlines the stub in place on first use, feeds it to the
//! generator, and returns `{name: document}` serialized to a string.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::cache::Cache;
use crate::error::GenerateError;
use crate::generator::JsonGenerator;
use crate::resolver::RefResolver;

/// A set of named schemas and the generator that fabricates documents
/// for them.
pub struct SchemaCatalog {
    schemas: BTreeMap<String, Value>,
    generator: JsonGenerator,
}

impl SchemaCatalog {
    /// Catalog over `urls`, with no fetcher: useful only when every
    /// reference is already local.
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schemas = BTreeMap::new();
        for url in urls {
            let url: String = url.into();
            let name = url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or(url.as_str())
                .to_string();
            schemas.insert(name, json!({"$ref": url, "id": url}));
        }
        Self {
            schemas,
            generator: JsonGenerator::new(),
        }
    }

    /// Fetch schema documents through `cache`.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.generator = JsonGenerator::with_resolver(RefResolver::with_cache(cache));
        self
    }

    /// Reseed for reproducible output. Apply after
    /// [`with_cache`](Self::with_cache).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.generator = self.generator.with_seed(seed);
        self
    }

    /// Replace the `format` → provider mapping; every named provider
    /// must exist. Apply after [`with_cache`](Self::with_cache).
    pub fn with_formats(
        mut self,
        formats: BTreeMap<String, String>,
    ) -> Result<Self, GenerateError> {
        self.generator = self.generator.with_formats(formats)?;
        Ok(self)
    }

    /// Known schema names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    /// Stub or inlined schema stored under `name`.
    pub fn schema(&self, name: &str) -> Option<&Value> {
        self.schemas.get(name)
    }

    /// Generate a document for `name`, or for a randomly chosen schema
    /// when `name` is `None`. Returns `{name: document}` serialized.
    pub fn generate(&mut self, name: Option<&str>) -> Result<String, GenerateError> {
        let name = match name {
            Some(name) => {
                if !self.schemas.contains_key(name) {
                    return Err(GenerateError::Config(format!("unknown schema {name:?}")));
                }
                name.to_string()
            }
            None => {
                if self.schemas.is_empty() {
                    return Err(GenerateError::Config("the catalog is empty".to_string()));
                }
                let pick = self.generator.pick(self.schemas.len());
                self.schemas
                    .keys()
                    .nth(pick)
                    .map(String::clone)
                    .unwrap_or_default()
            }
        };

        let schema = self
            .schemas
            .get_mut(&name)
            .ok_or_else(|| GenerateError::Config(format!("unknown schema {name:?}")))?;
        self.generator.resolve_references(schema)?;
        let document = self.generator.generate(schema)?;

        let mut wrapper = Map::new();
        wrapper.insert(name, document);
        Ok(serde_json::to_string(&Value::Object(wrapper))
            .expect("document serialization should not fail"))
    }
}
