//! `$ref` resolution: scope stack, document store, eager inliner
//!
//! A reference is interpreted against the innermost scope (the base URI
//! most recently pushed), fetched through the configured [`Cache`] when
//! it names a document not yet seen, and narrowed by its JSON-pointer
//! fragment. The store is append-only; scopes must be popped exactly as
//! often as they are pushed, on error paths included, which is why the
//! generator funnels scoped work through a closure.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::Value;
use url::Url;

use crate::cache::Cache;
use crate::error::GenerateError;

/// Scope-aware reference resolver with a document store.
#[derive(Default)]
pub struct RefResolver {
    scopes: Vec<Url>,
    store: HashMap<String, Value>,
    cache: Option<Arc<dyn Cache>>,
}

impl RefResolver {
    /// Resolver with no fetcher: only fragments of already-stored
    /// documents resolve.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<dyn Cache>) -> Self {
        Self {
            scopes: Vec::new(),
            store: HashMap::new(),
            cache: Some(cache),
        }
    }

    pub(crate) fn cache(&self) -> Option<Arc<dyn Cache>> {
        self.cache.clone()
    }

    /// Put a document into the store directly, so fragments of it
    /// resolve without a fetch. The generator registers each root
    /// schema this way; callers may preload documents too.
    pub fn register(&mut self, url: &str, document: &Value) {
        if let Ok(mut parsed) = Url::parse(url) {
            parsed.set_fragment(None);
            self.store.insert(parsed.as_str().to_string(), document.clone());
        }
    }

    /// Make `scope` the base URI for subsequent resolution. Relative
    /// scopes are joined against the current base.
    pub fn push_scope(&mut self, scope: &str) -> Result<(), GenerateError> {
        let absolute = self.join(scope)?;
        self.scopes.push(absolute);
        Ok(())
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Current stack depth; callers assert push/pop pairing with it.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    fn join(&self, reference: &str) -> Result<Url, GenerateError> {
        match self.scopes.last() {
            Some(base) => base.join(reference),
            None => Url::parse(reference),
        }
        .map_err(|e| GenerateError::UnresolvableRef {
            reference: reference.to_string(),
            reason: e.to_string(),
        })
    }

    /// Resolve a `$ref` to the base URI of its document and the node it
    /// points at.
    pub fn resolve(&mut self, reference: &str) -> Result<(String, Value), GenerateError> {
        let absolute = self.join(reference)?;
        let mut document_url = absolute.clone();
        document_url.set_fragment(None);

        let document = self.document(document_url.as_str(), reference)?;
        let node = match absolute.fragment() {
            None | Some("") => document.clone(),
            Some(fragment) => {
                let pointer = percent_decode_str(fragment)
                    .decode_utf8()
                    .map_err(|e| GenerateError::UnresolvableRef {
                        reference: reference.to_string(),
                        reason: format!("fragment is not UTF-8: {e}"),
                    })?
                    .into_owned();
                document
                    .pointer(&pointer)
                    .cloned()
                    .ok_or_else(|| GenerateError::UnresolvableRef {
                        reference: reference.to_string(),
                        reason: format!("no node at {pointer:?} in {document_url}"),
                    })?
            }
        };
        Ok((document_url.as_str().to_string(), node))
    }

    fn document(&mut self, url: &str, reference: &str) -> Result<&Value, GenerateError> {
        if !self.store.contains_key(url) {
            let Some(cache) = &self.cache else {
                return Err(GenerateError::UnresolvableRef {
                    reference: reference.to_string(),
                    reason: format!("{url} is not cached and no fetcher is configured"),
                });
            };
            let bytes = cache
                .resolve(url)
                .map_err(|e| GenerateError::UnresolvableRef {
                    reference: reference.to_string(),
                    reason: e.to_string(),
                })?;
            let document: Value =
                serde_json::from_slice(&bytes).map_err(|e| GenerateError::UnresolvableRef {
                    reference: reference.to_string(),
                    reason: format!("{url} is not valid JSON: {e}"),
                })?;
            self.store.insert(url.to_string(), document);
        }
        Ok(&self.store[url])
    }

    /// Inline every `$ref` in `schema` in place.
    ///
    /// A referencing node is replaced by the dereferenced contents with
    /// `id` recording the document it came from; the walk then descends
    /// into the inlined contents with that document's base URI in
    /// scope, so nested relative references resolve correctly. A
    /// reference reached again while its own expansion is still in
    /// flight is a cycle and fails with `UnresolvableRef`.
    pub fn resolve_references(&mut self, schema: &mut Value) -> Result<(), GenerateError> {
        let mut in_flight = HashSet::new();
        self.inline_node(schema, &mut in_flight)
    }

    fn inline_node(
        &mut self,
        node: &mut Value,
        in_flight: &mut HashSet<String>,
    ) -> Result<(), GenerateError> {
        match node {
            Value::Object(map) => {
                let reference = map.get("$ref").and_then(Value::as_str).map(String::from);
                if let Some(reference) = reference {
                    let absolute = self.join(&reference)?.as_str().to_string();
                    if !in_flight.insert(absolute.clone()) {
                        return Err(GenerateError::UnresolvableRef {
                            reference,
                            reason: format!("reference cycle through {absolute}"),
                        });
                    }
                    let outcome = self.inline_reference(map, &reference, in_flight);
                    in_flight.remove(&absolute);
                    outcome
                } else {
                    let scope = map.get("id").and_then(Value::as_str).map(String::from);
                    match scope {
                        Some(scope) => {
                            self.push_scope(&scope)?;
                            let outcome = self.inline_children(map, in_flight);
                            self.pop_scope();
                            outcome
                        }
                        None => self.inline_children(map, in_flight),
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.inline_node(item, in_flight)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn inline_reference(
        &mut self,
        map: &mut serde_json::Map<String, Value>,
        reference: &str,
        in_flight: &mut HashSet<String>,
    ) -> Result<(), GenerateError> {
        let (base, resolved) = self.resolve(reference)?;
        map.remove("$ref");
        if let Value::Object(resolved) = resolved {
            for (key, value) in resolved {
                map.insert(key, value);
            }
        }
        map.insert("id".to_string(), Value::String(base.clone()));

        self.push_scope(&base)?;
        let outcome = self.inline_children(map, in_flight);
        self.pop_scope();
        outcome
    }

    fn inline_children(
        &mut self,
        map: &mut serde_json::Map<String, Value>,
        in_flight: &mut HashSet<String>,
    ) -> Result<(), GenerateError> {
        for (_, value) in map.iter_mut() {
            self.inline_node(value, in_flight)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use serde_json::json;

    fn resolver_with(documents: &[(&str, Value)]) -> RefResolver {
        let mut cache = MemoryCache::new();
        for (url, document) in documents {
            cache.insert_json(*url, document);
        }
        RefResolver::with_cache(Arc::new(cache))
    }

    #[test]
    fn resolves_whole_documents() {
        let mut resolver = resolver_with(&[(
            "https://schemas.test/person",
            json!({"type": "object", "required": ["name"]}),
        )]);
        let (base, node) = resolver.resolve("https://schemas.test/person").unwrap();
        assert_eq!(base, "https://schemas.test/person");
        assert_eq!(node["required"], json!(["name"]));
    }

    #[test]
    fn resolves_pointer_fragments() {
        let mut resolver = resolver_with(&[(
            "https://schemas.test/defs",
            json!({"definitions": {"id": {"type": "integer"}}}),
        )]);
        let (_, node) = resolver
            .resolve("https://schemas.test/defs#/definitions/id")
            .unwrap();
        assert_eq!(node, json!({"type": "integer"}));
    }

    #[test]
    fn missing_pointer_is_unresolvable() {
        let mut resolver = resolver_with(&[("https://schemas.test/defs", json!({}))]);
        let err = resolver
            .resolve("https://schemas.test/defs#/definitions/nope")
            .unwrap_err();
        assert!(matches!(err, GenerateError::UnresolvableRef { .. }));
    }

    #[test]
    fn relative_references_use_the_scope_stack() {
        let mut resolver = resolver_with(&[
            ("https://schemas.test/v1/a", json!({"$ref": "b"})),
            ("https://schemas.test/v1/b", json!({"type": "boolean"})),
        ]);
        resolver.push_scope("https://schemas.test/v1/a").unwrap();
        let (base, node) = resolver.resolve("b").unwrap();
        assert_eq!(base, "https://schemas.test/v1/b");
        assert_eq!(node["type"], json!("boolean"));
        resolver.pop_scope();
        assert_eq!(resolver.scope_depth(), 0);
    }

    #[test]
    fn registered_documents_resolve_without_a_fetch() {
        let mut resolver = RefResolver::new();
        resolver.register(
            "https://schemas.test/local",
            &json!({"definitions": {"x": {"type": "boolean"}}}),
        );
        let (_, node) = resolver
            .resolve("https://schemas.test/local#/definitions/x")
            .unwrap();
        assert_eq!(node, json!({"type": "boolean"}));
    }

    #[test]
    fn no_fetcher_means_remote_refs_fail() {
        let mut resolver = RefResolver::new();
        let err = resolver.resolve("https://schemas.test/missing").unwrap_err();
        assert!(matches!(err, GenerateError::UnresolvableRef { .. }));
    }

    #[test]
    fn fetches_are_cached_once() {
        // second resolve succeeds even though the cache is gone from
        // under us conceptually: the store answers
        let mut resolver = resolver_with(&[("https://schemas.test/x", json!({"a": 1}))]);
        resolver.resolve("https://schemas.test/x").unwrap();
        let (_, node) = resolver.resolve("https://schemas.test/x#/a").unwrap();
        assert_eq!(node, json!(1));
    }

    #[test]
    fn inliner_replaces_refs_in_place() {
        let mut resolver = resolver_with(&[(
            "https://schemas.test/name",
            json!({"type": "string", "minLength": 1}),
        )]);
        let mut schema = json!({
            "type": "object",
            "properties": {"name": {"$ref": "https://schemas.test/name"}}
        });
        resolver.resolve_references(&mut schema).unwrap();
        assert_eq!(
            schema["properties"]["name"],
            json!({"type": "string", "minLength": 1, "id": "https://schemas.test/name"})
        );
    }

    #[test]
    fn inliner_follows_nested_relative_refs() {
        let mut resolver = resolver_with(&[
            (
                "https://schemas.test/v2/outer",
                json!({"type": "object", "properties": {"inner": {"$ref": "inner"}}}),
            ),
            ("https://schemas.test/v2/inner", json!({"type": "integer"})),
        ]);
        let mut schema = json!({"$ref": "https://schemas.test/v2/outer"});
        resolver.resolve_references(&mut schema).unwrap();
        assert_eq!(schema["properties"]["inner"]["type"], json!("integer"));
        assert_eq!(
            schema["properties"]["inner"]["id"],
            json!("https://schemas.test/v2/inner")
        );
        assert_eq!(resolver.scope_depth(), 0);
    }

    #[test]
    fn inliner_rejects_cycles() {
        let mut resolver = resolver_with(&[
            (
                "https://schemas.test/a",
                json!({"properties": {"b": {"$ref": "https://schemas.test/b"}}}),
            ),
            (
                "https://schemas.test/b",
                json!({"properties": {"a": {"$ref": "https://schemas.test/a"}}}),
            ),
        ]);
        let mut schema = json!({"$ref": "https://schemas.test/a"});
        let err = resolver.resolve_references(&mut schema).unwrap_err();
        assert!(matches!(err, GenerateError::UnresolvableRef { .. }));
        assert_eq!(resolver.scope_depth(), 0);
    }

    #[test]
    fn inliner_allows_shared_references() {
        // the same target referenced from two sibling properties is not
        // a cycle
        let mut resolver = resolver_with(&[("https://schemas.test/id", json!({"type": "string"}))]);
        let mut schema = json!({
            "type": "object",
            "properties": {
                "first": {"$ref": "https://schemas.test/id"},
                "second": {"$ref": "https://schemas.test/id"}
            }
        });
        resolver.resolve_references(&mut schema).unwrap();
        assert_eq!(schema["properties"]["first"]["type"], json!("string"));
        assert_eq!(schema["properties"]["second"]["type"], json!("string"));
    }
}
