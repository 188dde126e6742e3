//! Recursive schema interpreter
//!
//! `generate` compiles the schema under Draft-04 (rejecting malformed
//! input), walks it with `produce`, and validates the emitted document
//! against the same compiled schema before returning it.
//!
//! Combinators are flattened into a working copy before dispatch:
//! `allOf` branches all merge in, one `anyOf` branch merges in, and one
//! `oneOf` branch merges in followed by a difference-and-subtract pass
//! that strips what the non-chosen branches pin. The `oneOf` step is a
//! heuristic, not a decision procedure: it lowers the odds of
//! satisfying a second branch but cannot rule it out.

use std::collections::BTreeMap;

use jsonschema::{Draft, Validator};
use serde_json::{Map, Value};
use url::Url;

use crate::algebra::{difference, merge, subtract};
use crate::cache::CacheRetriever;
use crate::error::GenerateError;
use crate::faker::{Faker, number_value};
use crate::resolver::RefResolver;

const UNBOUND_MIN_ITEMS: u64 = 1;
const UNBOUND_MAX_ITEMS: u64 = 16;

const UNBOUND_MIN_INT: f64 = -32_000_000.0;
const UNBOUND_MAX_INT: f64 = 32_000_000.0;

const UNBOUND_MIN_STRING: u64 = 1;
const UNBOUND_MAX_STRING: u64 = 128;

const UNBOUND_MIN_OBJECTS: u64 = 1;
const UNBOUND_MAX_OBJECTS: u64 = 16;

/// Pattern-generated property keys are clipped to this length.
const KEY_LEN: usize = 64;

/// Consecutive duplicates tolerated before unique generation gives up.
const RETRY_BUDGET: u32 = 3;

/// Base URI for root schemas that carry no `id`, so same-document
/// fragment references still resolve.
const DEFAULT_BASE: &str = "jsongen://root/";

fn default_formats() -> BTreeMap<String, String> {
    [
        ("date-time", "iso8601"),
        ("date", "date"),
        ("time", "time"),
        ("email", "email"),
    ]
    .into_iter()
    .map(|(format, provider)| (format.to_string(), provider.to_string()))
    .collect()
}

/// Generates random JSON documents conforming to a Draft-04 schema.
pub struct JsonGenerator {
    faker: Faker,
    resolver: RefResolver,
    formats: BTreeMap<String, String>,
    path: Vec<String>,
}

impl Default for JsonGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonGenerator {
    pub fn new() -> Self {
        Self::with_resolver(RefResolver::new())
    }

    /// Generator resolving `$ref`s through `resolver`.
    pub fn with_resolver(resolver: RefResolver) -> Self {
        Self {
            faker: Faker::new(),
            resolver,
            formats: default_formats(),
            path: Vec::new(),
        }
    }

    /// Reseed the random stream for reproducible output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.faker = Faker::seeded(seed);
        self
    }

    /// Replace the `format` → provider mapping. Every named provider
    /// must exist.
    pub fn with_formats(
        mut self,
        formats: BTreeMap<String, String>,
    ) -> Result<Self, GenerateError> {
        for provider in formats.values() {
            if !Faker::has_provider(provider) {
                return Err(GenerateError::Config(format!(
                    "{provider:?} is not a faker provider"
                )));
            }
        }
        self.formats = formats;
        Ok(self)
    }

    /// Inline every `$ref` in `schema` through this generator's
    /// resolver.
    pub fn resolve_references(&mut self, schema: &mut Value) -> Result<(), GenerateError> {
        self.resolver.resolve_references(schema)
    }

    pub(crate) fn pick(&mut self, len: usize) -> usize {
        self.faker.choice_index(len)
    }

    /// Generate one document conforming to `schema`.
    pub fn generate(&mut self, schema: &Value) -> Result<Value, GenerateError> {
        let validator = self.compile(schema)?;
        self.path.clear();
        let base = root_base(schema);
        self.resolver.register(&base, schema);
        let document = self.scoped(&base, |this| this.produce(schema))?;
        let errors: Vec<String> = validator
            .iter_errors(&document)
            .take(3)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(GenerateError::OutputInvalid(errors.join("; ")));
        }
        Ok(document)
    }

    fn compile(&self, schema: &Value) -> Result<Validator, GenerateError> {
        let options = jsonschema::options().with_draft(Draft::Draft4);
        let options = match self.resolver.cache() {
            Some(cache) => options.with_retriever(CacheRetriever::new(cache)),
            None => options,
        };
        options
            .build(schema)
            .map_err(|e| GenerateError::SchemaInvalid(e.to_string()))
    }

    /// Recursive entry point: scope handling, `$ref`, combinators,
    /// type dispatch.
    fn produce(&mut self, schema: &Value) -> Result<Value, GenerateError> {
        match schema.get("id").and_then(Value::as_str) {
            Some(scope) => {
                let scope = scope.to_string();
                self.scoped(&scope, |this| this.produce_node(schema))
            }
            None => self.produce_node(schema),
        }
    }

    /// Run `work` with `scope` pushed; the pop happens on success and
    /// failure alike.
    fn scoped<T>(
        &mut self,
        scope: &str,
        work: impl FnOnce(&mut Self) -> Result<T, GenerateError>,
    ) -> Result<T, GenerateError> {
        self.resolver.push_scope(scope)?;
        let outcome = work(self);
        self.resolver.pop_scope();
        outcome
    }

    fn produce_node(&mut self, schema: &Value) -> Result<Value, GenerateError> {
        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            let reference = reference.to_string();
            return self.follow_ref(&reference);
        }

        let Value::Object(node) = schema else {
            return Err(GenerateError::SchemaInvalid(format!(
                "schema node must be an object, got {schema}"
            )));
        };
        let mut work = node.clone();
        self.flatten_combinators(&mut work)?;

        let json_type = match work.get("type") {
            None => "object",
            Some(Value::String(name)) => name.as_str(),
            Some(other) => {
                return Err(GenerateError::UnsupportedKeyword(format!(
                    "type {other} at /{}",
                    self.path.join("/")
                )));
            }
        };
        match json_type {
            "object" => self.object(&work),
            "array" => self.array(&work),
            "integer" => self.integer(&work),
            "number" => self.number(&work),
            "string" => self.text(&work),
            "boolean" => self.boolean(&work),
            other => Err(GenerateError::UnsupportedKeyword(format!(
                "type {other:?} at /{}",
                self.path.join("/")
            ))),
        }
    }

    fn follow_ref(&mut self, reference: &str) -> Result<Value, GenerateError> {
        let (base, resolved) = self.resolver.resolve(reference)?;
        self.scoped(&base, |this| this.produce(&resolved))
    }

    /// Fold `allOf`, one `anyOf` branch, and one `oneOf` branch into
    /// `work`; for `oneOf`, strip what the non-chosen branches pin.
    fn flatten_combinators(&mut self, work: &mut Map<String, Value>) -> Result<(), GenerateError> {
        if let Some(Value::Array(branches)) = work.get("allOf") {
            let branches = branches.clone();
            for branch in &branches {
                merge(work, as_fragment("allOf", branch)?)?;
            }
        }

        if let Some(Value::Array(branches)) = work.get("anyOf") {
            let branches = branches.clone();
            if !branches.is_empty() {
                let pick = self.faker.choice_index(branches.len());
                merge(work, as_fragment("anyOf", &branches[pick])?)?;
            }
        }

        if let Some(Value::Array(branches)) = work.get("oneOf") {
            let branches = branches.clone();
            if !branches.is_empty() {
                let pick = self.faker.choice_index(branches.len());
                let chosen = as_fragment("oneOf", &branches[pick])?;
                merge(work, chosen)?;

                let mut removal = Map::new();
                for (index, branch) in branches.iter().enumerate() {
                    if index == pick {
                        continue;
                    }
                    let mut unshared = as_fragment("oneOf", branch)?.clone();
                    difference(&mut unshared, chosen)?;
                    merge(&mut removal, &unshared)?;
                }
                subtract(work, &removal)?;
            }
        }
        Ok(())
    }

    /// `fake` > `const` > `enum`; `None` means no shortcut fired.
    fn common(&mut self, schema: &Map<String, Value>) -> Result<Option<Value>, GenerateError> {
        if let Some(provider) = schema.get("fake").and_then(Value::as_str) {
            let provider = provider.to_string();
            return self.faker.invoke(&provider).map(Some);
        }
        if let Some(constant) = schema.get("const") {
            return Ok(Some(constant.clone()));
        }
        if let Some(Value::Array(choices)) = schema.get("enum") {
            if !choices.is_empty() {
                let pick = self.faker.choice_index(choices.len());
                return Ok(Some(choices[pick].clone()));
            }
        }
        Ok(None)
    }

    fn object(&mut self, schema: &Map<String, Value>) -> Result<Value, GenerateError> {
        if let Some(value) = self.common(schema)? {
            return Ok(value);
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let mut remaining: Vec<String> = properties
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        let required: Vec<String> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let mut out = Map::new();
        for name in &required {
            let value = match properties.and_then(|p| p.get(name)) {
                Some(subschema) => self.produce_member(name, subschema)?,
                // required without a matching property schema: any
                // value satisfies it
                None => self.faker.any_value(),
            };
            out.insert(name.clone(), value);
            remaining.retain(|p| p != name);
        }

        let hi = uint(schema, "maxProperties").unwrap_or(UNBOUND_MAX_OBJECTS);
        let lo = uint(schema, "minProperties").unwrap_or(UNBOUND_MIN_OBJECTS);
        let target = if lo >= hi {
            lo as usize
        } else {
            self.faker.random_int(lo as i64, hi as i64 - 1) as usize
        };

        if out.len() < target {
            self.fill_object(schema, &mut out, &mut remaining, target)?;
        }
        Ok(Value::Object(out))
    }

    /// Grow `out` to `target` entries from whatever candidate sources
    /// the schema offers: remaining declared properties, pattern
    /// properties, fabricated additional properties.
    fn fill_object(
        &mut self,
        schema: &Map<String, Value>,
        out: &mut Map<String, Value>,
        remaining: &mut Vec<String>,
        target: usize,
    ) -> Result<(), GenerateError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Source {
            Declared,
            Pattern,
            Additional,
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let pattern_properties = schema.get("patternProperties").and_then(Value::as_object);
        // JSON Schema regexes treat '.' literally; escape before
        // handing the pattern to the expander
        let patterns: Vec<(String, String)> = pattern_properties
            .map(|pp| {
                pp.keys()
                    .map(|pattern| (pattern.clone(), escape_literal_dots(pattern)))
                    .collect()
            })
            .unwrap_or_default();

        let mut sources = Vec::new();
        if !remaining.is_empty() {
            sources.push(Source::Declared);
        }
        if !patterns.is_empty() {
            sources.push(Source::Pattern);
        }
        if truthy(schema.get("additionalProperties")) {
            sources.push(Source::Additional);
        }

        while out.len() < target && !sources.is_empty() {
            match sources[self.faker.choice_index(sources.len())] {
                Source::Declared => {
                    let name = remaining.remove(self.faker.choice_index(remaining.len()));
                    if let Some(subschema) = properties.and_then(|p| p.get(&name)) {
                        let value = self.produce_member(&name, subschema)?;
                        out.insert(name, value);
                    }
                    if remaining.is_empty() {
                        sources.retain(|s| *s != Source::Declared);
                    }
                }
                Source::Pattern => {
                    let (pattern, escaped) = &patterns[self.faker.choice_index(patterns.len())];
                    let key: String = self.faker.pattern(escaped)?.chars().take(KEY_LEN).collect();
                    if let Some(subschema) = pattern_properties.and_then(|pp| pp.get(pattern)) {
                        let value = self.produce_member(&key, subschema)?;
                        out.insert(key, value);
                    }
                }
                Source::Additional => {
                    let key = self.faker.uuid4();
                    let value = self.faker.any_value();
                    out.insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn produce_member(&mut self, name: &str, subschema: &Value) -> Result<Value, GenerateError> {
        self.path.push(name.to_string());
        let value = self.produce(subschema);
        self.path.pop();
        value
    }

    fn array(&mut self, schema: &Map<String, Value>) -> Result<Value, GenerateError> {
        if let Some(provider) = schema.get("fake").and_then(Value::as_str) {
            let provider = provider.to_string();
            return self.faker.invoke(&provider);
        }

        let lo = uint(schema, "minItems").unwrap_or(UNBOUND_MIN_ITEMS);
        let hi = uint(schema, "maxItems").unwrap_or(lo + UNBOUND_MAX_ITEMS);
        let target = if lo >= hi {
            lo as usize
        } else {
            self.faker.random_int(lo as i64, hi as i64 - 1) as usize
        };
        let unique = schema
            .get("uniqueItems")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let choices = schema.get("enum").and_then(Value::as_array).cloned();

        let mut out: Vec<Value> = match schema.get("const") {
            Some(Value::Array(seed)) => seed.clone(),
            _ => Vec::new(),
        };

        match schema.get("items") {
            Some(items @ Value::Object(_)) => {
                if let Some(contains) = schema.get("contains") {
                    out.push(self.produce(contains)?);
                }
                if unique {
                    self.unique_items(&mut out, items, target, choices.as_deref())?;
                } else {
                    self.simple_items(&mut out, items, target, choices.as_deref())?;
                }
            }
            Some(Value::Array(positional)) => {
                // `contains` is ignored in tuple mode
                let positional = positional.clone();
                let additional = schema
                    .get("additionalItems")
                    .filter(|extra| extra.is_object())
                    .cloned();
                if unique {
                    let mut index = 0;
                    let mut retry = 0;
                    while index < positional.len() && retry < RETRY_BUDGET {
                        let item = self.produce(&positional[index])?;
                        retry += 1;
                        if !out.contains(&item) {
                            out.push(item);
                            index += 1;
                            retry = 0;
                        }
                    }
                    if let Some(extra) = &additional {
                        self.unique_items(&mut out, extra, target, choices.as_deref())?;
                    }
                } else {
                    for item in &positional {
                        let value = self.produce(item)?;
                        out.push(value);
                    }
                    if let Some(extra) = &additional {
                        self.simple_items(&mut out, extra, target, choices.as_deref())?;
                    }
                }
            }
            _ => {}
        }
        Ok(Value::Array(out))
    }

    fn simple_items(
        &mut self,
        out: &mut Vec<Value>,
        items: &Value,
        target: usize,
        choices: Option<&[Value]>,
    ) -> Result<(), GenerateError> {
        match choices {
            Some(choices) if !choices.is_empty() => {
                while out.len() < target {
                    out.push(choices[self.faker.choice_index(choices.len())].clone());
                }
            }
            Some(_) => {}
            None => {
                while out.len() < target {
                    let item = self.produce(items)?;
                    out.push(item);
                }
            }
        }
        Ok(())
    }

    fn unique_items(
        &mut self,
        out: &mut Vec<Value>,
        items: &Value,
        target: usize,
        choices: Option<&[Value]>,
    ) -> Result<(), GenerateError> {
        match choices {
            Some(choices) => {
                let mut shuffled = choices.to_vec();
                self.faker.shuffle(&mut shuffled);
                for choice in shuffled {
                    if out.len() >= target {
                        break;
                    }
                    out.push(choice);
                }
            }
            None => {
                // bounded retries keep small value domains from looping
                // forever
                let mut retry = RETRY_BUDGET;
                while out.len() < target && retry > 0 {
                    retry -= 1;
                    let item = self.produce(items)?;
                    if !out.contains(&item) {
                        out.push(item);
                        retry = RETRY_BUDGET;
                    }
                }
            }
        }
        Ok(())
    }

    fn integer(&mut self, schema: &Map<String, Value>) -> Result<Value, GenerateError> {
        if let Some(value) = self.common(schema)? {
            return Ok(value);
        }
        let (lo, hi) = bounds(schema, 1.0);
        if lo == hi {
            return Ok(number_value(lo));
        }
        if let Some(step) = multiple_of(schema)? {
            let factor = self
                .faker
                .random_int((lo / step).ceil() as i64, (hi / step).floor() as i64);
            return Ok(number_value(factor as f64 * step));
        }
        Ok(Value::Number(
            self.faker.random_int(lo.ceil() as i64, hi.floor() as i64).into(),
        ))
    }

    fn number(&mut self, schema: &Map<String, Value>) -> Result<Value, GenerateError> {
        if let Some(value) = self.common(schema)? {
            return Ok(value);
        }
        let (lo, hi) = bounds(schema, 1e-12);
        if lo == hi {
            return Ok(number_value(lo));
        }
        if let Some(step) = multiple_of(schema)? {
            let factor = self
                .faker
                .random_int((lo / step).ceil() as i64, (hi / step).floor() as i64);
            return Ok(number_value(round12(factor as f64 * step)));
        }
        Ok(number_value(self.faker.uniform(lo, hi)))
    }

    fn text(&mut self, schema: &Map<String, Value>) -> Result<Value, GenerateError> {
        if let Some(value) = self.common(schema)? {
            return Ok(value);
        }
        if let Some(format) = schema.get("format").and_then(Value::as_str) {
            if let Some(provider) = self.formats.get(format) {
                let provider = provider.clone();
                return self.faker.invoke(&provider);
            }
            // unknown formats fall through to pattern/length logic
        }
        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            let pattern = pattern.to_string();
            return self.faker.pattern(&pattern).map(Value::String);
        }
        let lo = uint(schema, "minLength").unwrap_or(UNBOUND_MIN_STRING) as usize;
        let hi = uint(schema, "maxLength").unwrap_or(UNBOUND_MAX_STRING) as usize;
        Ok(Value::String(self.faker.string(lo, hi)))
    }

    fn boolean(&mut self, schema: &Map<String, Value>) -> Result<Value, GenerateError> {
        if let Some(value) = self.common(schema)? {
            return Ok(value);
        }
        Ok(Value::Bool(self.faker.boolean()))
    }
}

fn as_fragment<'a>(
    combinator: &str,
    branch: &'a Value,
) -> Result<&'a Map<String, Value>, GenerateError> {
    branch.as_object().ok_or(GenerateError::TypeMismatch {
        key: combinator.to_string(),
        expected: "object",
        found: "scalar",
    })
}

fn uint(schema: &Map<String, Value>, key: &str) -> Option<u64> {
    schema.get(key).and_then(Value::as_u64)
}

/// The schema's own `id` when it is an absolute URI, or the synthetic
/// root base.
fn root_base(schema: &Value) -> String {
    schema
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| Url::parse(id).is_ok())
        .map(String::from)
        .unwrap_or_else(|| DEFAULT_BASE.to_string())
}

/// Effective inclusive bounds: explicit limits, exclusive limits pulled
/// in by `epsilon`, or the unbound defaults.
fn bounds(schema: &Map<String, Value>, epsilon: f64) -> (f64, f64) {
    let hi = schema.get("maximum").and_then(Value::as_f64).unwrap_or_else(|| {
        schema
            .get("exclusiveMaximum")
            .and_then(Value::as_f64)
            .unwrap_or(UNBOUND_MAX_INT)
            - epsilon
    });
    let lo = schema.get("minimum").and_then(Value::as_f64).unwrap_or_else(|| {
        schema
            .get("exclusiveMinimum")
            .and_then(Value::as_f64)
            .unwrap_or(UNBOUND_MIN_INT)
            + epsilon
    });
    (lo, hi)
}

fn multiple_of(schema: &Map<String, Value>) -> Result<Option<f64>, GenerateError> {
    match schema.get("multipleOf").and_then(Value::as_f64) {
        Some(step) if step <= 0.0 => Err(GenerateError::Config(format!(
            "multipleOf must be > 0, got {step}"
        ))),
        Some(step) => Ok(Some(step)),
        None => Ok(None),
    }
}

fn round12(value: f64) -> f64 {
    (value * 1e12).round() / 1e12
}

/// Whether `additionalProperties` enables fabrication: `false`, `null`,
/// and empty maps do not.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Escape `.` where it is not already escaped; other metacharacters
/// pass through untouched.
fn escape_literal_dots(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut escaped = false;
    for c in pattern.chars() {
        match c {
            '\\' => {
                escaped = !escaped;
                out.push(c);
            }
            '.' => {
                if !escaped {
                    out.push('\\');
                }
                out.push(c);
                escaped = false;
            }
            _ => {
                escaped = false;
                out.push(c);
            }
        }
    }
    out
}
