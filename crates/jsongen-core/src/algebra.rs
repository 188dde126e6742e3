//! Pure operations over schema fragments
//!
//! The generator folds combinators into one effective schema with three
//! operations: [`merge`] (conjunction of keyword sets), [`difference`]
//! (what a fragment pins beyond another), and [`subtract`] (strip
//! pinned fields, `required` specially). All three run on deep-copied
//! working nodes; callers clone before handing schemas in.
//!
//! `serde_json::Value` is `Eq` but not `Hash`, so list operations use
//! linear scans.

use serde_json::{Map, Value};

use crate::error::GenerateError;

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

fn mismatch(key: &str, expected: &'static str, found: &Value) -> GenerateError {
    GenerateError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: kind(found),
    }
}

/// Fold `updates` into `target`.
///
/// Maps merge recursively, lists take the order-insensitive union, keys
/// containing `min`/`max` tighten toward the narrower bound, and other
/// scalars keep the first value written.
pub fn merge(
    target: &mut Map<String, Value>,
    updates: &Map<String, Value>,
) -> Result<(), GenerateError> {
    for (key, update) in updates {
        match update {
            Value::Object(sub) => {
                let entry = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                match entry {
                    Value::Object(existing) => merge(existing, sub)?,
                    other => return Err(mismatch(key, "object", other)),
                }
            }
            Value::Array(items) => {
                let entry = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match entry {
                    Value::Array(existing) => {
                        for item in items {
                            if !existing.contains(item) {
                                existing.push(item.clone());
                            }
                        }
                    }
                    other => return Err(mismatch(key, "array", other)),
                }
            }
            scalar if key.contains("min") || key.contains("max") => {
                let update_bound = scalar
                    .as_f64()
                    .ok_or_else(|| mismatch(key, "number", scalar))?;
                match target.get(key) {
                    None => {
                        target.insert(key.clone(), scalar.clone());
                    }
                    Some(existing) => {
                        let existing_bound = existing
                            .as_f64()
                            .ok_or_else(|| mismatch(key, "number", existing))?;
                        let tightens = if key.contains("min") {
                            update_bound > existing_bound
                        } else {
                            update_bound < existing_bound
                        };
                        if tightens {
                            target.insert(key.clone(), scalar.clone());
                        }
                    }
                }
            }
            scalar => {
                if !target.contains_key(key) {
                    target.insert(key.clone(), scalar.clone());
                }
            }
        }
    }
    Ok(())
}

/// Reduce `source` to what it pins beyond `chosen`.
///
/// Keys absent from `chosen` survive untouched; shared maps recurse,
/// shared lists keep only items `chosen` lacks, shared scalars drop.
pub fn difference(
    source: &mut Map<String, Value>,
    chosen: &Map<String, Value>,
) -> Result<(), GenerateError> {
    let keys: Vec<String> = source.keys().cloned().collect();
    for key in keys {
        let Some(chosen_value) = chosen.get(&key) else {
            continue;
        };
        let Some(source_value) = source.get_mut(&key) else {
            continue;
        };
        match source_value {
            Value::Object(sub) => match chosen_value {
                Value::Object(chosen_sub) => difference(sub, chosen_sub)?,
                other => return Err(mismatch(&key, "object", other)),
            },
            Value::Array(items) => match chosen_value {
                Value::Array(chosen_items) => items.retain(|item| !chosen_items.contains(item)),
                other => return Err(mismatch(&key, "array", other)),
            },
            _ => {
                source.remove(&key);
            }
        }
    }
    Ok(())
}

/// Remove the fields named by `removals` from `target`.
///
/// `required` gets special handling: the named properties disappear from
/// `target.properties` and from `target.required`. Scalar removal values
/// are ignored.
pub fn subtract(
    target: &mut Map<String, Value>,
    removals: &Map<String, Value>,
) -> Result<(), GenerateError> {
    for (key, removal) in removals {
        if !target.contains_key(key) {
            continue;
        }
        if key == "required" {
            let Value::Array(names) = removal else {
                return Err(mismatch(key, "array", removal));
            };
            if let Some(Value::Object(properties)) = target.get_mut("properties") {
                for name in names {
                    if let Some(name) = name.as_str() {
                        properties.remove(name);
                    }
                }
            }
            if let Some(Value::Array(required)) = target.get_mut("required") {
                required.retain(|name| !names.contains(name));
            }
            continue;
        }
        match removal {
            Value::Object(sub) => match target.get_mut(key) {
                Some(Value::Object(existing)) => subtract(existing, sub)?,
                Some(other) => return Err(mismatch(key, "object", other)),
                None => {}
            },
            Value::Array(items) => match target.get_mut(key) {
                Some(Value::Array(existing)) => {
                    existing.retain(|item| !items.contains(item));
                }
                Some(other) => return Err(mismatch(key, "array", other)),
                None => {}
            },
            _ => {}
        }
    }
    Ok(())
}
