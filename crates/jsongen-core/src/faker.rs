//! Random primitive provider backing `fake`, `format`, and fabricated values
//!
//! Every provider draws from one seeded `SmallRng`, so a fixed seed
//! reproduces the full output stream. Pattern expansion re-seeds a
//! `ChaCha8Rng` from that stream per call, which keeps the expander's
//! variable-length consumption from shifting unrelated draws.

use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};

use crate::error::GenerateError;

const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Upper bound on `{n,}`-style repetitions during pattern expansion.
const MAX_PATTERN_REPEAT: u32 = 100;

/// Random timestamps fall in `[1970-01-01, 2100-01-01)`.
const MAX_EPOCH: i64 = 4_102_444_800;

/// Provider names accepted by [`Faker::invoke`] and the `formats` map.
const PROVIDERS: &[&str] = &[
    "iso8601", "date", "time", "email", "uri", "uuid4", "pybool", "pyint", "pyfloat", "pystr",
    "jsondict", "jsonlist",
];

/// Weighted pool for composite values; a name listed more than once is
/// proportionally more likely to be drawn.
const DEFAULT_VALUE_TYPES: &[&str] = &[
    "pystr", "pystr", "pystr", "pystr", "pyfloat", "pyfloat", "pyint", "pyint", "iso8601", "uri",
    "email", "pybool",
];

/// Pool used when fabricating a value with no schema at all
/// (`additionalProperties` keys).
const ANY_VALUE_TYPES: &[&str] = &["jsondict", "pybool", "pystr", "pyint", "pyfloat", "jsonlist"];

/// Source of typed random primitives and small JSON composites.
pub struct Faker {
    rng: SmallRng,
}

impl Default for Faker {
    fn default() -> Self {
        Self::new()
    }
}

impl Faker {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Whether `name` is a provider [`invoke`](Self::invoke) understands.
    pub fn has_provider(name: &str) -> bool {
        PROVIDERS.contains(&name)
    }

    /// Run the provider named by a `fake` keyword or a format mapping.
    pub fn invoke(&mut self, name: &str) -> Result<Value, GenerateError> {
        let value = match name {
            "iso8601" => Value::String(self.iso8601()),
            "date" => Value::String(self.date()),
            "time" => Value::String(self.time()),
            "email" => Value::String(self.email()),
            "uri" => Value::String(self.uri()),
            "uuid4" => Value::String(self.uuid4()),
            "pybool" => Value::Bool(self.boolean()),
            "pyint" => Value::Number(self.integer().into()),
            "pyfloat" => number_value(self.float()),
            "pystr" => Value::String(self.string(1, 20)),
            "jsondict" => self.jsondict(),
            "jsonlist" => self.jsonlist(),
            _ => {
                return Err(GenerateError::Config(format!(
                    "{name:?} is not a faker provider"
                )));
            }
        };
        Ok(value)
    }

    pub fn boolean(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    pub fn integer(&mut self) -> i64 {
        self.rng.gen_range(0..=9999)
    }

    pub fn float(&mut self) -> f64 {
        // two-decimal floats survive JSON round-trips exactly
        self.rng.gen_range(-1_000_000i64..=1_000_000) as f64 / 100.0
    }

    /// Uniform integer on `[lo, hi]`. Degenerate bounds yield `lo`.
    pub fn random_int(&mut self, lo: i64, hi: i64) -> i64 {
        if lo >= hi {
            lo
        } else {
            self.rng.gen_range(lo..=hi)
        }
    }

    /// Uniform float on `[lo, hi]`. Degenerate bounds yield `lo`.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if lo >= hi {
            lo
        } else {
            self.rng.gen_range(lo..=hi)
        }
    }

    /// Alphanumeric string with length drawn from `[min, max]`.
    pub fn string(&mut self, min: usize, max: usize) -> String {
        let len = self.rng.gen_range(min..=max.max(min));
        (0..len)
            .map(|_| CHARS[self.rng.gen_range(0..CHARS.len())] as char)
            .collect()
    }

    pub fn iso8601(&mut self) -> String {
        self.timestamp().to_rfc3339()
    }

    pub fn date(&mut self) -> String {
        self.timestamp().format("%Y-%m-%d").to_string()
    }

    pub fn time(&mut self) -> String {
        self.timestamp().format("%H:%M:%S").to_string()
    }

    pub fn email(&mut self) -> String {
        format!("user{}@example.com", self.rng.gen_range(1..9999_u32))
    }

    pub fn uri(&mut self) -> String {
        format!("https://example.com/{}", self.string(4, 12))
    }

    pub fn uuid4(&mut self) -> String {
        uuid::Builder::from_random_bytes(self.rng.r#gen())
            .into_uuid()
            .to_string()
    }

    /// Expand a regex into a string matching it.
    pub fn pattern(&mut self, pattern: &str) -> Result<String, GenerateError> {
        let seed: u64 = self.rng.r#gen();
        let mut generator = regex_generate::Generator::new(
            pattern,
            ChaCha8Rng::seed_from_u64(seed),
            MAX_PATTERN_REPEAT,
        )
        .map_err(|e| GenerateError::Config(format!("cannot expand pattern {pattern:?}: {e:?}")))?;
        let mut buffer: Vec<u8> = vec![];
        generator
            .generate(&mut buffer)
            .map_err(|e| GenerateError::Config(format!("cannot expand pattern {pattern:?}: {e:?}")))?;
        String::from_utf8(buffer).map_err(|e| {
            GenerateError::Config(format!("pattern {pattern:?} produced invalid UTF-8: {e}"))
        })
    }

    /// Map of random primitives, for `fake: jsondict` and fabricated
    /// object members.
    pub fn jsondict(&mut self) -> Value {
        let n = self.rng.gen_range(6..=14);
        let mut map = Map::new();
        while map.len() < n {
            let key = self.string(4, 12);
            let value = self.any_primitive();
            map.insert(key, value);
        }
        Value::Object(map)
    }

    /// List of random primitives.
    pub fn jsonlist(&mut self) -> Value {
        let n = self.rng.gen_range(6..=14);
        Value::Array((0..n).map(|_| self.any_primitive()).collect())
    }

    /// One random primitive from the weighted default pool.
    pub fn any_primitive(&mut self) -> Value {
        let name = DEFAULT_VALUE_TYPES[self.rng.gen_range(0..DEFAULT_VALUE_TYPES.len())];
        self.invoke(name)
            .expect("default value pool only names known providers")
    }

    /// Any JSON value, composites included; used when no schema
    /// constrains the result.
    pub fn any_value(&mut self) -> Value {
        let name = ANY_VALUE_TYPES[self.rng.gen_range(0..ANY_VALUE_TYPES.len())];
        self.invoke(name)
            .expect("fabrication pool only names known providers")
    }

    /// Uniform index into a collection of `len` elements.
    pub fn choice_index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    pub fn shuffle(&mut self, values: &mut [Value]) {
        values.shuffle(&mut self.rng);
    }

    fn timestamp(&mut self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.rng.gen_range(0..MAX_EPOCH), 0).unwrap_or_default()
    }
}

/// An `f64` as a JSON number, preferring the integer representation
/// when exact.
pub(crate) fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::Number((value as i64).into())
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faker() -> Faker {
        Faker::seeded(42)
    }

    #[test]
    fn email_shape() {
        let email = faker().email();
        assert!(email.contains('@'));
        assert!(email.ends_with("example.com"));
    }

    #[test]
    fn iso8601_parses() {
        let stamp = faker().iso8601();
        assert!(DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[test]
    fn date_shape() {
        let date = faker().date();
        let re = regex::Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
        assert!(re.is_match(&date), "bad date: {date}");
    }

    #[test]
    fn uuid4_shape() {
        let id = faker().uuid4();
        let re =
            regex::Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
                .unwrap();
        assert!(re.is_match(&id), "bad uuid: {id}");
    }

    #[test]
    fn string_respects_bounds() {
        let mut f = faker();
        for _ in 0..50 {
            let s = f.string(3, 7);
            assert!((3..=7).contains(&s.len()));
        }
    }

    #[test]
    fn pattern_output_matches() {
        let mut f = faker();
        let expanded = f.pattern("[a-z]{4}-[0-9]{2}").unwrap();
        let re = regex::Regex::new("^[a-z]{4}-[0-9]{2}$").unwrap();
        assert!(re.is_match(&expanded), "bad expansion: {expanded}");
    }

    #[test]
    fn pattern_rejects_garbage() {
        let mut f = faker();
        assert!(matches!(
            f.pattern("[unclosed"),
            Err(GenerateError::Config(_))
        ));
    }

    #[test]
    fn invoke_rejects_unknown_provider() {
        let mut f = faker();
        assert!(matches!(
            f.invoke("no_such_provider"),
            Err(GenerateError::Config(_))
        ));
    }

    #[test]
    fn invoke_covers_all_providers() {
        let mut f = faker();
        for name in PROVIDERS {
            assert!(f.invoke(name).is_ok(), "provider {name} failed");
        }
    }

    #[test]
    fn seeded_streams_are_reproducible() {
        let mut a = Faker::seeded(7);
        let mut b = Faker::seeded(7);
        for _ in 0..20 {
            assert_eq!(a.any_primitive(), b.any_primitive());
        }
    }

    #[test]
    fn jsondict_holds_primitives() {
        let dict = faker().jsondict();
        let map = dict.as_object().unwrap();
        assert!(!map.is_empty());
        assert!(map.values().all(|v| !v.is_object() && !v.is_array()));
    }

    #[test]
    fn number_value_prefers_integers() {
        assert_eq!(number_value(3.0), Value::Number(3.into()));
        assert_eq!(number_value(0.25), serde_json::json!(0.25));
    }
}
