//! Error types surfaced by schema generation

/// Everything that can go wrong between handing a schema to the
/// generator and getting a validated document back.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The input schema does not compile under Draft-04.
    #[error("schema failed Draft-04 validation: {0}")]
    SchemaInvalid(String),

    /// The produced document was rejected by the Draft-04 validator.
    /// Either the schema combines keywords the generator cannot satisfy
    /// or the generator has a bug.
    #[error("generated document does not satisfy the schema: {0}")]
    OutputInvalid(String),

    /// A `$ref` target could not be fetched, pointed to, or joined
    /// against the current scope.
    #[error("cannot resolve {reference:?}: {reason}")]
    UnresolvableRef { reference: String, reason: String },

    /// Schema fragments with incompatible kinds under the same key were
    /// combined during merge/difference/subtract.
    #[error("cannot combine {key:?}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Bad generator configuration or schema knobs: `multipleOf <= 0`,
    /// an unknown faker provider name, an inexpandable `pattern`.
    #[error("{0}")]
    Config(String),

    /// A `type` outside the dispatch set, or a keyword shape the
    /// generator does not understand.
    #[error("unsupported: {0}")]
    UnsupportedKeyword(String),
}
