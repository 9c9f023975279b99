//! Error types for rtxspec
//!
//! Three families are kept apart:
//! - [`SpecDefect`]: the command description itself is wrong or inconsistent
//! - [`CoverageGap`]: a generator lacks the data it needs to derive cases
//! - [`ResolveError`]: a parameter cannot be resolved for a model, either
//!   because it is not offered there or because of a defect

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// rtxspec errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Spec parse error: {0}")]
    SpecParse(String),

    #[error("{} specification defect(s): {}", .0.len(), join_display(.0))]
    Defects(Vec<SpecDefect>),

    #[error("{} coverage gap(s): {}", .0.len(), join_display(.0))]
    CoverageGaps(Vec<CoverageGap>),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_norway::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<SpecDefect> for Error {
    fn from(defect: SpecDefect) -> Self {
        Error::Defects(vec![defect])
    }
}

impl Error {
    /// Defects carried by this error, if any
    pub fn defects(&self) -> &[SpecDefect] {
        match self {
            Error::Defects(d) => d,
            _ => &[],
        }
    }
}

fn join_display<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A malformed or internally inconsistent command description.
///
/// Defects are never patched over: they abort generation for the command
/// that carries them.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecDefect {
    #[error("command name is empty")]
    EmptyName,

    #[error("unknown model '{model}' referenced by {context}")]
    UnknownModel { model: String, context: String },

    #[error("unknown parameter '{parameter}' referenced by {context}")]
    UnknownParameter { parameter: String, context: String },

    #[error("parameter '{parameter}' has malformed range [{min}, {max}]{}", model_suffix(.model))]
    MalformedRange {
        parameter: String,
        model: Option<String>,
        min: i64,
        max: i64,
    },

    #[error("parameter '{parameter}': value '{value}' is not a declared enum value ({context})")]
    EnumValueOutOfSet {
        parameter: String,
        value: String,
        context: String,
    },

    #[error("parameter '{parameter}': boundary value '{value}' is declared valid but {reason}{}", model_suffix(.model))]
    BoundaryContradiction {
        parameter: String,
        value: String,
        model: Option<String>,
        reason: String,
    },

    #[error("field '{field}' is bound by {first} as {first_type} and by {second} as {second_type}")]
    FieldCollision {
        field: String,
        first: String,
        first_type: String,
        second: String,
        second_type: String,
    },

    #[error("pair ({left}, {right}) cannot be covered without violating a constraint{}", model_suffix(.model))]
    UncoverablePair {
        left: String,
        right: String,
        model: Option<String>,
    },

    #[error("constraints '{first}' and '{second}' can match the same combination; give them distinct priorities")]
    ConstraintPrecedence { first: String, second: String },

    #[error("constraint '{constraint}' declares both requires and invalid_for; split it in two")]
    AmbiguousConstraint { constraint: String },

    #[error("pairwise coverage needs at least two parameters, found {found}")]
    TooFewPairwiseParameters { found: usize },

    #[error("pairwise parameter '{parameter}' has no candidate values")]
    EmptyPairwiseDomain { parameter: String },

    #[error("invalid syntax template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid pattern '{pattern}' on {context}: {reason}")]
    InvalidPattern {
        pattern: String,
        context: String,
        reason: String,
    },

    #[error("expression '{expression}' failed: {reason}")]
    Expression { expression: String, reason: String },

    #[error("duplicate {what} '{name}'")]
    Duplicate { what: String, name: String },
}

fn model_suffix(model: &Option<String>) -> String {
    match model {
        Some(m) => format!(" on {}", m),
        None => String::new(),
    }
}

/// Kind of coverage gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// Integer parameter without any range to derive boundaries from
    MissingRange,
    /// Enum parameter without declared values
    MissingEnumValues,
    /// Capacity reference without a license table or base limit
    MissingLicenseTable,
}

/// A parameter that should have auto-derived cases but lacks the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageGap {
    pub kind: GapKind,
    pub parameter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CoverageGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}: {}",
            self.parameter,
            model_suffix(&self.model),
            self.message
        )
    }
}

/// Failure to resolve a parameter's effective domain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The parameter is not offered on the model; not a defect
    #[error("parameter '{parameter}' is unsupported on {model}: {reason}")]
    Unsupported {
        parameter: String,
        model: String,
        reason: String,
    },

    #[error(transparent)]
    Defect(#[from] SpecDefect),
}
