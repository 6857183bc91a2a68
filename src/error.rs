//! Error types shared across classification, fitting and serialization.
//!
//! Everything below the top-level call is data (see [`crate::node`]); these
//! are the only failures a caller ever sees.
use thiserror::Error;

use crate::node::LocatedIssue;

/// Classification-time failure, raised before any data is consulted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// A deferred or textual type reference could not be found.
    #[error("cannot resolve type `{name}`")]
    UnresolvableType { name: String },

    /// The type cannot be fitted the way it was declared.
    #[error("unsupported type `{name}`: {reason}")]
    UnsupportedType { name: String, reason: String },
}

impl ClassifyError {
    pub(crate) fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedType {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level failure of [`crate::Fitter`].
#[derive(Error, Debug)]
pub enum FitError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The value does not fit; `issues` lists every failing node.
    #[error("value does not fit `{type_name}`{}", mismatch_detail(.issues))]
    Mismatch {
        type_name: String,
        issues: Vec<LocatedIssue>,
    },
}

impl FitError {
    /// Located issues of a mismatch, empty for classification errors.
    pub fn issues(&self) -> &[LocatedIssue] {
        match self {
            FitError::Mismatch { issues, .. } => issues,
            FitError::Classify(_) => &[],
        }
    }
}

fn mismatch_detail(issues: &[LocatedIssue]) -> String {
    match issues {
        [] => String::new(),
        [only] => format!(": {only}"),
        [first, rest @ ..] => format!(": {first} (and {} more)", rest.len()),
    }
}

/// Failure of the reverse direction.
#[derive(Error, Debug)]
pub enum SerializeError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The descriptor carries no reverse hook and no custom serializer.
    #[error("`{type_name}` cannot be serialized")]
    Unsupported { type_name: String },

    /// The value handed over is not the type its descriptor was built for.
    #[error("value is not a `{type_name}`")]
    Erasure { type_name: String },

    #[error("value matches no alternative of `{type_name}`")]
    NoAlternative { type_name: String },

    #[error("value is not a declared member of `{type_name}`")]
    UnknownMember { type_name: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Deserialization failure located by JSON path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("at JSON path {path} → {message}")]
pub struct PathError {
    pub path: String,
    pub message: String,
}

/// Failure to load a schema document.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The document is not valid JSON or does not follow the document shape.
    #[error(transparent)]
    Parse(#[from] PathError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),
}
