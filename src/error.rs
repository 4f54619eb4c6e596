use std::{io, path::PathBuf};

use thiserror::Error;

/// The result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed dataset {}, line {line}: {kind}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        kind: FormatErrorKind,
    },

    #[error("label {label} is outside the valid range [0, {num_classes})")]
    InvalidLabel { label: usize, num_classes: usize },

    #[error("dataset {name} contains no samples")]
    EmptyDataset { name: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// What exactly was wrong with a malformed row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatErrorKind {
    #[error("missing header line")]
    MissingHeader,

    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("label {value:?} is not a non-negative integer")]
    InvalidLabel { value: String },

    #[error("field {field} ({value:?}) is not a number")]
    InvalidIntensity { field: usize, value: String },
}
