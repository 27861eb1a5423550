use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Fatal failures. Any of these aborts a run before the output path is touched.
#[derive(Error, Debug)]
pub enum TransplantError {
    #[error("package is corrupt: {path}: {reason}")]
    PackageCorrupt { path: PathBuf, reason: String },

    #[error("package {path} has no part {part}")]
    PartMissing { path: PathBuf, part: String },

    #[error("style part {part} is malformed: {reason}")]
    StylePartMalformed { part: String, reason: String },

    #[error("I/O failure on {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output path {0} refers to one of the input packages")]
    OutputConflict(PathBuf),
}

pub type Result<T> = std::result::Result<T, TransplantError>;

impl TransplantError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::PackageCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed_styles(part: &str, reason: impl std::fmt::Display) -> Self {
        Self::StylePartMalformed {
            part: part.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Which kind of in-content reference a style id was found through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Paragraph,
    Run,
    Table,
}

/// Non-fatal conditions, returned alongside a successful result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Target style ids that no mapping pass resolved; references to them are left as-is.
    MappingIncomplete { unmapped: Vec<String> },
    /// A content element points at a style id its own catalog does not declare.
    UnknownStyleReference {
        style_id: String,
        reference: ReferenceKind,
    },
    /// A manual override whose target or template side matched nothing.
    ManualMappingUnresolved { from: String, to: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MappingIncomplete { unmapped } => write!(
                f,
                "{} target style id(s) have no template counterpart: {}",
                unmapped.len(),
                unmapped.join(", ")
            ),
            Self::UnknownStyleReference {
                style_id,
                reference,
            } => write!(f, "{reference:?} reference to undeclared style id {style_id}"),
            Self::ManualMappingUnresolved { from, to } => {
                write!(f, "manual mapping {from} -> {to} matched no style")
            }
        }
    }
}
