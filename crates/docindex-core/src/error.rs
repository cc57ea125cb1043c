//! Error types for the document index engine.

use std::fmt;

use thiserror::Error;

use crate::types::{DocumentId, IndexId, InstanceNodeId, TemplateNodeId};

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Expression could not be parsed or evaluated
    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Operation would break the shape of a template or instance tree
    #[error("structural conflict: {0}")]
    StructuralConflict(String),

    /// Entity no longer exists
    #[error("not found: {0}")]
    NotFound(Missing),

    /// Store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Rebuild was interrupted before all documents were processed
    #[error("rebuild cancelled after {processed} of {total} documents")]
    Cancelled { processed: usize, total: usize },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors a caller may treat as "already gone".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The entity an operation could not find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Index(IndexId),
    TemplateNode(TemplateNodeId),
    InstanceNode(InstanceNodeId),
    Document(DocumentId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(id) => write!(f, "index {id}"),
            Self::TemplateNode(id) => write!(f, "template node {id}"),
            Self::InstanceNode(id) => write!(f, "instance node {id}"),
            Self::Document(id) => write!(f, "document {id}"),
        }
    }
}

/// Expression evaluation errors.
///
/// During indexing these are logged and treated as "no match" for the
/// offending node; only authoring-time validation surfaces them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("syntax error in `{expression}`: {reason}")]
    Syntax { expression: String, reason: String },

    #[error("missing attribute: {0}")]
    MissingAttribute(String),

    #[error("attribute {0} is not a scalar or list of scalars")]
    NotScalar(String),

    #[error("filter `{filter}` failed: {reason}")]
    Filter { filter: String, reason: String },
}

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("document lookup failed: {0}")]
    Documents(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
