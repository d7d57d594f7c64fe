use thiserror::Error;

/// Errors arising from the shared data model: vector/metadata codecs, node
/// and edge construction, and other validation that does not depend on a
/// storage backend or index implementation.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum TypeError {
    #[error("vector must be non-empty")]
    EmptyVector,

    #[error("node id must be non-empty")]
    EmptyId,

    #[error("vector has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector contains a NaN or infinite component at index {index}")]
    NonFiniteComponent { index: usize },

    #[error("encoded vector blob is malformed: {reason}")]
    MalformedVector { reason: String },

    #[error("metadata/properties JSON is malformed: {reason}")]
    MalformedMetadata { reason: String },
}
