use thiserror::Error;

/// Errors from quantizers, ANN indices, and `MultiIndex` composition.
#[derive(Error, Debug)]
pub enum SimilarityError {
    #[error("vector has dimension {found}, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("quantizer must be trained before {operation}")]
    Untrained { operation: &'static str },

    #[error("training requires at least {required} points, got {given}")]
    InsufficientTrainingData { required: usize, given: usize },

    #[error("duplicate insert of id {id} into HNSW index")]
    DuplicateInsert { id: String },

    #[error("HNSW entry point not found")]
    EntryPointNotFound,

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("codebook is truncated or malformed: {reason}")]
    MalformedCodebook { reason: String },

    #[error("operation was canceled")]
    Canceled,
}
