use thiserror::Error;

/// Errors from layered fact storage, TEMPR recall, and reflection.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("fact content must be non-empty")]
    EmptyContent,

    #[error("unrecognized memory layer {layer:?}")]
    UnknownLayer { layer: String },

    #[error("fact {id} not found")]
    FactNotFound { id: String },

    #[error("no fact extractor has been configured")]
    NoExtractorConfigured,

    #[error("operation was canceled")]
    Canceled,

    #[error("graph store error: {0}")]
    Graph(#[from] graph::GraphError),

    #[error("type codec error: {0}")]
    Type(#[from] types::TypeError),
}
