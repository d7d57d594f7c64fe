use thiserror::Error;

/// Errors from the graph store: CRUD validation, not-found, storage (SQLite),
/// traversal/algorithm failures, and import/export serialization.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node id must be non-empty")]
    EmptyId,

    #[error("vector is required and must be non-empty")]
    MissingVector,

    #[error("invalid traversal direction {direction:?}, expected one of out/in/both")]
    InvalidDirection { direction: String },

    #[error("node {id} not found")]
    NodeNotFound { id: String },

    #[error("edge {id} not found")]
    EdgeNotFound { id: String },

    #[error("no path exists between {from} and {to}")]
    NoPath { from: String, to: String },

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("vector/properties codec error: {0}")]
    Type(#[from] types::TypeError),

    #[error("similarity error: {0}")]
    Similarity(#[from] similarity::SimilarityError),

    #[error("import/export error: {reason}")]
    Serialization { reason: String },

    #[error("unrecognized or ambiguous interchange format")]
    UnknownFormat,

    #[error("operation was canceled")]
    Canceled,
}

/// Result of a batch operation: partial failures are reported per-row and do
/// not abort the surrounding transaction.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BatchResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

impl BatchResult {
    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, err: impl std::fmt::Display) {
        self.failed_count += 1;
        self.errors.push(err.to_string());
    }
}
