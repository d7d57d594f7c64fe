//! Persistent property graph store: node/edge CRUD over SQLite, traversal,
//! whole-graph algorithms, vector+graph hybrid search, and multi-format
//! import/export.

pub mod algorithms;
pub mod error;
pub mod hybrid;
pub mod io;
pub mod schema;
pub mod store;
pub mod traversal;

pub use algorithms::{Community, EdgePrediction, GraphStatistics};
pub use error::{BatchResult, GraphError};
pub use hybrid::{HybridQuery, HybridResult, HybridWeights};
pub use io::Format;
pub use store::{BatchOp, Direction, GraphStore, Message, NodeFilter};
pub use traversal::{NeighborHop, NeighborOptions, PathResult, Subgraph};
