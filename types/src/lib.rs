pub mod edge;
pub mod errors;
pub mod memory_layer;
pub mod node;
pub mod properties;
pub mod similarity;
pub mod vector;

pub use edge::GraphEdge;
pub use errors::TypeError;
pub use memory_layer::MemoryLayer;
pub use node::GraphNode;
pub use properties::{PropertyValue, Properties};
pub use similarity::Algorithm;
