use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TypeError;
use crate::properties::Properties;

/// A node in the property graph: a caller-supplied id, a mandatory embedding,
/// free-form content, a type tag, and a properties map.
///
/// Node ids are caller-supplied and enforced unique by the backing store's
/// primary key; vectors must match the store's configured dimension (checked
/// by the store, not here, since this type has no notion of "the" dimension).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub node_type: String,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    /// Builds a new node with `created_at == updated_at == now`. Validates
    /// that `id` is non-empty and `vector` is non-empty with finite
    /// components; dimension-against-store checks happen in the store.
    pub fn new(
        id: impl Into<String>,
        vector: Vec<f32>,
        content: impl Into<String>,
        node_type: impl Into<String>,
        properties: Properties,
    ) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyId);
        }
        crate::vector::validate_vector(&vector)?;
        let now = Utc::now();
        Ok(Self {
            id,
            vector,
            content: content.into(),
            node_type: node_type.into(),
            properties,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_empty_id() {
        let err = GraphNode::new("", vec![1.0], "c", "t", Properties::new()).unwrap_err();
        assert_eq!(err, TypeError::EmptyId);
    }

    #[test]
    fn rejects_empty_vector() {
        let err = GraphNode::new("a", vec![], "c", "t", Properties::new()).unwrap_err();
        assert_eq!(err, TypeError::EmptyVector);
    }

    #[test]
    fn new_node_has_matching_created_and_updated_timestamps() {
        let node = GraphNode::new("a", vec![1.0, 0.0], "c", "t", Properties::new()).unwrap();
        assert_eq!(node.created_at, node.updated_at);
    }
}
