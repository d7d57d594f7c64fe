use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TypeError;
use crate::properties::Properties;

/// A directed, weighted edge between two nodes. Endpoints are foreign keys
/// into `graph_nodes` with cascade-on-delete semantics enforced by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub edge_type: String,
    pub weight: f64,
    pub properties: Properties,
    pub vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl GraphEdge {
    /// Builds a new edge. `weight == 0.0` is treated as "unset" and defaults
    /// to `1.0`, matching upsert semantics.
    pub fn new(
        id: impl Into<String>,
        from_node_id: impl Into<String>,
        to_node_id: impl Into<String>,
        edge_type: impl Into<String>,
        weight: f64,
        properties: Properties,
        vector: Option<Vec<f32>>,
    ) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyId);
        }
        if let Some(v) = &vector {
            crate::vector::validate_vector(v)?;
        }
        Ok(Self {
            id,
            from_node_id: from_node_id.into(),
            to_node_id: to_node_id.into(),
            edge_type: edge_type.into(),
            weight: if weight == 0.0 { 1.0 } else { weight },
            properties,
            vector,
            created_at: Utc::now(),
        })
    }
}
