//! This crate's own JSON interchange format: a direct serialization of
//! [`GraphNode`]/[`GraphEdge`], the only format here that round-trips
//! vectors exactly.

use serde::{Deserialize, Serialize};
use types::{GraphEdge, GraphNode};

use crate::error::{BatchResult, GraphError};
use crate::store::{GraphStore, NodeFilter};

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    node_count: usize,
    edge_count: usize,
    format: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    metadata: Metadata,
}

const FORMAT_TAG: &str = "sqvect-graph-v1";

pub fn export(store: &GraphStore) -> Result<String, GraphError> {
    let nodes = store.get_all_nodes(&NodeFilter::default())?;
    let edges = store.all_edges_full()?;
    let doc = Document {
        metadata: Metadata {
            node_count: nodes.len(),
            edge_count: edges.len(),
            format: FORMAT_TAG.to_string(),
        },
        nodes,
        edges,
    };
    serde_json::to_string_pretty(&doc).map_err(|e| GraphError::Serialization { reason: e.to_string() })
}

pub fn import(store: &GraphStore, text: &str) -> Result<BatchResult, GraphError> {
    let doc: Document =
        serde_json::from_str(text).map_err(|e| GraphError::Serialization { reason: e.to_string() })?;
    let mut result = store.upsert_nodes_batch(&doc.nodes)?;
    let edges_result = store.upsert_edges_batch(&doc.edges)?;
    result.success_count += edges_result.success_count;
    result.failed_count += edges_result.failed_count;
    result.errors.extend(edges_result.errors);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::{Algorithm, Properties};

    #[test]
    fn round_trips_nodes_and_edges() {
        let store = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        store
            .upsert_node(&GraphNode::new("a", vec![1.0, 0.0], "hi", "doc", Properties::new()).unwrap())
            .unwrap();
        store
            .upsert_node(&GraphNode::new("b", vec![0.0, 1.0], "", "doc", Properties::new()).unwrap())
            .unwrap();
        store
            .upsert_edge(&GraphEdge::new("e1", "a", "b", "knows", 0.5, Properties::new(), None).unwrap())
            .unwrap();

        let exported = export(&store).unwrap();
        let fresh = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        let result = import(&fresh, &exported).unwrap();
        assert_eq!(result.failed_count, 0);
        assert_eq!(fresh.node_count().unwrap(), 2);
        assert_eq!(fresh.edge_count().unwrap(), 1);
        assert_eq!(fresh.get_node("a").unwrap().vector, vec![1.0, 0.0]);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let store = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        assert!(import(&store, "{not json").is_err());
    }
}
