//! GraphML interchange: widely supported by graph-visualization tools, but
//! with no native slot for an embedding. Imported nodes get a zero vector of
//! the store's configured dimension; re-exporting keeps that zero vector
//! rather than trying to recover the original, which is a deliberate
//! precision loss for interoperability, not a bug.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{BatchResult, GraphError};
use crate::store::{GraphStore, NodeFilter};
use types::{properties, GraphEdge, GraphNode, Properties};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "graphml")]
struct GraphMl {
    graph: Graph,
}

#[derive(Debug, Serialize, Deserialize)]
struct Graph {
    #[serde(rename = "@edgedefault", default)]
    edgedefault: String,
    #[serde(rename = "node", default)]
    nodes: Vec<Node>,
    #[serde(rename = "edge", default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Node {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "data", default)]
    data: Vec<Data>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Edge {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@source")]
    source: String,
    #[serde(rename = "@target")]
    target: String,
    #[serde(rename = "data", default)]
    data: Vec<Data>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Data {
    #[serde(rename = "@key")]
    key: String,
    #[serde(rename = "$text", default)]
    value: String,
}

fn data_map(data: &[Data]) -> HashMap<&str, &str> {
    data.iter().map(|d| (d.key.as_str(), d.value.as_str())).collect()
}

pub fn export(store: &GraphStore) -> Result<String, GraphError> {
    let nodes = store
        .get_all_nodes(&NodeFilter::default())?
        .into_iter()
        .map(|n| Node {
            id: n.id,
            data: vec![
                Data { key: "content".into(), value: n.content },
                Data { key: "node_type".into(), value: n.node_type },
                Data {
                    key: "properties".into(),
                    value: properties::encode_properties(&n.properties)
                        .map_err(|e| GraphError::Serialization { reason: e.to_string() })?,
                },
            ],
        })
        .collect();

    let edges = store
        .all_edges_full()?
        .into_iter()
        .map(|e| Edge {
            id: e.id,
            source: e.from_node_id,
            target: e.to_node_id,
            data: vec![
                Data { key: "edge_type".into(), value: e.edge_type },
                Data { key: "weight".into(), value: e.weight.to_string() },
                Data {
                    key: "properties".into(),
                    value: properties::encode_properties(&e.properties)
                        .map_err(|e| GraphError::Serialization { reason: e.to_string() })?,
                },
            ],
        })
        .collect();

    let doc = GraphMl {
        graph: Graph {
            edgedefault: "directed".into(),
            nodes,
            edges,
        },
    };
    quick_xml::se::to_string(&doc).map_err(|e| GraphError::Serialization { reason: e.to_string() })
}

pub fn import(store: &GraphStore, text: &str) -> Result<BatchResult, GraphError> {
    let doc: GraphMl =
        quick_xml::de::from_str(text).map_err(|e| GraphError::Serialization { reason: e.to_string() })?;

    let zero_vector = vec![0.0_f32; store.dim()];
    let mut nodes = Vec::with_capacity(doc.graph.nodes.len());
    for n in &doc.graph.nodes {
        let map = data_map(&n.data);
        let properties: Properties = map
            .get("properties")
            .map(|s| properties::decode_properties(s))
            .transpose()?
            .unwrap_or_default();
        nodes.push(
            GraphNode::new(
                n.id.clone(),
                zero_vector.clone(),
                map.get("content").copied().unwrap_or(""),
                map.get("node_type").copied().unwrap_or(""),
                properties,
            )
            .map_err(GraphError::from)?,
        );
    }

    let mut edges = Vec::with_capacity(doc.graph.edges.len());
    for e in &doc.graph.edges {
        let map = data_map(&e.data);
        let properties: Properties = map
            .get("properties")
            .map(|s| properties::decode_properties(s))
            .transpose()?
            .unwrap_or_default();
        let weight: f64 = map.get("weight").and_then(|s| s.parse().ok()).unwrap_or(1.0);
        edges.push(
            GraphEdge::new(
                e.id.clone(),
                e.source.clone(),
                e.target.clone(),
                map.get("edge_type").copied().unwrap_or(""),
                weight,
                properties,
                None,
            )
            .map_err(GraphError::from)?,
        );
    }

    let mut result = store.upsert_nodes_batch(&nodes)?;
    let edges_result = store.upsert_edges_batch(&edges)?;
    result.success_count += edges_result.success_count;
    result.failed_count += edges_result.failed_count;
    result.errors.extend(edges_result.errors);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::Algorithm;

    #[test]
    fn round_trips_node_and_edge_metadata_with_zero_vector() {
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
        let node = fresh.get_node("a").unwrap();
        assert_eq!(node.content, "hi");
        assert_eq!(node.vector, vec![0.0, 0.0]);
    }
}
