//! GEXF (Gephi's interchange format) import/export. Like GraphML, GEXF has
//! no native embedding slot; imported nodes fall back to a zero vector of
//! the store's dimension.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{BatchResult, GraphError};
use crate::store::{GraphStore, NodeFilter};
use types::{properties, GraphEdge, GraphNode, Properties};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "gexf")]
struct Gexf {
    graph: Graph,
}

#[derive(Debug, Serialize, Deserialize)]
struct Graph {
    nodes: Nodes,
    edges: Edges,
}

#[derive(Debug, Serialize, Deserialize)]
struct Nodes {
    #[serde(rename = "node", default)]
    node: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Edges {
    #[serde(rename = "edge", default)]
    edge: Vec<Edge>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Node {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@label", default)]
    label: String,
    attvalues: Option<Attvalues>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Edge {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@source")]
    source: String,
    #[serde(rename = "@target")]
    target: String,
    #[serde(rename = "@weight", default)]
    weight: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Attvalues {
    #[serde(rename = "attvalue", default)]
    attvalue: Vec<Attvalue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Attvalue {
    #[serde(rename = "@for")]
    for_: String,
    #[serde(rename = "@value")]
    value: String,
}

fn attvalue_map(attvalues: &Option<Attvalues>) -> HashMap<&str, &str> {
    attvalues
        .as_ref()
        .map(|a| a.attvalue.iter().map(|v| (v.for_.as_str(), v.value.as_str())).collect())
        .unwrap_or_default()
}

pub fn export(store: &GraphStore) -> Result<String, GraphError> {
    let nodes = store
        .get_all_nodes(&NodeFilter::default())?
        .into_iter()
        .map(|n| -> Result<Node, GraphError> {
            Ok(Node {
                id: n.id,
                label: n.node_type.clone(),
                attvalues: Some(Attvalues {
                    attvalue: vec![
                        Attvalue { for_: "content".into(), value: n.content },
                        Attvalue {
                            for_: "properties".into(),
                            value: properties::encode_properties(&n.properties)
                                .map_err(|e| GraphError::Serialization { reason: e.to_string() })?,
                        },
                    ],
                }),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let edges = store
        .all_edges_full()?
        .into_iter()
        .map(|e| Edge {
            id: e.id,
            source: e.from_node_id,
            target: e.to_node_id,
            weight: Some(e.weight.to_string()),
        })
        .collect();

    let doc = Gexf {
        graph: Graph {
            nodes: Nodes { node: nodes },
            edges: Edges { edge: edges },
        },
    };
    quick_xml::se::to_string(&doc).map_err(|e| GraphError::Serialization { reason: e.to_string() })
}

pub fn import(store: &GraphStore, text: &str) -> Result<BatchResult, GraphError> {
    let doc: Gexf = quick_xml::de::from_str(text).map_err(|e| GraphError::Serialization { reason: e.to_string() })?;

    let zero_vector = vec![0.0_f32; store.dim()];
    let mut nodes = Vec::with_capacity(doc.graph.nodes.node.len());
    for n in &doc.graph.nodes.node {
        let map = attvalue_map(&n.attvalues);
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
                n.label.clone(),
                properties,
            )
            .map_err(GraphError::from)?,
        );
    }

    let mut edges = Vec::with_capacity(doc.graph.edges.edge.len());
    for e in &doc.graph.edges.edge {
        let weight: f64 = e.weight.as_deref().and_then(|s| s.parse().ok()).unwrap_or(1.0);
        edges.push(
            GraphEdge::new(e.id.clone(), e.source.clone(), e.target.clone(), "", weight, Properties::new(), None)
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
    fn round_trips_labels_and_weights() {
        let store = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        store
            .upsert_node(&GraphNode::new("a", vec![1.0, 0.0], "hi", "person", Properties::new()).unwrap())
            .unwrap();
        store
            .upsert_node(&GraphNode::new("b", vec![0.0, 1.0], "", "person", Properties::new()).unwrap())
            .unwrap();
        store
            .upsert_edge(&GraphEdge::new("e1", "a", "b", "knows", 0.75, Properties::new(), None).unwrap())
            .unwrap();

        let exported = export(&store).unwrap();
        let fresh = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        let result = import(&fresh, &exported).unwrap();
        assert_eq!(result.failed_count, 0);
        assert_eq!(fresh.get_node("a").unwrap().node_type, "person");
        let edges = fresh.all_edges_full().unwrap();
        assert_eq!(edges[0].weight, 0.75);
    }
}
