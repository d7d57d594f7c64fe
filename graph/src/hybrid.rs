//! Search that fuses vector similarity with graph proximity: §4.9's
//! three-phase `HybridSearch` (vector phase over the whole store, BFS graph
//! phase from an optional anchor, weighted fusion), plus the narrower
//! neighborhood-scoped helpers `graph_vector_search`/`similarity_in_graph`.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::store::{Direction, GraphStore, NodeFilter};

/// The `{vector, graph, edge}` weight triple from spec §4.9. Normalized to
/// sum to 1.0 whenever the sum deviates from 1.0 by more than 0.001; the
/// all-zero case falls back to the spec's documented defaults
/// `(0.5, 0.3, 0.2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub vector: f32,
    pub graph: f32,
    pub edge: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector: 0.5,
            graph: 0.3,
            edge: 0.2,
        }
    }
}

impl HybridWeights {
    fn normalized(self) -> (f32, f32, f32) {
        let sum = self.vector + self.graph + self.edge;
        if sum <= 0.0 {
            let defaults = Self::default();
            return (defaults.vector, defaults.graph, defaults.edge);
        }
        if (sum - 1.0).abs() > 0.001 {
            (self.vector / sum, self.graph / sum, self.edge / sum)
        } else {
            (self.vector, self.graph, self.edge)
        }
    }
}

/// A [`hybrid_search`] request: vector and graph anchor are each optional
/// (either phase can be skipped), per spec §4.9.
#[derive(Debug, Clone)]
pub struct HybridQuery<'a> {
    pub vector: Option<&'a [f32]>,
    pub start_node_id: Option<&'a str>,
    pub node_types: Option<&'a [String]>,
    pub edge_types: Option<&'a [String]>,
    pub max_depth: usize,
    pub top_k: usize,
    pub threshold: f32,
    pub weights: HybridWeights,
}

impl<'a> Default for HybridQuery<'a> {
    fn default() -> Self {
        Self {
            vector: None,
            start_node_id: None,
            node_types: None,
            edge_types: None,
            max_depth: 3,
            top_k: 10,
            threshold: 0.0,
            weights: HybridWeights::default(),
        }
    }
}

/// One fused result: the vector-phase score, the graph-phase proximity
/// score (`1 / (1 + distance)`) and hop distance, and the combined score the
/// results are ranked by.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridResult {
    pub node_id: String,
    pub vector_score: f32,
    pub graph_score: f32,
    pub distance: Option<usize>,
    pub combined_score: f32,
}

struct GraphHit {
    distance: usize,
    edge_weight: f64,
}

/// BFS out from `start` along outgoing edges, capturing per-node hop
/// distance and the accumulated edge-weight product along the path it was
/// first reached by. `edge_types`, if set, restricts which edges a hop may
/// cross.
fn bfs_graph_phase(
    store: &GraphStore,
    start: &str,
    max_depth: usize,
    edge_types: Option<&[String]>,
) -> Result<HashMap<String, GraphHit>, GraphError> {
    let edges = store.all_edges_light()?;
    let mut adjacency: HashMap<&str, Vec<(&str, &str, f64)>> = HashMap::new();
    for (from, to, edge_type, weight) in &edges {
        adjacency
            .entry(from.as_str())
            .or_default()
            .push((to.as_str(), edge_type.as_str(), *weight));
    }

    let mut hits = HashMap::new();
    hits.insert(
        start.to_string(),
        GraphHit {
            distance: 0,
            edge_weight: 1.0,
        },
    );
    let mut queue = VecDeque::new();
    queue.push_back(start.to_string());

    while let Some(current) = queue.pop_front() {
        let (depth, acc_weight) = {
            let hit = &hits[&current];
            (hit.distance, hit.edge_weight)
        };
        if depth >= max_depth {
            continue;
        }
        if let Some(neighbors) = adjacency.get(current.as_str()) {
            for &(neighbor, edge_type, weight) in neighbors {
                if let Some(types) = edge_types {
                    if !types.iter().any(|t| t == edge_type) {
                        continue;
                    }
                }
                if !hits.contains_key(neighbor) {
                    hits.insert(
                        neighbor.to_string(),
                        GraphHit {
                            distance: depth + 1,
                            edge_weight: acc_weight * weight,
                        },
                    );
                    queue.push_back(neighbor.to_string());
                }
            }
        }
    }
    Ok(hits)
}

/// The full three-phase `HybridSearch` from spec §4.9:
///
/// 1. **Vector phase** (if `query.vector` is set): scores every node,
///    filtered by `node_types`, against the query vector; keeps it if the
///    score is `>= threshold` (or `threshold` is `0.0`).
/// 2. **Graph phase** (if `query.start_node_id` is set): BFS out to
///    `max_depth` hops, filtered by `edge_types`, recording hop distance and
///    accumulated edge-weight product per reachable node.
/// 3. **Fusion**: every node seen by either phase gets
///    `combined = vector_score * w_v + graph_score * w_g`, plus
///    `edge_weight * w_e` when the node was reached via the graph phase but
///    not the vector phase. Weights are normalized first (see
///    [`HybridWeights::normalized`]).
#[tracing::instrument(skip(store, query))]
pub fn hybrid_search(store: &GraphStore, query: &HybridQuery<'_>) -> Result<Vec<HybridResult>, GraphError> {
    if let Some(start) = query.start_node_id {
        if !store.node_exists(start)? {
            return Err(GraphError::NodeNotFound { id: start.to_string() });
        }
    }
    let (w_vector, w_graph, w_edge) = query.weights.normalized();

    let mut vector_scores: HashMap<String, f32> = HashMap::new();
    if let Some(q) = query.vector {
        for node in store.get_all_nodes(&NodeFilter::default())? {
            if let Some(types) = query.node_types {
                if !types.iter().any(|t| t == &node.node_type) {
                    continue;
                }
            }
            let score = similarity::score(store.algorithm(), q, &node.vector);
            if query.threshold == 0.0 || score >= query.threshold {
                vector_scores.insert(node.id, score);
            }
        }
    }

    let graph_hits: HashMap<String, GraphHit> = if let Some(start) = query.start_node_id {
        bfs_graph_phase(store, start, query.max_depth, query.edge_types)?
    } else {
        HashMap::new()
    };

    let mut ids: HashSet<String> = vector_scores.keys().cloned().collect();
    ids.extend(graph_hits.keys().cloned());

    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let vector_score = vector_scores.get(&id).copied().unwrap_or(0.0);
        let graph_hit = graph_hits.get(&id);
        let graph_score = graph_hit
            .map(|hit| 1.0 / (1.0 + hit.distance as f32))
            .unwrap_or(0.0);

        let mut combined_score = vector_score * w_vector + graph_score * w_graph;
        if let Some(hit) = graph_hit {
            if !vector_scores.contains_key(&id) {
                combined_score += hit.edge_weight as f32 * w_edge;
            }
        }

        results.push(HybridResult {
            node_id: id,
            vector_score,
            graph_score,
            distance: graph_hit.map(|hit| hit.distance),
            combined_score,
        });
    }
    results.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(query.top_k);
    Ok(results)
}

fn bfs_depths(store: &GraphStore, start: &str, hops: usize, direction: Direction) -> Result<HashMap<String, usize>, GraphError> {
    let edges = store.all_edges_light()?;
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to, _, _) in &edges {
        match direction {
            Direction::Out => adjacency.entry(from.as_str()).or_default().push(to.as_str()),
            Direction::In => adjacency.entry(to.as_str()).or_default().push(from.as_str()),
            Direction::Both => {
                adjacency.entry(from.as_str()).or_default().push(to.as_str());
                adjacency.entry(to.as_str()).or_default().push(from.as_str());
            }
        }
    }

    let mut depths = HashMap::new();
    depths.insert(start.to_string(), 0usize);
    let mut queue = VecDeque::new();
    queue.push_back(start.to_string());
    while let Some(current) = queue.pop_front() {
        let depth = depths[&current];
        if depth >= hops {
            continue;
        }
        if let Some(neighbors) = adjacency.get(current.as_str()) {
            for &neighbor in neighbors {
                if !depths.contains_key(neighbor) {
                    depths.insert(neighbor.to_string(), depth + 1);
                    queue.push_back(neighbor.to_string());
                }
            }
        }
    }
    Ok(depths)
}

/// Pure vector similarity search restricted to the induced subgraph reachable
/// from `anchor_node_id` within `hops`, e.g. "find the best match among this
/// node's neighborhood" rather than the whole store.
#[tracing::instrument(skip(store, query))]
pub fn graph_vector_search(
    store: &GraphStore,
    query: &[f32],
    anchor_node_id: &str,
    hops: usize,
    top_k: usize,
) -> Result<Vec<(String, f32)>, GraphError> {
    if !store.node_exists(anchor_node_id)? {
        return Err(GraphError::NodeNotFound {
            id: anchor_node_id.to_string(),
        });
    }
    let depths = bfs_depths(store, anchor_node_id, hops, Direction::Both)?;
    let mut scored = Vec::with_capacity(depths.len());
    for node_id in depths.keys() {
        if let Some(vector) = store.node_vector(node_id)? {
            scored.push((node_id.clone(), similarity::score(store.algorithm(), query, &vector)));
        }
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}

/// "More like this node": vector similarity search seeded with `node_id`'s
/// own embedding, excluding itself. Uses the optional HNSW acceleration
/// index when [`GraphStore::enable_hnsw_acceleration`] has been called,
/// otherwise falls back to an exact brute-force scan.
#[tracing::instrument(skip(store))]
pub fn similarity_in_graph(store: &GraphStore, node_id: &str, top_k: usize) -> Result<Vec<(String, f32)>, GraphError> {
    let Some(query) = store.node_vector(node_id)? else {
        return Err(GraphError::NodeNotFound {
            id: node_id.to_string(),
        });
    };

    if let Some(hnsw) = store.hnsw() {
        use similarity::VectorIndex;
        let hits = hnsw.search(&query, top_k + 1)?;
        return Ok(hits
            .into_iter()
            .filter(|hit| hit.id != node_id)
            .take(top_k)
            .map(|hit| (hit.id, hit.score))
            .collect());
    }

    let mut scored: Vec<(String, f32)> = store
        .all_node_vectors()?
        .into_iter()
        .filter(|(id, _)| id != node_id)
        .map(|(id, vector)| (id, similarity::score(store.algorithm(), &query, &vector)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::{Algorithm, GraphEdge, GraphNode, Properties};

    fn build_store() -> GraphStore {
        let store = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        store
            .upsert_node(&GraphNode::new("anchor", vec![1.0, 0.0], "", "", Properties::new()).unwrap())
            .unwrap();
        store
            .upsert_node(&GraphNode::new("near", vec![0.9, 0.1], "", "", Properties::new()).unwrap())
            .unwrap();
        store
            .upsert_node(&GraphNode::new("far", vec![-1.0, 0.0], "", "", Properties::new()).unwrap())
            .unwrap();
        store
            .upsert_edge(&GraphEdge::new("e0", "anchor", "near", "link", 1.0, Properties::new(), None).unwrap())
            .unwrap();
        store
    }

    /// Scenario S3 from spec §8: four docs, doc1 anchored with two outgoing
    /// edges (doc1->doc2 weight 0.9, doc1->doc4 weight 0.5) and one further
    /// hop (doc2->doc3 weight 0.7).
    fn build_s3_store() -> GraphStore {
        let store = GraphStore::open_in_memory(3, Algorithm::CosineSimilarity).unwrap();
        for (id, vector) in [
            ("doc1", vec![1.0, 0.0, 0.0]),
            ("doc2", vec![0.9, 0.1, 0.0]),
            ("doc3", vec![0.0, 1.0, 0.0]),
            ("doc4", vec![0.0, 0.0, 1.0]),
        ] {
            store
                .upsert_node(&GraphNode::new(id, vector, "", "doc", Properties::new()).unwrap())
                .unwrap();
        }
        store
            .upsert_edge(&GraphEdge::new("e1", "doc1", "doc2", "related", 0.9, Properties::new(), None).unwrap())
            .unwrap();
        store
            .upsert_edge(&GraphEdge::new("e2", "doc2", "doc3", "related", 0.7, Properties::new(), None).unwrap())
            .unwrap();
        store
            .upsert_edge(&GraphEdge::new("e3", "doc1", "doc4", "cites", 0.5, Properties::new(), None).unwrap())
            .unwrap();
        store
    }

    #[test]
    fn hybrid_search_matches_scenario_s3() {
        let store = build_s3_store();
        let query = HybridQuery {
            vector: Some(&[1.0, 0.0, 0.0]),
            start_node_id: Some("doc1"),
            max_depth: 2,
            top_k: 4,
            weights: HybridWeights {
                vector: 0.5,
                graph: 0.3,
                edge: 0.2,
            },
            ..Default::default()
        };
        let results = hybrid_search(&store, &query).unwrap();
        assert_eq!(results[0].node_id, "doc1");
        assert!((results[0].vector_score - 1.0).abs() < 1e-6);
        assert!((results[0].graph_score - 1.0).abs() < 1e-6);
        assert_eq!(results[0].distance, Some(0));

        let doc2 = results.iter().find(|r| r.node_id == "doc2").unwrap();
        assert!((doc2.graph_score - 0.5).abs() < 1e-6);
        assert_eq!(doc2.distance, Some(1));
        assert!(doc2.vector_score > 0.0);
    }

    #[test]
    fn hybrid_search_works_without_a_graph_anchor() {
        let store = build_store();
        let query = HybridQuery {
            vector: Some(&[1.0, 0.0]),
            top_k: 10,
            ..Default::default()
        };
        let results = hybrid_search(&store, &query).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.node_id.as_str()).collect();
        assert!(ids.contains(&"anchor"));
        assert!(ids.contains(&"near"));
        assert!(ids.contains(&"far"));
        assert_eq!(results[0].node_id, "anchor");
    }

    #[test]
    fn hybrid_search_works_without_a_query_vector() {
        let store = build_store();
        let query = HybridQuery {
            start_node_id: Some("anchor"),
            max_depth: 1,
            top_k: 10,
            ..Default::default()
        };
        let results = hybrid_search(&store, &query).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.node_id.as_str()).collect();
        assert!(ids.contains(&"anchor"));
        assert!(ids.contains(&"near"));
        assert!(!ids.contains(&"far"));
    }

    #[test]
    fn hybrid_search_normalizes_nonzero_weights() {
        let store = build_s3_store();
        let unnormalized = HybridQuery {
            vector: Some(&[1.0, 0.0, 0.0]),
            start_node_id: Some("doc1"),
            max_depth: 2,
            top_k: 4,
            weights: HybridWeights {
                vector: 5.0,
                graph: 3.0,
                edge: 2.0,
            },
            ..Default::default()
        };
        let mut normalized = unnormalized.clone();
        normalized.weights = HybridWeights {
            vector: 0.5,
            graph: 0.3,
            edge: 0.2,
        };
        let a = hybrid_search(&store, &unnormalized).unwrap();
        let b = hybrid_search(&store, &normalized).unwrap();
        for (ra, rb) in a.iter().zip(b.iter()) {
            assert_eq!(ra.node_id, rb.node_id);
            assert!((ra.combined_score - rb.combined_score).abs() < 1e-6);
        }
    }

    #[test]
    fn similarity_in_graph_excludes_self() {
        let store = build_store();
        let results = similarity_in_graph(&store, "anchor", 10).unwrap();
        assert!(results.iter().all(|(id, _)| id != "anchor"));
        assert_eq!(results[0].0, "near");
    }

    #[test]
    fn graph_vector_search_rejects_unknown_anchor() {
        let store = build_store();
        assert!(graph_vector_search(&store, &[1.0, 0.0], "missing", 1, 5).is_err());
    }
}
