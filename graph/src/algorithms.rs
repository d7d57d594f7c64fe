//! Whole-graph algorithms: PageRank, community detection, edge prediction,
//! and summary statistics. All pull the full edge/node set into memory via
//! [`GraphStore::all_edges_light`]/[`GraphStore::all_node_vectors`].

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::store::GraphStore;

/// Below this score, [`predict_edges`] drops a candidate rather than
/// surfacing a near-zero-confidence suggestion.
const EDGE_PREDICTION_THRESHOLD: f64 = 0.5;

/// One [`predict_edges`] suggestion: a candidate node id, its score, and
/// which of the two scoring methods produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePrediction {
    pub candidate_id: String,
    pub score: f64,
    pub method: &'static str,
}

/// Weighted PageRank over the directed edge set.
///
/// Dangling (no-outgoing-edge) nodes' rank mass is *not* redistributed
/// across the rest of the graph each iteration; it simply leaves the system,
/// which is a deliberate simplification over the textbook algorithm rather
/// than an oversight — see the design notes for the reasoning.
#[tracing::instrument(skip(store))]
pub fn pagerank(
    store: &GraphStore,
    damping: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Result<HashMap<String, f64>, GraphError> {
    let nodes = store.all_node_vectors()?;
    let edges = store.all_edges_light()?;
    let n = nodes.len();
    if n == 0 {
        return Ok(HashMap::new());
    }

    let mut out_weight: HashMap<&str, f64> = HashMap::new();
    let mut incoming: HashMap<&str, Vec<(&str, f64)>> = HashMap::new();
    for (from, to, _, weight) in &edges {
        *out_weight.entry(from.as_str()).or_insert(0.0) += weight.max(0.0);
        incoming.entry(to.as_str()).or_default().push((from.as_str(), weight.max(0.0)));
    }

    let base = (1.0 - damping) / n as f64;
    let mut ranks: HashMap<String, f64> = nodes.iter().map(|(id, _)| (id.clone(), 1.0 / n as f64)).collect();

    for _ in 0..max_iterations {
        let mut next: HashMap<String, f64> = HashMap::with_capacity(n);
        let mut max_delta: f64 = 0.0;
        for (id, _) in &nodes {
            let mut inbound_sum = 0.0;
            if let Some(sources) = incoming.get(id.as_str()) {
                for (source, weight) in sources {
                    let source_out = out_weight.get(source).copied().unwrap_or(0.0);
                    if source_out > 0.0 {
                        inbound_sum += ranks[*source] * weight / source_out;
                    }
                }
            }
            let value = base + damping * inbound_sum;
            max_delta = max_delta.max((value - ranks[id]).abs());
            next.insert(id.clone(), value);
        }
        ranks = next;
        if max_delta < tolerance {
            break;
        }
    }
    Ok(ranks)
}

/// One community from [`detect_communities`]: its members and
/// `|members| / node_count`, deliberately not a modularity score — see the
/// function doc comment.
#[derive(Debug, Clone, PartialEq)]
pub struct Community {
    pub members: Vec<String>,
    pub score: f64,
}

/// Simplified Louvain: builds an undirected weighted adjacency (parallel
/// edges and both directions summed), starts every node in its own
/// community, then for up to 100 sweeps moves each node to whichever
/// neighboring community has the greatest total edge weight, as long as
/// that weight exceeds the node's own current community's weight. This is
/// deliberately *not* modularity-gain optimization and never aggregates
/// communities into super-nodes for a second pass: it mirrors the
/// documented lossy scoring (`|community| / node_count`) rather than
/// computing true modularity, since bit-for-bit fidelity to that scoring
/// was chosen over a theoretically stronger partition.
#[tracing::instrument(skip(store))]
pub fn detect_communities(store: &GraphStore) -> Result<Vec<Community>, GraphError> {
    let nodes = store.all_node_vectors()?;
    let n = nodes.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let edges = store.all_edges_light()?;

    let mut neighbor_weight: HashMap<&str, HashMap<&str, f64>> = HashMap::new();
    for (from, to, _, weight) in &edges {
        let w = weight.max(0.0);
        *neighbor_weight.entry(from.as_str()).or_default().entry(to.as_str()).or_insert(0.0) += w;
        *neighbor_weight.entry(to.as_str()).or_default().entry(from.as_str()).or_insert(0.0) += w;
    }

    let mut community: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.clone(), i))
        .collect();

    for _sweep in 0..100 {
        let mut moved = false;
        for (id, _) in &nodes {
            let current_c = community[id];
            let mut weight_by_community: HashMap<usize, f64> = HashMap::new();
            if let Some(neighbors) = neighbor_weight.get(id.as_str()) {
                for (neighbor, w) in neighbors {
                    let c = community[*neighbor];
                    *weight_by_community.entry(c).or_insert(0.0) += w;
                }
            }
            let self_weight = weight_by_community.get(&current_c).copied().unwrap_or(0.0);

            let mut best_c = current_c;
            let mut best_weight = self_weight;
            for (&c, &w) in &weight_by_community {
                if w > best_weight {
                    best_weight = w;
                    best_c = c;
                }
            }

            if best_c != current_c && best_weight > self_weight {
                community.insert(id.clone(), best_c);
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    let mut grouped: HashMap<usize, Vec<String>> = HashMap::new();
    for (id, c) in community {
        grouped.entry(c).or_default().push(id);
    }
    let mut communities: Vec<Community> = grouped
        .into_values()
        .map(|mut members| {
            members.sort();
            Community {
                score: members.len() as f64 / n as f64,
                members,
            }
        })
        .collect();
    communities.sort_by(|a, b| b.members.len().cmp(&a.members.len()).then_with(|| a.members[0].cmp(&b.members[0])));
    Ok(communities)
}

/// Candidate edges for nodes not already directly connected to `node_id`.
/// Each candidate is scored by the max of (a) vector cosine similarity with
/// the source and (b) `(sim + cn_fraction) / 2` when the pair has at least
/// one common neighbor, where `cn_fraction = common / (|neighbors(src)| +
/// 1)`. Candidates scoring at or below [`EDGE_PREDICTION_THRESHOLD`] are
/// dropped before truncating to `top_k`.
#[tracing::instrument(skip(store))]
pub fn predict_edges(store: &GraphStore, node_id: &str, top_k: usize) -> Result<Vec<EdgePrediction>, GraphError> {
    if !store.node_exists(node_id)? {
        return Err(GraphError::NodeNotFound {
            id: node_id.to_string(),
        });
    }
    let edges = store.all_edges_light()?;
    let vectors = store.all_node_vectors()?;
    let vector_by_id: HashMap<&str, &[f32]> = vectors.iter().map(|(id, v)| (id.as_str(), v.as_slice())).collect();

    let mut undirected: HashMap<&str, HashSet<&str>> = HashMap::new();
    for (from, to, _, _) in &edges {
        undirected.entry(from.as_str()).or_default().insert(to.as_str());
        undirected.entry(to.as_str()).or_default().insert(from.as_str());
    }

    let empty = HashSet::new();
    let own_neighbors = undirected.get(node_id).unwrap_or(&empty);
    let source_vector = vector_by_id.get(node_id).copied().unwrap_or(&[]);

    let mut scored: Vec<EdgePrediction> = Vec::new();
    for (id, _) in &vectors {
        let candidate = id.as_str();
        if candidate == node_id || own_neighbors.contains(candidate) {
            continue;
        }
        let candidate_vector = vector_by_id.get(candidate).copied().unwrap_or(&[]);
        let vector_similarity = similarity::distance::cosine_similarity(source_vector, candidate_vector) as f64;

        let candidate_neighbors = undirected.get(candidate).unwrap_or(&empty);
        let common = own_neighbors.intersection(candidate_neighbors).count();

        let (score, method) = if common > 0 {
            let cn_fraction = common as f64 / (own_neighbors.len() as f64 + 1.0);
            let combined = (vector_similarity + cn_fraction) / 2.0;
            if combined >= vector_similarity {
                (combined, "combined")
            } else {
                (vector_similarity, "vector_similarity")
            }
        } else {
            (vector_similarity, "vector_similarity")
        };

        if score > EDGE_PREDICTION_THRESHOLD {
            scored.push(EdgePrediction {
                candidate_id: candidate.to_string(),
                score,
                method,
            });
        }
    }
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.candidate_id.cmp(&b.candidate_id)));
    scored.truncate(top_k);
    Ok(scored)
}

/// Basic summary statistics over the whole graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub average_degree: f64,
    pub density: f64,
    pub connected_components: usize,
}

/// Number of connected components over the undirected adjacency (a node
/// with no edges is its own component).
fn count_connected_components(node_ids: &[String], edges: &[(String, String, String, f64)]) -> usize {
    let mut undirected: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to, _, _) in edges {
        undirected.entry(from.as_str()).or_default().push(to.as_str());
        undirected.entry(to.as_str()).or_default().push(from.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut components = 0;
    for id in node_ids {
        if visited.contains(id.as_str()) {
            continue;
        }
        components += 1;
        visited.insert(id.as_str());
        let mut queue = VecDeque::new();
        queue.push_back(id.as_str());
        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = undirected.get(current) {
                for &neighbor in neighbors {
                    if visited.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
    }
    components
}

#[tracing::instrument(skip(store))]
pub fn statistics(store: &GraphStore) -> Result<GraphStatistics, GraphError> {
    let node_count = store.node_count()?;
    let edge_count = store.edge_count()?;
    let average_degree = if node_count == 0 {
        0.0
    } else {
        2.0 * edge_count as f64 / node_count as f64
    };
    let density = if node_count < 2 {
        0.0
    } else {
        edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
    };
    let node_ids: Vec<String> = store.all_node_vectors()?.into_iter().map(|(id, _)| id).collect();
    let edges = store.all_edges_light()?;
    let connected_components = count_connected_components(&node_ids, &edges);
    Ok(GraphStatistics {
        node_count,
        edge_count,
        average_degree,
        density,
        connected_components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::{Algorithm, GraphEdge, GraphNode, Properties};

    fn star_graph() -> GraphStore {
        let store = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        for id in ["hub", "a", "b", "c"] {
            store
                .upsert_node(&GraphNode::new(id, vec![1.0, 0.0], "", "", Properties::new()).unwrap())
                .unwrap();
        }
        for (i, leaf) in ["a", "b", "c"].into_iter().enumerate() {
            store
                .upsert_edge(&GraphEdge::new(format!("e{i}"), "hub", leaf, "link", 1.0, Properties::new(), None).unwrap())
                .unwrap();
        }
        store
    }

    #[test]
    fn pagerank_ranks_hub_highest() {
        let store = star_graph();
        let ranks = pagerank(&store, 0.85, 50, 1e-8).unwrap();
        let hub = ranks["hub"];
        for leaf in ["a", "b", "c"] {
            assert!(hub >= ranks[leaf], "hub should rank >= leaf {leaf}");
        }
    }

    #[test]
    fn statistics_match_inserted_shape() {
        let store = star_graph();
        let stats = statistics(&store).unwrap();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.connected_components, 1);
    }

    #[test]
    fn statistics_counts_isolated_node_as_its_own_component() {
        let store = star_graph();
        store
            .upsert_node(&GraphNode::new("isolated", vec![1.0, 0.0], "", "", Properties::new()).unwrap())
            .unwrap();
        let stats = statistics(&store).unwrap();
        assert_eq!(stats.node_count, 5);
        assert_eq!(stats.connected_components, 2);
    }

    #[test]
    fn predict_edges_rejects_unknown_node() {
        let store = star_graph();
        assert!(predict_edges(&store, "missing", 5).is_err());
    }

    #[test]
    fn predict_edges_suggests_shared_neighbor_leaves() {
        let store = star_graph();
        let predictions = predict_edges(&store, "a", 5).unwrap();
        let ids: Vec<&str> = predictions.iter().map(|p| p.candidate_id.as_str()).collect();
        assert!(ids.contains(&"b") || ids.contains(&"c"));
    }

    #[test]
    fn detect_communities_assigns_every_node() {
        let store = star_graph();
        let communities = detect_communities(&store).unwrap();
        let total_members: usize = communities.iter().map(|c| c.members.len()).sum();
        assert_eq!(total_members, 4);
        for community in &communities {
            assert_eq!(community.score, community.members.len() as f64 / 4.0);
        }
    }
}
