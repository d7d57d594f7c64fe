//! Graph walks: BFS neighbor listing, BFS shortest path, connected-component
//! membership, and bounded subgraph extraction. All operate on the adjacency
//! pulled wholesale from [`GraphStore::all_edges_light`]/[`GraphStore::all_edges_with_id`],
//! since a single embedded store's edge set is expected to fit comfortably in
//! memory.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::store::{Direction, GraphStore};

/// Adjacency list keyed by node id, built once per call and reused across the
/// walk. `out[node]` holds `(neighbor, edge_type, weight)` for outgoing
/// edges; `inbound` mirrors it for incoming ones.
struct Adjacency {
    out: HashMap<String, Vec<(String, String, f64)>>,
    inbound: HashMap<String, Vec<(String, String, f64)>>,
}

impl Adjacency {
    fn build(edges: &[(String, String, String, f64)]) -> Self {
        let mut out: HashMap<String, Vec<(String, String, f64)>> = HashMap::new();
        let mut inbound: HashMap<String, Vec<(String, String, f64)>> = HashMap::new();
        for (from, to, edge_type, weight) in edges {
            out.entry(from.clone())
                .or_default()
                .push((to.clone(), edge_type.clone(), *weight));
            inbound
                .entry(to.clone())
                .or_default()
                .push((from.clone(), edge_type.clone(), *weight));
        }
        Self { out, inbound }
    }

    fn neighbors(&self, node: &str, direction: Direction) -> Vec<(String, String, f64)> {
        match direction {
            Direction::Out => self.out.get(node).cloned().unwrap_or_default(),
            Direction::In => self.inbound.get(node).cloned().unwrap_or_default(),
            Direction::Both => {
                let mut v = self.out.get(node).cloned().unwrap_or_default();
                v.extend(self.inbound.get(node).cloned().unwrap_or_default());
                v
            }
        }
    }
}

/// Options accepted by [`neighbors`]: how far to walk, which edge/node types
/// to keep, which direction to follow, and an overall result cap.
#[derive(Debug, Clone)]
pub struct NeighborOptions {
    /// Hop bound, treated as `1` when `0` per spec ("max_depth ≤ 0").
    pub max_depth: usize,
    pub edge_types: Option<Vec<String>>,
    pub node_types: Option<Vec<String>>,
    pub direction: Direction,
    pub limit: Option<usize>,
}

impl Default for NeighborOptions {
    fn default() -> Self {
        Self {
            max_depth: 1,
            edge_types: None,
            node_types: None,
            direction: Direction::Out,
            limit: None,
        }
    }
}

/// One hop of [`neighbors`]: the node reached, the edge it was reached
/// through, and how many hops from the start it sits at.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborHop {
    pub node_id: String,
    pub edge_type: String,
    pub weight: f64,
    pub depth: usize,
}

/// BFS out to `opts.max_depth` hops from `node_id`, skipping already-visited
/// ids (no cycles), filtering by edge type and node type, and stopping early
/// once `opts.limit` matches have been collected.
#[tracing::instrument(skip(store, opts))]
pub fn neighbors(store: &GraphStore, node_id: &str, opts: &NeighborOptions) -> Result<Vec<NeighborHop>, GraphError> {
    if !store.node_exists(node_id)? {
        return Err(GraphError::NodeNotFound {
            id: node_id.to_string(),
        });
    }
    let max_depth = if opts.max_depth == 0 { 1 } else { opts.max_depth };
    let edges = store.all_edges_light()?;
    let adjacency = Adjacency::build(&edges);
    let node_type_by_id: HashMap<String, String> = if opts.node_types.is_some() {
        store.all_node_types()?.into_iter().collect()
    } else {
        HashMap::new()
    };

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(node_id.to_string());
    let mut frontier = vec![node_id.to_string()];
    let mut out = Vec::new();

    'walk: for depth in 1..=max_depth {
        let mut next_frontier = Vec::new();
        for current in &frontier {
            for (neighbor, edge_type, weight) in adjacency.neighbors(current, opts.direction) {
                if visited.contains(&neighbor) {
                    continue;
                }
                if let Some(types) = &opts.edge_types {
                    if !types.iter().any(|t| t == &edge_type) {
                        continue;
                    }
                }
                if let Some(types) = &opts.node_types {
                    let node_type = node_type_by_id.get(&neighbor).map(String::as_str).unwrap_or("");
                    if !types.iter().any(|t| t == node_type) {
                        continue;
                    }
                }
                visited.insert(neighbor.clone());
                next_frontier.push(neighbor.clone());
                out.push(NeighborHop {
                    node_id: neighbor,
                    edge_type,
                    weight,
                    depth,
                });
                if opts.limit.is_some_and(|limit| out.len() >= limit) {
                    break 'walk;
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }
    Ok(out)
}

/// Result of [`shortest_path`]: the node sequence (including both
/// endpoints), the edge ids walked, and the hop count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathResult {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
    pub distance: usize,
}

/// BFS shortest path between two nodes, unweighted (fewest hops).
#[tracing::instrument(skip(store))]
pub fn shortest_path(store: &GraphStore, from: &str, to: &str, direction: Direction) -> Result<PathResult, GraphError> {
    if !store.node_exists(from)? {
        return Err(GraphError::NodeNotFound { id: from.to_string() });
    }
    if !store.node_exists(to)? {
        return Err(GraphError::NodeNotFound { id: to.to_string() });
    }
    if from == to {
        return Ok(PathResult {
            nodes: vec![from.to_string()],
            edges: Vec::new(),
            distance: 0,
        });
    }

    let edges = store.all_edges_with_id()?;
    let mut out: HashMap<String, Vec<(String, String)>> = HashMap::new();
    let mut inbound: HashMap<String, Vec<(String, String)>> = HashMap::new();
    for (id, from_n, to_n, _edge_type, _weight) in &edges {
        out.entry(from_n.clone()).or_default().push((to_n.clone(), id.clone()));
        inbound.entry(to_n.clone()).or_default().push((from_n.clone(), id.clone()));
    }
    let edge_neighbors = |node: &str, dir: Direction| -> Vec<(String, String)> {
        match dir {
            Direction::Out => out.get(node).cloned().unwrap_or_default(),
            Direction::In => inbound.get(node).cloned().unwrap_or_default(),
            Direction::Both => {
                let mut v = out.get(node).cloned().unwrap_or_default();
                v.extend(inbound.get(node).cloned().unwrap_or_default());
                v
            }
        }
    };

    let mut visited: HashSet<String> = HashSet::new();
    let mut parent: HashMap<String, (String, String)> = HashMap::new();
    let mut queue = VecDeque::new();
    visited.insert(from.to_string());
    queue.push_back(from.to_string());

    while let Some(current) = queue.pop_front() {
        for (neighbor, edge_id) in edge_neighbors(&current, direction) {
            if visited.contains(&neighbor) {
                continue;
            }
            visited.insert(neighbor.clone());
            parent.insert(neighbor.clone(), (current.clone(), edge_id));
            if neighbor == to {
                let mut nodes = vec![neighbor.clone()];
                let mut path_edges = Vec::new();
                let mut cursor = neighbor;
                while let Some((p, edge_id)) = parent.get(&cursor) {
                    nodes.push(p.clone());
                    path_edges.push(edge_id.clone());
                    cursor = p.clone();
                }
                nodes.reverse();
                path_edges.reverse();
                let distance = path_edges.len();
                return Ok(PathResult {
                    nodes,
                    edges: path_edges,
                    distance,
                });
            }
            queue.push_back(neighbor);
        }
    }
    Err(GraphError::NoPath {
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// All node ids reachable from `start` (inclusive), following `direction`.
#[tracing::instrument(skip(store))]
pub fn connected(store: &GraphStore, start: &str, direction: Direction) -> Result<Vec<String>, GraphError> {
    if !store.node_exists(start)? {
        return Err(GraphError::NodeNotFound {
            id: start.to_string(),
        });
    }
    let edges = store.all_edges_light()?;
    let adjacency = Adjacency::build(&edges);

    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(start.to_string());
    queue.push_back(start.to_string());

    while let Some(current) = queue.pop_front() {
        for (neighbor, _, _) in adjacency.neighbors(&current, direction) {
            if visited.insert(neighbor.clone()) {
                queue.push_back(neighbor);
            }
        }
    }
    let mut out: Vec<String> = visited.into_iter().collect();
    out.sort();
    Ok(out)
}

/// Induced subgraph of nodes within `hops` hops of `start`: the node ids and
/// the edges whose both endpoints are in that set.
#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    pub node_ids: Vec<String>,
    pub edges: Vec<(String, String, String, f64)>,
}

#[tracing::instrument(skip(store))]
pub fn subgraph(
    store: &GraphStore,
    start: &str,
    hops: usize,
    direction: Direction,
) -> Result<Subgraph, GraphError> {
    if !store.node_exists(start)? {
        return Err(GraphError::NodeNotFound {
            id: start.to_string(),
        });
    }
    let edges = store.all_edges_light()?;
    let adjacency = Adjacency::build(&edges);

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.to_string());
    let mut frontier = vec![start.to_string()];
    for _ in 0..hops {
        let mut next_frontier = Vec::new();
        for node in &frontier {
            for (neighbor, _, _) in adjacency.neighbors(node, direction) {
                if visited.insert(neighbor.clone()) {
                    next_frontier.push(neighbor);
                }
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() {
            break;
        }
    }

    let included_edges = edges
        .into_iter()
        .filter(|(from, to, _, _)| visited.contains(from) && visited.contains(to))
        .collect();
    let mut node_ids: Vec<String> = visited.into_iter().collect();
    node_ids.sort();
    Ok(Subgraph {
        node_ids,
        edges: included_edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::{Algorithm, GraphEdge, GraphNode, Properties};

    fn build_line_graph() -> GraphStore {
        let store = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        for id in ["a", "b", "c", "d"] {
            store
                .upsert_node(&GraphNode::new(id, vec![1.0, 0.0], "", "", Properties::new()).unwrap())
                .unwrap();
        }
        for (i, (from, to)) in [("a", "b"), ("b", "c"), ("c", "d")].into_iter().enumerate() {
            store
                .upsert_edge(&GraphEdge::new(format!("e{i}"), from, to, "next", 1.0, Properties::new(), None).unwrap())
                .unwrap();
        }
        store
    }

    #[test]
    fn shortest_path_follows_fewest_hops() {
        let store = build_line_graph();
        let path = shortest_path(&store, "a", "d", Direction::Out).unwrap();
        assert_eq!(path.nodes, vec!["a", "b", "c", "d"]);
        assert_eq!(path.edges, vec!["e0", "e1", "e2"]);
        assert_eq!(path.distance, 3);
    }

    #[test]
    fn shortest_path_self_is_trivial() {
        let store = build_line_graph();
        let path = shortest_path(&store, "a", "a", Direction::Out).unwrap();
        assert_eq!(
            path,
            PathResult {
                nodes: vec!["a".to_string()],
                edges: Vec::new(),
                distance: 0,
            }
        );
    }

    #[test]
    fn shortest_path_missing_in_wrong_direction() {
        let store = build_line_graph();
        assert!(matches!(
            shortest_path(&store, "d", "a", Direction::Out).unwrap_err(),
            GraphError::NoPath { .. }
        ));
    }

    #[test]
    fn connected_reaches_whole_chain_with_both_direction() {
        let store = build_line_graph();
        let reached = connected(&store, "c", Direction::Both).unwrap();
        assert_eq!(reached, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn subgraph_respects_hop_bound() {
        let store = build_line_graph();
        let sub = subgraph(&store, "a", 1, Direction::Out).unwrap();
        assert_eq!(sub.node_ids, vec!["a", "b"]);
        assert_eq!(sub.edges.len(), 1);
    }

    #[test]
    fn neighbors_filters_by_edge_type() {
        let store = build_line_graph();
        store
            .upsert_edge(&GraphEdge::new("e-other", "a", "d", "shortcut", 1.0, Properties::new(), None).unwrap())
            .unwrap();
        let opts = NeighborOptions {
            edge_types: Some(vec!["shortcut".to_string()]),
            ..Default::default()
        };
        let hops = neighbors(&store, "a", &opts).unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].node_id, "d");
        assert_eq!(hops[0].depth, 1);
    }

    #[test]
    fn neighbors_walks_multiple_hops_and_skips_visited() {
        let store = build_line_graph();
        let opts = NeighborOptions {
            max_depth: 3,
            direction: Direction::Out,
            ..Default::default()
        };
        let hops = neighbors(&store, "a", &opts).unwrap();
        let by_depth: Vec<(usize, &str)> = hops.iter().map(|h| (h.depth, h.node_id.as_str())).collect();
        assert_eq!(by_depth, vec![(1, "b"), (2, "c"), (3, "d")]);
    }

    #[test]
    fn neighbors_zero_max_depth_treated_as_one() {
        let store = build_line_graph();
        let opts = NeighborOptions {
            max_depth: 0,
            direction: Direction::Out,
            ..Default::default()
        };
        let hops = neighbors(&store, "a", &opts).unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].node_id, "b");
    }

    #[test]
    fn neighbors_respects_limit_and_node_type_filter() {
        let store = build_line_graph();
        store
            .upsert_node(&GraphNode::new("e", vec![1.0, 0.0], "", "special", Properties::new()).unwrap())
            .unwrap();
        store
            .upsert_edge(&GraphEdge::new("e-extra", "a", "e", "next", 1.0, Properties::new(), None).unwrap())
            .unwrap();
        let opts = NeighborOptions {
            max_depth: 1,
            node_types: Some(vec!["special".to_string()]),
            direction: Direction::Out,
            limit: Some(1),
            ..Default::default()
        };
        let hops = neighbors(&store, "a", &opts).unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].node_id, "e");
    }
}
