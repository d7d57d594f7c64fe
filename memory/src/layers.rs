//! The four memory layers (mental model / observation / world fact /
//! experience), stored as graph nodes whose id is
//! [`MemoryLayer::node_id`] and whose `user_id`/`fact_id` live in
//! `properties` for filtering. Each function here is a thin, explicit
//! operation over a shared [`graph::GraphStore`] rather than a method on a
//! wrapper type, matching how [`graph::traversal`]/[`graph::algorithms`]
//! are shaped.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use graph::{BatchResult, Direction, GraphStore, NodeFilter};
use types::{GraphEdge, GraphNode, MemoryLayer, Properties, PropertyValue};

use crate::error::MemoryError;

const USER_ID_KEY: &str = "user_id";
const FACT_ID_KEY: &str = "fact_id";

/// A fact as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFact {
    pub node_id: String,
    pub fact_id: String,
    pub user_id: String,
    pub layer: MemoryLayer,
    pub content: String,
    pub vector: Option<Vec<f32>>,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryFact {
    fn from_node(node: GraphNode) -> Option<Self> {
        let layer = MemoryLayer::from_str(&node.node_type)?;
        let user_id = node
            .properties
            .get(USER_ID_KEY)
            .and_then(PropertyValue::as_str)
            .unwrap_or_default()
            .to_string();
        let fact_id = node
            .properties
            .get(FACT_ID_KEY)
            .and_then(PropertyValue::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            node_id: node.id,
            fact_id,
            user_id,
            layer,
            content: node.content,
            vector: Some(node.vector).filter(|v| !v.iter().all(|x| *x == 0.0)),
            properties: node.properties,
            created_at: node.created_at,
            updated_at: node.updated_at,
        })
    }
}

const TIME_REF_KEY: &str = "time_ref";
const MEMORY_LAYER_KEY: &str = "memory_layer";

/// Injects `user_id`/`fact_id`/`memory_layer` unconditionally and
/// `time_ref` only if the caller did not already set one, so tests (and
/// `Consolidate`, which wants to control its own synthesis timestamp) can
/// still pin a specific instant.
fn tag_properties(mut properties: Properties, user_id: &str, fact_id: &str, layer: MemoryLayer) -> Properties {
    properties.insert(USER_ID_KEY.to_string(), user_id.into());
    properties.insert(FACT_ID_KEY.to_string(), fact_id.into());
    properties.insert(MEMORY_LAYER_KEY.to_string(), layer.as_str().into());
    properties.entry(TIME_REF_KEY.to_string()).or_insert_with(|| Utc::now().to_rfc3339().into());
    properties
}

/// Explicitly stores a fact in a named layer, upserting if `fact_id` was
/// already used for this `user_id`/layer combination.
#[tracing::instrument(skip(store, content, vector, properties))]
pub fn store_fact(
    store: &GraphStore,
    user_id: &str,
    fact_id: &str,
    layer: MemoryLayer,
    content: &str,
    vector: &[f32],
    properties: Properties,
) -> Result<MemoryFact, MemoryError> {
    if content.trim().is_empty() {
        return Err(MemoryError::EmptyContent);
    }
    let node_id = layer.node_id(user_id, fact_id);
    let properties = tag_properties(properties, user_id, fact_id, layer);
    let node = GraphNode::new(node_id, vector.to_vec(), content, layer.as_str(), properties)?;
    store.upsert_node(&node)?;
    let stored = store.get_node(&node.id)?;
    MemoryFact::from_node(stored).ok_or_else(|| MemoryError::UnknownLayer {
        layer: layer.as_str().to_string(),
    })
}

/// Retains a raw observation without the caller having to pick a fact id or
/// layer: it is filed under [`MemoryLayer::Experience`] with a content-hash
/// fact id, so retaining the same text twice for the same user upserts
/// rather than duplicating.
#[tracing::instrument(skip(store, content, vector))]
pub fn retain(
    store: &GraphStore,
    user_id: &str,
    content: &str,
    vector: &[f32],
) -> Result<MemoryFact, MemoryError> {
    if content.trim().is_empty() {
        return Err(MemoryError::EmptyContent);
    }
    let fact_id = blake3::hash(content.as_bytes()).to_hex().to_string();
    store_fact(store, user_id, &fact_id, MemoryLayer::Experience, content, vector, Properties::new())
}

/// Links two facts with a typed, weighted edge, e.g. `"supports"` or
/// `"contradicts"`. Both node ids must already exist.
#[tracing::instrument(skip(store))]
pub fn link_facts(
    store: &GraphStore,
    edge_id: &str,
    from_node_id: &str,
    to_node_id: &str,
    edge_type: &str,
    weight: f64,
) -> Result<(), MemoryError> {
    let edge = GraphEdge::new(edge_id, from_node_id, to_node_id, edge_type, weight, Properties::new(), None)?;
    store.upsert_edge(&edge)?;
    Ok(())
}

/// All facts stored for `user_id` in `layer`.
pub fn facts_for_user(store: &GraphStore, user_id: &str, layer: MemoryLayer) -> Result<Vec<MemoryFact>, MemoryError> {
    let filter = NodeFilter {
        node_type: Some(layer.as_str().to_string()),
        property_equals: Some((USER_ID_KEY.to_string(), user_id.to_string())),
        limit: None,
    };
    Ok(store
        .get_all_nodes(&filter)?
        .into_iter()
        .filter_map(MemoryFact::from_node)
        .collect())
}

/// Merges near-duplicate facts within a layer: any pair whose content shares
/// at least `jaccard_threshold` of their word sets is collapsed, keeping the
/// most recently updated fact and linking the discarded one to it via a
/// `"duplicate_of"` edge before deleting it.
#[tracing::instrument(skip(store))]
pub fn merge_near_duplicates(
    store: &GraphStore,
    user_id: &str,
    layer: MemoryLayer,
    jaccard_threshold: f64,
) -> Result<BatchResult, MemoryError> {
    let mut facts = facts_for_user(store, user_id, layer)?;
    facts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let mut result = BatchResult::default();
    let mut removed: HashSet<String> = HashSet::new();
    let word_sets: Vec<HashSet<&str>> = facts.iter().map(|f| f.content.split_whitespace().collect()).collect();

    for i in 0..facts.len() {
        if removed.contains(&facts[i].node_id) {
            continue;
        }
        for j in (i + 1)..facts.len() {
            if removed.contains(&facts[j].node_id) {
                continue;
            }
            let intersection = word_sets[i].intersection(&word_sets[j]).count();
            let union = word_sets[i].union(&word_sets[j]).count();
            if union == 0 {
                continue;
            }
            let jaccard = intersection as f64 / union as f64;
            if jaccard >= jaccard_threshold {
                let edge_id = format!("dup_{}_{}", facts[j].node_id, facts[i].node_id);
                if link_facts(store, &edge_id, &facts[j].node_id, &facts[i].node_id, "duplicate_of", 1.0).is_ok() {
                    match store.delete_node(&facts[j].node_id) {
                        Ok(()) => result.record_success(),
                        Err(e) => result.record_failure(e),
                    }
                    removed.insert(facts[j].node_id.clone());
                }
            }
        }
    }
    Ok(result)
}

/// Folds `new_facts` into the user's single running `Observation` summary
/// node (`observation_{user_id}_consolidated`), via a caller-supplied
/// synthesis closure that sees the prior summary (empty string if this is
/// the first consolidation) alongside the new facts and returns the updated
/// summary. Errors if `synthesize` returns an empty string, since an empty
/// summary would silently erase whatever was there before.
#[tracing::instrument(skip(store, new_facts, vector, synthesize))]
pub fn consolidate(
    store: &GraphStore,
    user_id: &str,
    new_facts: &[String],
    vector: &[f32],
    synthesize: impl FnOnce(&str, &[String]) -> String,
) -> Result<MemoryFact, MemoryError> {
    const CONSOLIDATED_FACT_ID: &str = "consolidated";
    let node_id = MemoryLayer::Observation.node_id(user_id, CONSOLIDATED_FACT_ID);
    let previous = match store.get_node(&node_id) {
        Ok(node) => MemoryFact::from_node(node).map(|f| f.content).unwrap_or_default(),
        Err(graph::GraphError::NodeNotFound { .. }) => String::new(),
        Err(e) => return Err(e.into()),
    };

    let summary = synthesize(&previous, new_facts);
    if summary.trim().is_empty() {
        return Err(MemoryError::EmptyContent);
    }
    store_fact(store, user_id, CONSOLIDATED_FACT_ID, MemoryLayer::Observation, &summary, vector, Properties::new())
}

/// Facts within `hops` graph-hops of `seed_node_id`, e.g. to pull context
/// related to a fact the semantic channel already matched. Used by the
/// TEMPR graph channel.
pub fn related_facts(store: &GraphStore, seed_node_id: &str, hops: usize) -> Result<Vec<MemoryFact>, MemoryError> {
    if !node_exists_via_get(store, seed_node_id) {
        return Err(MemoryError::FactNotFound {
            id: seed_node_id.to_string(),
        });
    }
    let mut visited = HashSet::new();
    visited.insert(seed_node_id.to_string());
    let mut frontier = VecDeque::new();
    frontier.push_back((seed_node_id.to_string(), 0usize));
    let mut out = Vec::new();

    while let Some((node_id, depth)) = frontier.pop_front() {
        if depth >= hops {
            continue;
        }
        let opts = graph::traversal::NeighborOptions {
            direction: Direction::Both,
            ..Default::default()
        };
        for hop in graph::traversal::neighbors(store, &node_id, &opts)? {
            if visited.insert(hop.node_id.clone()) {
                if let Ok(node) = store.get_node(&hop.node_id) {
                    if let Some(fact) = MemoryFact::from_node(node) {
                        out.push(fact);
                    }
                }
                frontier.push_back((hop.node_id, depth + 1));
            }
        }
    }
    Ok(out)
}

fn node_exists_via_get(store: &GraphStore, id: &str) -> bool {
    store.get_node(id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::Algorithm;

    fn store() -> GraphStore {
        GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap()
    }

    #[test]
    fn store_fact_round_trips_layer_and_content() {
        let store = store();
        let fact = store_fact(&store, "u1", "f1", MemoryLayer::WorldFact, "likes tea", &[1.0, 0.0], Properties::new()).unwrap();
        assert_eq!(fact.layer, MemoryLayer::WorldFact);
        assert_eq!(fact.node_id, "world_fact_u1_f1");
        assert_eq!(fact.content, "likes tea");
    }

    #[test]
    fn retain_is_idempotent_for_identical_content() {
        let store = store();
        let first = retain(&store, "u1", "prefers dark roast", &[1.0, 0.0]).unwrap();
        let second = retain(&store, "u1", "prefers dark roast", &[1.0, 0.0]).unwrap();
        assert_eq!(first.node_id, second.node_id);
        assert_eq!(facts_for_user(&store, "u1", MemoryLayer::Experience).unwrap().len(), 1);
    }

    #[test]
    fn rejects_empty_content() {
        let store = store();
        assert!(matches!(retain(&store, "u1", "   ", &[1.0, 0.0]).unwrap_err(), MemoryError::EmptyContent));
    }

    #[test]
    fn merge_near_duplicates_collapses_similar_facts() {
        let store = store();
        store_fact(&store, "u1", "f1", MemoryLayer::WorldFact, "lives in Paris France", &[1.0, 0.0], Properties::new()).unwrap();
        store_fact(&store, "u1", "f2", MemoryLayer::WorldFact, "lives in Paris France now", &[1.0, 0.0], Properties::new()).unwrap();
        let result = merge_near_duplicates(&store, "u1", MemoryLayer::WorldFact, 0.6).unwrap();
        assert_eq!(result.success_count, 1);
        assert_eq!(facts_for_user(&store, "u1", MemoryLayer::WorldFact).unwrap().len(), 1);
    }

    #[test]
    fn consolidate_synthesizes_against_prior_summary() {
        let store = store();
        let new_facts = vec!["likes tea".to_string()];
        let first = consolidate(&store, "u1", &new_facts, &[1.0, 0.0], |prev, facts| {
            assert_eq!(prev, "");
            format!("Summary: {}", facts.join(", "))
        })
        .unwrap();
        assert_eq!(first.content, "Summary: likes tea");
        assert_eq!(first.node_id, "observation_u1_consolidated");

        let more_facts = vec!["also likes coffee".to_string()];
        let second = consolidate(&store, "u1", &more_facts, &[1.0, 0.0], |prev, facts| {
            assert_eq!(prev, "Summary: likes tea");
            format!("{prev}; {}", facts.join(", "))
        })
        .unwrap();
        assert_eq!(second.content, "Summary: likes tea; also likes coffee");
        assert_eq!(facts_for_user(&store, "u1", MemoryLayer::Observation).unwrap().len(), 1);
    }

    #[test]
    fn consolidate_rejects_empty_synthesis() {
        let store = store();
        let err = consolidate(&store, "u1", &["x".to_string()], &[1.0, 0.0], |_, _| String::new()).unwrap_err();
        assert!(matches!(err, MemoryError::EmptyContent));
    }

    #[test]
    fn related_facts_follows_links() {
        let store = store();
        let a = store_fact(&store, "u1", "f1", MemoryLayer::WorldFact, "a", &[1.0, 0.0], Properties::new()).unwrap();
        let b = store_fact(&store, "u1", "f2", MemoryLayer::WorldFact, "b", &[0.0, 1.0], Properties::new()).unwrap();
        link_facts(&store, "e1", &a.node_id, &b.node_id, "relates_to", 1.0).unwrap();
        let related = related_facts(&store, &a.node_id, 1).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].node_id, b.node_id);
    }
}
