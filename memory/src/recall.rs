//! TEMPR: four concurrently-run retrieval channels (short-term history is a
//! fifth, unranked channel) fused by Reciprocal Rank Fusion, with a small
//! layer-priority bonus and an optional reranker hook.
//!
//! Channel naming follows the acronym: **T**emporal, **E**mbedding
//! (semantic), keyword (**M**), graph (**P**). Each channel independently
//! produces a ranked list of candidate ids; [`recall`] fuses them without
//! caring which channel a candidate came from beyond recording it as a
//! source.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use graph::store::{Direction, Message};
use graph::GraphStore;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use types::MemoryLayer;

use crate::config::RecallConfig;
use crate::error::MemoryError;
use crate::hooks::Reranker;
use crate::layers::{self, MemoryFact};

/// The four channels [`RecallItem::sources`] can name, plus `"recent"` for
/// the unranked short-term history line (never appears in `sources` since
/// recent history bypasses fusion entirely).
pub const SOURCE_SEMANTIC: &str = "semantic";
pub const SOURCE_KEYWORD: &str = "keyword";
pub const SOURCE_GRAPH: &str = "graph";
pub const SOURCE_TEMPORAL: &str = "temporal";

const FACT_LAYERS: [MemoryLayer; 4] = [
    MemoryLayer::MentalModel,
    MemoryLayer::Observation,
    MemoryLayer::WorldFact,
    MemoryLayer::Experience,
];

/// Either half of what a fused [`RecallItem`] can point at: a conversation
/// message (from the semantic/keyword channels) or a stored fact (from the
/// graph/temporal channels).
#[derive(Debug, Clone, PartialEq)]
pub enum RecallPayload {
    Message(Message),
    Fact(MemoryFact),
}

impl RecallPayload {
    fn content(&self) -> &str {
        match self {
            RecallPayload::Message(m) => &m.content,
            RecallPayload::Fact(f) => &f.content,
        }
    }

    fn layer(&self) -> Option<MemoryLayer> {
        match self {
            RecallPayload::Message(_) => None,
            RecallPayload::Fact(f) => Some(f.layer),
        }
    }
}

/// One entry of a fused recall: a candidate id, its post-fusion score, every
/// channel that surfaced it, and the underlying message or fact.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallItem {
    pub id: String,
    pub score: f64,
    pub sources: Vec<String>,
    pub payload: RecallPayload,
}

impl RecallItem {
    pub fn content(&self) -> &str {
        self.payload.content()
    }

    pub fn layer(&self) -> Option<MemoryLayer> {
        self.payload.layer()
    }
}

/// A fully assembled recall: short-term history plus the fused top-k, with
/// two back-compat views split by payload kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryContext {
    /// Last few messages of the current session, oldest first, not part of
    /// RRF fusion.
    pub recent_history: Vec<Message>,
    /// The fused, layer-bonus-adjusted, (optionally reranked) top-k.
    pub ranked_memories: Vec<RecallItem>,
    /// `ranked_memories` restricted to message payloads, reconstructed as
    /// plain messages for callers that only want the cross-session
    /// semantic/keyword hits.
    pub semantic_recall: Vec<Message>,
    /// `ranked_memories` restricted to fact payloads.
    pub related_facts: Vec<RecallItem>,
}

fn temporal_regexes() -> Vec<(&'static str, Regex)> {
    vec![
        ("yesterday", Regex::new(r"(?i)\byesterday\b").unwrap()),
        ("last_week", Regex::new(r"(?i)\blast week\b").unwrap()),
        ("last_month", Regex::new(r"(?i)\blast month\b").unwrap()),
        ("last_year", Regex::new(r"(?i)\blast year\b").unwrap()),
        ("recently", Regex::new(r"(?i)\brecently\b").unwrap()),
        ("today", Regex::new(r"(?i)\btoday\b").unwrap()),
    ]
}

/// Resolves `query_text` against the small fixed set of temporal phrases
/// into a `[start, end)` window, deliberately not attempting general
/// natural-language time parsing (per design notes).
fn temporal_window(query_text: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    for (name, re) in temporal_regexes() {
        if re.is_match(query_text) {
            return Some(match name {
                "yesterday" => (now - ChronoDuration::days(2), now - ChronoDuration::days(1)),
                "last_week" => (now - ChronoDuration::weeks(2), now - ChronoDuration::weeks(1)),
                "last_month" => (now - ChronoDuration::days(60), now - ChronoDuration::days(30)),
                "last_year" => (now - ChronoDuration::days(730), now - ChronoDuration::days(365)),
                "recently" => (now - ChronoDuration::days(2), now),
                "today" => (now - ChronoDuration::days(1), now),
                _ => unreachable!(),
            });
        }
    }
    None
}

fn all_facts_for_user(store: &GraphStore, user_id: &str) -> Result<Vec<MemoryFact>, MemoryError> {
    let mut out = Vec::new();
    for layer in FACT_LAYERS {
        out.extend(layers::facts_for_user(store, user_id, layer)?);
    }
    Ok(out)
}

/// **E** — cross-session semantic channel: message-vector similarity over
/// every session of `user_id` other than `exclude_session`.
fn semantic_channel(
    store: &GraphStore,
    user_id: &str,
    exclude_session: Option<&str>,
    query_vec: &[f32],
    limit: usize,
) -> Result<Vec<(String, RecallPayload)>, MemoryError> {
    if query_vec.is_empty() {
        return Ok(Vec::new());
    }
    Ok(store
        .semantic_search_messages(user_id, exclude_session, query_vec, limit)?
        .into_iter()
        .map(|(msg, _)| (msg.id.clone(), RecallPayload::Message(msg)))
        .collect())
}

/// **M** — keyword channel: BM25 full-text search over messages.
fn keyword_channel(
    store: &GraphStore,
    user_id: &str,
    exclude_session: Option<&str>,
    query_text: &str,
    limit: usize,
) -> Result<Vec<(String, RecallPayload)>, MemoryError> {
    if query_text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(store
        .keyword_search_messages(user_id, exclude_session, query_text, limit)?
        .into_iter()
        .map(|(msg, _)| (msg.id.clone(), RecallPayload::Message(msg)))
        .collect())
}

/// **P** — graph channel: hybrid vector+proximity search over fact nodes,
/// anchored at the user's most recently touched fact (so that facts linked
/// to it pick up graph proximity), weighted 0.6 vector / 0.4 graph per spec.
/// Degrades to nothing when the user has no facts yet (no anchor to search
/// from) rather than erroring, since an empty memory is a normal state.
fn graph_channel(
    store: &GraphStore,
    user_id: &str,
    query_vec: &[f32],
    limit: usize,
) -> Result<Vec<(String, RecallPayload)>, MemoryError> {
    if query_vec.is_empty() {
        return Ok(Vec::new());
    }
    let facts = all_facts_for_user(store, user_id)?;
    let Some(anchor) = facts.iter().max_by_key(|f| f.updated_at) else {
        return Ok(Vec::new());
    };
    let by_id: HashMap<&str, &MemoryFact> = facts.iter().map(|f| (f.node_id.as_str(), f)).collect();
    let query = graph::HybridQuery {
        vector: Some(query_vec),
        start_node_id: Some(&anchor.node_id),
        max_depth: 2,
        top_k: limit,
        weights: graph::HybridWeights {
            vector: 0.6,
            graph: 0.4,
            edge: 0.0,
        },
        ..Default::default()
    };
    let hits = graph::hybrid::hybrid_search(store, &query)?;
    Ok(hits
        .into_iter()
        .filter_map(|hit| by_id.get(hit.node_id.as_str()).map(|f| (hit.node_id, RecallPayload::Fact((*f).clone()))))
        .take(limit)
        .collect())
}

/// **T** — temporal channel: only runs when `query_text` names one of the
/// fixed temporal phrases; returns facts whose `time_ref` falls in the
/// derived window, ordered most-recent-first.
fn temporal_channel(
    store: &GraphStore,
    user_id: &str,
    query_text: &str,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<(String, RecallPayload)>, MemoryError> {
    let Some((start, end)) = temporal_window(query_text, now) else {
        return Ok(Vec::new());
    };
    let mut facts: Vec<MemoryFact> = all_facts_for_user(store, user_id)?
        .into_iter()
        .filter(|f| {
            f.properties
                .get("time_ref")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| {
                    let t = t.with_timezone(&Utc);
                    t >= start && t < end
                })
                .unwrap_or(false)
        })
        .collect();
    facts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    facts.truncate(limit);
    Ok(facts.into_iter().map(|f| (f.node_id.clone(), RecallPayload::Fact(f))).collect())
}

/// Reciprocal Rank Fusion with the fixed `k` carried in `config`: each
/// channel contributes `1/(k + rank + 1)` (0-indexed rank) to every id it
/// ranked, and `sources` collects every channel that surfaced the id.
fn rrf_fuse(
    channels: Vec<(&'static str, Vec<(String, RecallPayload)>)>,
    rrf_k: f64,
) -> Vec<RecallItem> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut sources: HashMap<String, Vec<String>> = HashMap::new();
    let mut payloads: HashMap<String, RecallPayload> = HashMap::new();

    for (source_name, items) in channels {
        for (rank, (id, payload)) in items.into_iter().enumerate() {
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (rrf_k + rank as f64 + 1.0);
            let src = sources.entry(id.clone()).or_default();
            if !src.iter().any(|s| s == source_name) {
                src.push(source_name.to_string());
            }
            payloads.entry(id).or_insert(payload);
        }
    }

    scores
        .into_iter()
        .filter_map(|(id, score)| {
            let payload = payloads.remove(&id)?;
            let sources = sources.remove(&id).unwrap_or_default();
            Some(RecallItem { id, score, sources, payload })
        })
        .collect()
}

fn apply_layer_bonus(items: &mut [RecallItem], enabled: bool) {
    if !enabled {
        return;
    }
    for item in items.iter_mut() {
        if let Some(layer) = item.layer() {
            item.score += layer.rrf_bonus();
        }
    }
}

/// Runs the four TEMPR channels, fuses them, applies the layer bonus, and
/// truncates to `config.top_k`. Does not invoke a reranker; see
/// [`recall_reranked`] for the async variant that does.
///
/// `session_id` is optional: without it, short-term history is empty and
/// the semantic/keyword channels search across the user's whole message
/// history rather than excluding a "current" session.
#[tracing::instrument(skip(store, query_vec, query_text))]
pub fn recall(
    store: &GraphStore,
    config: &RecallConfig,
    user_id: &str,
    session_id: Option<&str>,
    query_vec: &[f32],
    query_text: &str,
) -> Result<MemoryContext, MemoryError> {
    let limit = config.per_channel_limit.get();
    let now = Utc::now();

    let recent_history = match session_id {
        Some(sid) => store.recent_messages(sid, 5)?,
        None => Vec::new(),
    };

    // Four channels run on their own OS thread and are joined below; each is
    // a read-only query over a `GraphStore` guarded internally by a mutex, so
    // this is genuine concurrency rather than just structure.
    let (semantic, keyword, graph_res, temporal) = std::thread::scope(|scope| {
        let semantic = scope.spawn(|| semantic_channel(store, user_id, session_id, query_vec, limit));
        let keyword = scope.spawn(|| keyword_channel(store, user_id, session_id, query_text, limit));
        let graph_res = scope.spawn(|| graph_channel(store, user_id, query_vec, limit));
        let temporal = scope.spawn(|| temporal_channel(store, user_id, query_text, now, limit));
        (
            semantic.join().expect("semantic channel thread panicked"),
            keyword.join().expect("keyword channel thread panicked"),
            graph_res.join().expect("graph channel thread panicked"),
            temporal.join().expect("temporal channel thread panicked"),
        )
    });

    let channels = vec![
        (SOURCE_SEMANTIC, semantic?),
        (SOURCE_KEYWORD, keyword?),
        (SOURCE_GRAPH, graph_res?),
        (SOURCE_TEMPORAL, temporal?),
    ];

    let mut fused = rrf_fuse(channels, config.rrf_k);
    apply_layer_bonus(&mut fused, config.layer_bonus_enabled);
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
    fused.truncate(config.top_k.get());

    let semantic_recall = fused
        .iter()
        .filter_map(|item| match &item.payload {
            RecallPayload::Message(m) => Some(m.clone()),
            RecallPayload::Fact(_) => None,
        })
        .collect();
    let related_facts = fused
        .iter()
        .filter(|item| matches!(item.payload, RecallPayload::Fact(_)))
        .cloned()
        .collect();

    Ok(MemoryContext {
        recent_history,
        ranked_memories: fused,
        semantic_recall,
        related_facts,
    })
}

/// [`recall`] followed by an optional reranker pass: if `reranker` is set
/// and at least two candidates survived fusion, it re-scores
/// `ranked_memories`; any reranker error is swallowed and the RRF order is
/// kept, matching the "recoverable" failure semantics for this hook.
pub async fn recall_reranked(
    store: &GraphStore,
    config: &RecallConfig,
    reranker: Option<&dyn Reranker>,
    user_id: &str,
    session_id: Option<&str>,
    query_vec: &[f32],
    query_text: &str,
    cancellation: Option<&CancellationToken>,
) -> Result<MemoryContext, MemoryError> {
    if cancellation.is_some_and(|c| c.is_cancelled()) {
        return Err(MemoryError::Canceled);
    }
    let mut context = recall(store, config, user_id, session_id, query_vec, query_text)?;
    if let Some(reranker) = reranker {
        if context.ranked_memories.len() >= 2 {
            match reranker.rerank(query_text, context.ranked_memories.clone()).await {
                Ok(reranked) => context.ranked_memories = reranked,
                Err(e) => tracing::warn!(error = %e, "reranker failed, falling back to RRF order"),
            }
            context.semantic_recall = context
                .ranked_memories
                .iter()
                .filter_map(|item| match &item.payload {
                    RecallPayload::Message(m) => Some(m.clone()),
                    RecallPayload::Fact(_) => None,
                })
                .collect();
            context.related_facts = context
                .ranked_memories
                .iter()
                .filter(|item| matches!(item.payload, RecallPayload::Fact(_)))
                .cloned()
                .collect();
        }
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::{Algorithm, Properties};

    fn store() -> GraphStore {
        GraphStore::open_in_memory(4, Algorithm::CosineSimilarity).unwrap()
    }

    #[test]
    fn rrf_monotonicity_matches_spec_example() {
        let a_msg = Message {
            id: "a".into(),
            session_id: "s".into(),
            user_id: "u".into(),
            role: "user".into(),
            content: "a".into(),
            vector: None,
            created_at: Utc::now(),
        };
        let b_msg = Message { id: "b".into(), ..a_msg.clone() };
        let c_msg = Message { id: "c".into(), ..a_msg.clone() };

        let ch1 = vec![("a".to_string(), RecallPayload::Message(a_msg.clone())), ("b".to_string(), RecallPayload::Message(b_msg))];
        let ch2 = vec![("a".to_string(), RecallPayload::Message(a_msg)), ("c".to_string(), RecallPayload::Message(c_msg))];

        let fused = rrf_fuse(vec![("semantic", ch1), ("keyword", ch2)], 60.0);
        let a = fused.iter().find(|i| i.id == "a").unwrap();
        let b = fused.iter().find(|i| i.id == "b").unwrap();
        let c = fused.iter().find(|i| i.id == "c").unwrap();

        assert!((a.score - 2.0 / 61.0).abs() < 1e-9);
        assert!((b.score - 1.0 / 62.0).abs() < 1e-9);
        assert!((c.score - 1.0 / 62.0).abs() < 1e-9);
        assert!(a.score > b.score && a.score > c.score);
    }

    #[test]
    fn layer_priority_breaks_ties_in_favor_of_mental_model() {
        let store = store();
        let fact = layers::store_fact(&store, "u1", "f1", MemoryLayer::MentalModel, "model", &[1.0, 0.0, 0.0, 0.0], Properties::new()).unwrap();
        let mut items = vec![RecallItem {
            id: fact.node_id.clone(),
            score: 0.5,
            sources: vec!["graph".to_string()],
            payload: RecallPayload::Fact(fact),
        }];
        apply_layer_bonus(&mut items, true);
        assert!((items[0].score - 0.54).abs() < 1e-9);
    }

    #[test]
    fn recall_surfaces_graph_channel_world_fact() {
        let store = store();
        layers::store_fact(&store, "u1", "f1", MemoryLayer::WorldFact, "Alice lives in Paris", &[1.0, 0.0, 0.0, 0.0], Properties::new()).unwrap();
        store.add_message("m1", "s1", "u1", "user", "hello", Some(&[0.0, 1.0, 0.0, 0.0])).unwrap();
        store.add_message("m2", "s1", "u1", "assistant", "hi there", Some(&[0.0, 0.0, 1.0, 0.0])).unwrap();

        let config = RecallConfig::default();
        let context = recall(&store, &config, "u1", Some("s1"), &[1.0, 0.0, 0.0, 0.0], "where does she live").unwrap();
        assert_eq!(context.recent_history.len(), 2);
        assert!(!context.ranked_memories.is_empty());
        let top = &context.ranked_memories[0];
        assert_eq!(top.layer(), Some(MemoryLayer::WorldFact));
        assert!(top.sources.iter().any(|s| s == SOURCE_GRAPH));
    }

    #[test]
    fn temporal_channel_fires_on_matching_phrase() {
        let store = store();
        let mut props = Properties::new();
        props.insert("time_ref".into(), (Utc::now() - ChronoDuration::hours(12)).to_rfc3339().into());
        layers::store_fact(&store, "u1", "f1", MemoryLayer::WorldFact, "went for a walk", &[1.0, 0.0, 0.0, 0.0], props).unwrap();

        let config = RecallConfig::default();
        let context = recall(&store, &config, "u1", None, &[1.0, 0.0, 0.0, 0.0], "what happened yesterday").unwrap();
        assert!(context.ranked_memories.iter().any(|i| i.sources.iter().any(|s| s == SOURCE_TEMPORAL)));
    }

    #[test]
    fn temporal_channel_silent_without_matching_phrase() {
        assert!(temporal_window("what is the weather", Utc::now()).is_none());
        assert!(temporal_window("what happened last month", Utc::now()).is_some());
    }
}
