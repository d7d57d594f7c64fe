//! Hierarchical navigable small-world graph index.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use types::Algorithm;

use crate::error::SimilarityError;
use crate::{ScoredId, VectorIndex};

const LEVEL_CAP: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Target bidirectional links per node above layer 0.
    pub m: NonZeroUsize,
    /// Beam width used while building the neighbor lists on insert.
    pub ef_construction: NonZeroUsize,
    /// Beam width used at query time, when larger than `2k`.
    pub ef_search: NonZeroUsize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: NonZeroUsize::new(16).unwrap(),
            ef_construction: NonZeroUsize::new(200).unwrap(),
            ef_search: NonZeroUsize::new(64).unwrap(),
        }
    }
}

struct HnswNode {
    vector: Vec<f32>,
    level: usize,
    /// `neighbors[layer]` for `layer` in `0..=level`.
    neighbors: Vec<HashSet<String>>,
    deleted: bool,
}

struct HnswState {
    nodes: HashMap<String, HnswNode>,
    entry_point: Option<String>,
    max_level: usize,
}

pub struct HnswIndex {
    dim: usize,
    algorithm: Algorithm,
    config: HnswConfig,
    rng: Mutex<StdRng>,
    state: RwLock<HnswState>,
}

impl HnswIndex {
    pub fn new(dim: usize, algorithm: Algorithm, config: HnswConfig, seed: u64) -> Self {
        Self {
            dim,
            algorithm,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            state: RwLock::new(HnswState {
                nodes: HashMap::new(),
                entry_point: None,
                max_level: 0,
            }),
        }
    }

    fn random_level(&self) -> usize {
        let mut rng = self.rng.lock();
        let mut level = 0;
        while rng.gen::<f64>() < 0.5 && level < LEVEL_CAP {
            level += 1;
        }
        level
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        crate::score(self.algorithm, a, b)
    }

    /// Greedy single-point descent through one layer: starting from
    /// `current`, repeatedly move to the best-scoring neighbor until no
    /// neighbor improves on the current point.
    fn greedy_descend(&self, state: &HnswState, query: &[f32], start: &str, layer: usize) -> String {
        let mut current = start.to_string();
        let mut current_score = self.score(query, &state.nodes[&current].vector);
        loop {
            let node = &state.nodes[&current];
            if layer > node.level {
                return current;
            }
            let mut improved = false;
            for neighbor in &node.neighbors[layer] {
                let n = &state.nodes[neighbor];
                if n.deleted {
                    continue;
                }
                let s = self.score(query, &n.vector);
                if s > current_score {
                    current_score = s;
                    current = neighbor.clone();
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Beam search of one layer starting from `entries`, expanding outward
    /// until no unvisited neighbor would improve the `ef`-bounded result set.
    fn search_layer(
        &self,
        state: &HnswState,
        query: &[f32],
        entries: &[String],
        ef: usize,
        layer: usize,
    ) -> Vec<ScoredId> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut found: Vec<ScoredId> = Vec::new();
        let mut frontier: Vec<String> = Vec::new();

        for id in entries {
            let node = &state.nodes[id];
            if node.deleted || !visited.insert(id.clone()) {
                continue;
            }
            found.push(ScoredId::new(id.clone(), self.score(query, &node.vector)));
            frontier.push(id.clone());
        }

        while !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for cur in &frontier {
                let node = &state.nodes[cur];
                if layer > node.level {
                    continue;
                }
                for neighbor in &node.neighbors[layer] {
                    if !visited.insert(neighbor.clone()) {
                        continue;
                    }
                    let n = &state.nodes[neighbor];
                    if n.deleted {
                        continue;
                    }
                    let s = self.score(query, &n.vector);
                    let worst = found.iter().map(|f| f.score).fold(f32::INFINITY, f32::min);
                    if found.len() < ef || s > worst {
                        found.push(ScoredId::new(neighbor.clone(), s));
                        next_frontier.push(neighbor.clone());
                    }
                }
            }
            found.sort_by(|a, b| b.cmp(a));
            found.truncate(ef);
            frontier = next_frontier;
        }

        found.sort_by(|a, b| b.cmp(a));
        found
    }

    /// Simple distance-sorted neighbor selection (not the paper's diversity
    /// heuristic): keep the `m` best-scoring candidates.
    fn select_neighbors(candidates: &[ScoredId], m: usize) -> Vec<String> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| b.cmp(a));
        sorted.truncate(m);
        sorted.into_iter().map(|c| c.id).collect()
    }
}

impl VectorIndex for HnswIndex {
    #[tracing::instrument(skip(self, vector))]
    fn insert(&self, id: String, vector: Vec<f32>) -> Result<(), SimilarityError> {
        if vector.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dim,
                found: vector.len(),
            });
        }
        let mut state = self.state.write();
        if state.nodes.contains_key(&id) {
            return Err(SimilarityError::DuplicateInsert { id });
        }

        let level = self.random_level();

        if state.nodes.is_empty() {
            state.nodes.insert(
                id.clone(),
                HnswNode {
                    vector,
                    level,
                    neighbors: vec![HashSet::new(); level + 1],
                    deleted: false,
                },
            );
            state.entry_point = Some(id);
            state.max_level = level;
            return Ok(());
        }

        let entry = state.entry_point.clone().expect("non-empty index has an entry point");
        let mut cur = entry;
        for layer in (level + 1..=state.max_level).rev() {
            cur = self.greedy_descend(&state, &vector, &cur, layer);
        }

        let m = self.config.m.get();
        let max_m0 = 2 * m;
        let ef_construction = self.config.ef_construction.get();
        let mut neighbors: Vec<HashSet<String>> = vec![HashSet::new(); level + 1];
        let mut entries = vec![cur];

        for layer in (0..=level.min(state.max_level)).rev() {
            let candidates = self.search_layer(&state, &vector, &entries, ef_construction, layer);
            let max_m = if layer == 0 { max_m0 } else { m };
            let selected = Self::select_neighbors(&candidates, max_m);
            neighbors[layer] = selected.iter().cloned().collect();

            for neighbor_id in &selected {
                let neighbor = state.nodes.get_mut(neighbor_id).unwrap();
                if layer <= neighbor.level {
                    neighbor.neighbors[layer].insert(id.clone());
                    if neighbor.neighbors[layer].len() > max_m {
                        let neighbor_vector = neighbor.vector.clone();
                        let neighbor_candidates: Vec<ScoredId> = neighbor.neighbors[layer]
                            .iter()
                            .map(|nid| {
                                let v = &state.nodes[nid].vector;
                                ScoredId::new(nid.clone(), self.score(&neighbor_vector, v))
                            })
                            .collect();
                        let pruned = Self::select_neighbors(&neighbor_candidates, max_m);
                        let neighbor = state.nodes.get_mut(neighbor_id).unwrap();
                        neighbor.neighbors[layer] = pruned.into_iter().collect();
                    }
                }
            }
            entries = candidates.into_iter().map(|c| c.id).collect();
            if entries.is_empty() {
                entries = vec![state.entry_point.clone().unwrap()];
            }
        }

        state.nodes.insert(
            id.clone(),
            HnswNode {
                vector,
                level,
                neighbors,
                deleted: false,
            },
        );

        if level > state.max_level {
            state.max_level = level;
            state.entry_point = Some(id);
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, query))]
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, SimilarityError> {
        if query.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dim,
                found: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let Some(entry) = state.entry_point.clone() else {
            return Ok(Vec::new());
        };

        let mut cur = entry;
        for layer in (1..=state.max_level).rev() {
            cur = self.greedy_descend(&state, query, &cur, layer);
        }

        let ef = self.config.ef_search.get().max(2 * k);
        let mut results = self.search_layer(&state, query, &[cur], ef, 0);
        results.truncate(k);
        Ok(results)
    }

    /// Soft delete: marks the node rather than removing it, so existing
    /// adjacency stays structurally valid. If the deleted node was the
    /// entry point, promotes any remaining non-deleted node.
    #[tracing::instrument(skip(self))]
    fn delete(&self, id: &str) -> Result<(), SimilarityError> {
        let mut state = self.state.write();
        if let Some(node) = state.nodes.get_mut(id) {
            node.deleted = true;
        } else {
            return Ok(());
        }

        if state.entry_point.as_deref() == Some(id) {
            state.entry_point = state
                .nodes
                .iter()
                .find(|(nid, n)| !n.deleted && nid.as_str() != id)
                .map(|(nid, _)| nid.clone());
            state.max_level = state
                .entry_point
                .as_ref()
                .map(|e| state.nodes[e].level)
                .unwrap_or(0);
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.state.read().nodes.values().filter(|n| !n.deleted).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn small_index() -> HnswIndex {
        HnswIndex::new(2, Algorithm::EuclideanDistance, HnswConfig::default(), 7)
    }

    #[test]
    fn duplicate_insert_fails() {
        let index = small_index();
        index.insert("a".into(), vec![0.0, 0.0]).unwrap();
        assert!(matches!(
            index.insert("a".into(), vec![1.0, 1.0]).unwrap_err(),
            SimilarityError::DuplicateInsert { .. }
        ));
    }

    #[test]
    fn search_never_returns_soft_deleted_nodes() {
        let index = small_index();
        for i in 0..10 {
            index
                .insert(format!("id{i}"), vec![i as f32, 0.0])
                .unwrap();
        }
        index.delete("id5").unwrap();
        let results = index.search(&[5.0, 0.0], 10).unwrap();
        assert!(results.iter().all(|r| r.id != "id5"));
    }

    #[test]
    fn new_entry_point_exists_after_deleting_old_one_iff_nonempty() {
        let index = small_index();
        index.insert("a".into(), vec![0.0, 0.0]).unwrap();
        index.insert("b".into(), vec![1.0, 1.0]).unwrap();
        let entry_before = index.state.read().entry_point.clone().unwrap();
        index.delete(&entry_before).unwrap();
        assert!(index.state.read().entry_point.is_some());

        let remaining = index.state.read().entry_point.clone().unwrap();
        index.delete(&remaining).unwrap();
        assert!(index.state.read().entry_point.is_none());
    }

    #[test]
    fn size_excludes_deleted_nodes() {
        let index = small_index();
        index.insert("a".into(), vec![0.0, 0.0]).unwrap();
        index.insert("b".into(), vec![1.0, 1.0]).unwrap();
        index.delete("a").unwrap();
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn finds_nearest_neighbor_in_a_small_dataset() {
        let index = small_index();
        for i in 0..20 {
            index
                .insert(format!("id{i}"), vec![i as f32, i as f32])
                .unwrap();
        }
        let results = index.search(&[9.9, 9.9], 1).unwrap();
        assert_eq!(results[0].id, "id10");
    }
}
