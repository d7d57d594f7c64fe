//! Composition of several [`VectorIndex`]es under one of four combination
//! strategies, plus a pre-wired HNSW+IVF [`HybridIndex`].

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::SimilarityError;
use crate::index::{HnswIndex, IvfIndex};
use crate::{ScoredId, VectorIndex};

/// The four ANN index families a [`MultiIndex`] can compose.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum IndexType {
    Flat,
    Ivf,
    Hnsw,
    Lsh,
}

/// Which combination strategy a [`MultiIndex`] applies at search time.
#[derive(Debug, Clone)]
pub enum CombinationStrategy {
    /// Forward to the designated primary index only.
    PrimaryOnly,
    /// Query every index for `k`; keep the best score per id; sort
    /// descending; return `k`.
    MergeAll,
    /// Ask the primary for `max(2k, rerank_top_k)` candidates, then ask
    /// each secondary for the same and average the score across voters
    /// that saw the candidate.
    Rerank { rerank_top_k: usize },
    /// Collect ranked lists of length `2k` from every index; score by
    /// `avg_score + 0.1 * vote_count`; sort by vote count descending, then
    /// score descending.
    Voting,
}

/// Composes several [`VectorIndex`]es under one active [`CombinationStrategy`].
/// `Insert`/`Delete` always broadcast to every composed index regardless of
/// strategy.
pub struct MultiIndex {
    indices: HashMap<IndexType, Arc<dyn VectorIndex>>,
    primary: IndexType,
    strategy: parking_lot::RwLock<CombinationStrategy>,
    parallel: bool,
}

impl MultiIndex {
    pub fn new(
        primary: IndexType,
        indices: HashMap<IndexType, Arc<dyn VectorIndex>>,
        strategy: CombinationStrategy,
        parallel: bool,
    ) -> Result<Self, SimilarityError> {
        if !indices.contains_key(&primary) {
            return Err(SimilarityError::InvalidParameter {
                name: "primary",
                reason: "primary index type is not present in the composed index map".into(),
            });
        }
        Ok(Self {
            indices,
            primary,
            strategy: parking_lot::RwLock::new(strategy),
            parallel,
        })
    }

    pub fn set_strategy(&self, strategy: CombinationStrategy) {
        *self.strategy.write() = strategy;
    }

    fn primary_index(&self) -> &Arc<dyn VectorIndex> {
        self.indices
            .get(&self.primary)
            .expect("primary index always present, checked at construction")
    }

    fn secondaries(&self) -> impl Iterator<Item = &Arc<dyn VectorIndex>> {
        self.indices
            .iter()
            .filter(move |(t, _)| **t != self.primary)
            .map(|(_, idx)| idx)
    }

    fn merge_all(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, SimilarityError> {
        let mut best: HashMap<String, f32> = HashMap::new();
        for index in self.indices.values() {
            for r in index.search(query, k)? {
                best.entry(r.id)
                    .and_modify(|s| *s = s.max(r.score))
                    .or_insert(r.score);
            }
        }
        let mut results: Vec<ScoredId> = best
            .into_iter()
            .map(|(id, score)| ScoredId::new(id, score))
            .collect();
        results.sort_by(|a, b| b.cmp(a));
        results.truncate(k);
        Ok(results)
    }

    fn rerank(&self, query: &[f32], k: usize, rerank_top_k: usize) -> Result<Vec<ScoredId>, SimilarityError> {
        let width = (2 * k).max(rerank_top_k);
        let primary_candidates = self.primary_index().search(query, width)?;

        let mut sums: HashMap<String, f32> = HashMap::new();
        let mut votes: HashMap<String, usize> = HashMap::new();
        for r in &primary_candidates {
            *sums.entry(r.id.clone()).or_insert(0.0) += r.score;
            *votes.entry(r.id.clone()).or_insert(0) += 1;
        }
        for secondary in self.secondaries() {
            let results = secondary.search(query, width)?;
            let secondary_scores: HashMap<String, f32> =
                results.into_iter().map(|r| (r.id, r.score)).collect();
            for candidate in &primary_candidates {
                if let Some(&score) = secondary_scores.get(&candidate.id) {
                    *sums.entry(candidate.id.clone()).or_insert(0.0) += score;
                    *votes.entry(candidate.id.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut results: Vec<ScoredId> = primary_candidates
            .iter()
            .map(|c| {
                let voters = votes[&c.id].max(1) as f32;
                ScoredId::new(c.id.clone(), sums[&c.id] / voters)
            })
            .collect();
        results.sort_by(|a, b| b.cmp(a));
        results.truncate(k);
        Ok(results)
    }

    fn voting(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, SimilarityError> {
        let width = 2 * k;
        let mut sums: HashMap<String, f32> = HashMap::new();
        let mut votes: HashMap<String, usize> = HashMap::new();
        for index in self.indices.values() {
            for r in index.search(query, width)? {
                *sums.entry(r.id.clone()).or_insert(0.0) += r.score;
                *votes.entry(r.id.clone()).or_insert(0) += 1;
            }
        }

        let mut results: Vec<(String, usize, f32)> = votes
            .into_iter()
            .map(|(id, vote_count)| {
                let avg_score = sums[&id] / vote_count as f32;
                let composite = avg_score + 0.1 * vote_count as f32;
                (id, vote_count, composite)
            })
            .collect();
        results.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
        });
        results.truncate(k);
        Ok(results
            .into_iter()
            .map(|(id, _, composite)| ScoredId::new(id, composite))
            .collect())
    }
}

impl VectorIndex for MultiIndex {
    #[tracing::instrument(skip(self, vector))]
    fn insert(&self, id: String, vector: Vec<f32>) -> Result<(), SimilarityError> {
        if self.parallel {
            self.indices
                .values()
                .collect::<Vec<_>>()
                .par_iter()
                .map(|index| index.insert(id.clone(), vector.clone()))
                .find_any(|r| r.is_err())
                .unwrap_or(Ok(()))
        } else {
            for index in self.indices.values() {
                index.insert(id.clone(), vector.clone())?;
            }
            Ok(())
        }
    }

    #[tracing::instrument(skip(self, query))]
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, SimilarityError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        match self.strategy.read().clone() {
            CombinationStrategy::PrimaryOnly => self.primary_index().search(query, k),
            CombinationStrategy::MergeAll => self.merge_all(query, k),
            CombinationStrategy::Rerank { rerank_top_k } => self.rerank(query, k, rerank_top_k),
            CombinationStrategy::Voting => self.voting(query, k),
        }
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, id: &str) -> Result<(), SimilarityError> {
        if self.parallel {
            self.indices
                .values()
                .collect::<Vec<_>>()
                .par_iter()
                .map(|index| index.delete(id))
                .find_any(|r| r.is_err())
                .unwrap_or(Ok(()))
        } else {
            for index in self.indices.values() {
                index.delete(id)?;
            }
            Ok(())
        }
    }

    fn size(&self) -> usize {
        self.primary_index().size()
    }
}

/// Pre-wired composition of HNSW (fast candidate generation) and IVF
/// (accuracy refinement): both lists are gathered in one pass, and where an
/// id appears in both, the IVF-sourced score wins.
pub struct HybridIndex {
    hnsw: Arc<HnswIndex>,
    ivf: Arc<IvfIndex>,
}

impl HybridIndex {
    pub fn new(hnsw: Arc<HnswIndex>, ivf: Arc<IvfIndex>) -> Self {
        Self { hnsw, ivf }
    }
}

impl VectorIndex for HybridIndex {
    #[tracing::instrument(skip(self, vector))]
    fn insert(&self, id: String, vector: Vec<f32>) -> Result<(), SimilarityError> {
        self.hnsw.insert(id.clone(), vector.clone())?;
        self.ivf.insert(id, vector)
    }

    #[tracing::instrument(skip(self, query))]
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, SimilarityError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let width = (2 * k).max(k);
        let hnsw_results = self.hnsw.search(query, width)?;
        let ivf_results = self.ivf.search(query, width)?;

        let mut combined: HashMap<String, f32> = HashMap::new();
        for r in hnsw_results {
            combined.insert(r.id, r.score);
        }
        for r in ivf_results {
            combined.insert(r.id, r.score);
        }

        let mut results: Vec<ScoredId> = combined
            .into_iter()
            .map(|(id, score)| ScoredId::new(id, score))
            .collect();
        results.sort_by(|a, b| b.cmp(a));
        results.truncate(k);
        Ok(results)
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, id: &str) -> Result<(), SimilarityError> {
        self.hnsw.delete(id)?;
        self.ivf.delete(id)
    }

    fn size(&self) -> usize {
        self.hnsw.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FlatIndex, HnswConfig, IvfConfig};
    use pretty_assertions::assert_eq;
    use std::num::NonZeroUsize;
    use types::Algorithm;

    fn dataset() -> Vec<(String, Vec<f32>)> {
        (0..8)
            .map(|i| (format!("id{i}"), vec![i as f32, 0.0]))
            .collect()
    }

    fn flat_multi(strategy: CombinationStrategy) -> MultiIndex {
        let mut indices: HashMap<IndexType, Arc<dyn VectorIndex>> = HashMap::new();
        indices.insert(
            IndexType::Flat,
            Arc::new(FlatIndex::new(2, Algorithm::EuclideanDistance)),
        );
        indices.insert(
            IndexType::Hnsw,
            Arc::new(crate::index::HnswIndex::new(
                2,
                Algorithm::EuclideanDistance,
                HnswConfig::default(),
                1,
            )),
        );
        let multi = MultiIndex::new(IndexType::Flat, indices, strategy, false).unwrap();
        for (id, v) in dataset() {
            multi.insert(id, v).unwrap();
        }
        multi
    }

    #[test]
    fn primary_only_forwards_to_primary() {
        let multi = flat_multi(CombinationStrategy::PrimaryOnly);
        let results = multi.search(&[0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].id, "id0");
    }

    #[test]
    fn merge_all_keeps_best_score_per_id() {
        let multi = flat_multi(CombinationStrategy::MergeAll);
        let results = multi.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "id0");
    }

    #[test]
    fn rerank_averages_across_voters() {
        let multi = flat_multi(CombinationStrategy::Rerank { rerank_top_k: 4 });
        let results = multi.search(&[0.0, 0.0], 2).unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn voting_orders_by_vote_count_first() {
        let multi = flat_multi(CombinationStrategy::Voting);
        let results = multi.search(&[0.0, 0.0], 3).unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn rejects_missing_primary() {
        let indices: HashMap<IndexType, Arc<dyn VectorIndex>> = HashMap::new();
        assert!(MultiIndex::new(IndexType::Flat, indices, CombinationStrategy::PrimaryOnly, false).is_err());
    }

    #[test]
    fn hybrid_index_prefers_ivf_distance_on_overlap() {
        let hnsw = Arc::new(crate::index::HnswIndex::new(
            2,
            Algorithm::EuclideanDistance,
            HnswConfig::default(),
            3,
        ));
        let ivf = Arc::new(crate::index::IvfIndex::new(
            2,
            Algorithm::EuclideanDistance,
            IvfConfig {
                n_centroids: NonZeroUsize::new(2).unwrap(),
                n_probe: NonZeroUsize::new(2).unwrap(),
                ..Default::default()
            },
        ));
        ivf.train(&dataset().into_iter().map(|(_, v)| v).collect::<Vec<_>>())
            .unwrap();
        let hybrid = HybridIndex::new(hnsw, ivf);
        for (id, v) in dataset() {
            hybrid.insert(id, v).unwrap();
        }
        let results = hybrid.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(results[0].id, "id0");
    }
}
