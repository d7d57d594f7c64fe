//! Exact brute-force index: stores every vector, scores all of them on each
//! query. The accuracy baseline every other index is measured against.

use std::collections::HashMap;

use parking_lot::RwLock;
use types::Algorithm;

use crate::error::SimilarityError;
use crate::heap::BoundedMaxHeap;
use crate::index::distance_metric;
use crate::{ScoredId, VectorIndex};

pub struct FlatIndex {
    algorithm: Algorithm,
    dim: usize,
    vectors: RwLock<HashMap<String, Vec<f32>>>,
}

impl FlatIndex {
    pub fn new(dim: usize, algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            dim,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    fn normalizes_on_insert(&self) -> bool {
        matches!(self.algorithm, Algorithm::CosineSimilarity)
    }

    /// All vectors within radius `r` of `query` under [`distance_metric`],
    /// sorted nearest-first.
    #[tracing::instrument(skip(self, query))]
    pub fn range_search(&self, query: &[f32], r: f32) -> Result<Vec<ScoredId>, SimilarityError> {
        if query.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dim,
                found: query.len(),
            });
        }
        let mut query = query.to_vec();
        if self.normalizes_on_insert() {
            crate::distance::normalize(&mut query);
        }
        let guard = self.vectors.read();
        let mut results: Vec<ScoredId> = guard
            .iter()
            .filter_map(|(id, v)| {
                let d = distance_metric(self.algorithm, &query, v);
                (d <= r).then(|| ScoredId::new(id.clone(), -d))
            })
            .collect();
        results.sort_by(|a, b| b.cmp(a));
        Ok(results)
    }
}

impl VectorIndex for FlatIndex {
    #[tracing::instrument(skip(self, vector))]
    fn insert(&self, id: String, mut vector: Vec<f32>) -> Result<(), SimilarityError> {
        if vector.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dim,
                found: vector.len(),
            });
        }
        if self.normalizes_on_insert() {
            crate::distance::normalize(&mut vector);
        }
        self.vectors.write().insert(id, vector);
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
        let mut query = query.to_vec();
        if self.normalizes_on_insert() {
            crate::distance::normalize(&mut query);
        }
        let guard = self.vectors.read();
        let capacity = std::num::NonZeroUsize::new(k.max(1)).unwrap();
        let mut heap = BoundedMaxHeap::new(capacity);
        for (id, v) in guard.iter() {
            let s = crate::score(self.algorithm, &query, v);
            heap.push(ScoredId::new(id.clone(), s));
        }
        Ok(heap.into_sorted_vec())
    }

    fn delete(&self, id: &str) -> Result<(), SimilarityError> {
        self.vectors.write().remove(id);
        Ok(())
    }

    fn size(&self) -> usize {
        self.vectors.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exact_search_finds_closest_match() {
        let index = FlatIndex::new(3, Algorithm::CosineSimilarity);
        index.insert("a".into(), vec![1.0, 0.0, 0.0]).unwrap();
        index.insert("b".into(), vec![0.0, 1.0, 0.0]).unwrap();
        index.insert("c".into(), vec![0.9, 0.1, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < 1e-4);
    }

    #[test]
    fn search_returns_fewer_than_k_when_index_is_small() {
        let index = FlatIndex::new(2, Algorithm::EuclideanDistance);
        index.insert("a".into(), vec![1.0, 1.0]).unwrap();
        let results = index.search(&[0.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn delete_removes_vector() {
        let index = FlatIndex::new(2, Algorithm::EuclideanDistance);
        index.insert("a".into(), vec![1.0, 1.0]).unwrap();
        index.delete("a").unwrap();
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let index = FlatIndex::new(3, Algorithm::EuclideanDistance);
        assert!(matches!(
            index.insert("a".into(), vec![1.0, 0.0]).unwrap_err(),
            SimilarityError::DimensionMismatch { .. }
        ));
    }

    #[test]
    fn range_search_respects_radius() {
        let index = FlatIndex::new(2, Algorithm::EuclideanDistance);
        index.insert("near".into(), vec![0.1, 0.0]).unwrap();
        index.insert("far".into(), vec![10.0, 0.0]).unwrap();
        let results = index.range_search(&[0.0, 0.0], 1.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "near");
    }
}
