//! Inverted-file index: vectors are partitioned by k-means centroid, and a
//! query only scans the `n_probe` nearest partitions instead of the whole
//! dataset.

use std::num::NonZeroUsize;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use types::Algorithm;

use crate::error::SimilarityError;
use crate::heap::BoundedMaxHeap;
use crate::quantizer::kmeans;
use crate::{ScoredId, VectorIndex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfConfig {
    pub n_centroids: NonZeroUsize,
    pub n_probe: NonZeroUsize,
    pub kmeans_iters: usize,
}

impl Default for IvfConfig {
    fn default() -> Self {
        Self {
            n_centroids: NonZeroUsize::new(100).unwrap(),
            n_probe: NonZeroUsize::new(8).unwrap(),
            kmeans_iters: kmeans::DEFAULT_MAX_ITERS,
        }
    }
}

struct IvfState {
    centroids: Vec<Vec<f32>>,
    inverted_lists: Vec<Vec<usize>>,
    vectors: Vec<Vec<f32>>,
    ids: Vec<String>,
    trained: bool,
}

pub struct IvfIndex {
    dim: usize,
    algorithm: Algorithm,
    config: RwLock<IvfConfig>,
    state: RwLock<IvfState>,
}

impl IvfIndex {
    pub fn new(dim: usize, algorithm: Algorithm, config: IvfConfig) -> Self {
        let n_centroids = config.n_centroids.get();
        Self {
            dim,
            algorithm,
            config: RwLock::new(config),
            state: RwLock::new(IvfState {
                centroids: Vec::new(),
                inverted_lists: vec![Vec::new(); n_centroids],
                vectors: Vec::new(),
                ids: Vec::new(),
                trained: false,
            }),
        }
    }

    /// Fits centroids over a representative sample. Existing vectors are
    /// re-bucketed against the new centroids.
    pub fn train(&self, vectors: &[Vec<f32>]) -> Result<(), SimilarityError> {
        let n_centroids = self.config.read().n_centroids.get();
        if vectors.len() < n_centroids {
            return Err(SimilarityError::InsufficientTrainingData {
                required: n_centroids,
                given: vectors.len(),
            });
        }
        let iters = self.config.read().kmeans_iters;
        let centroids = kmeans::train(
            vectors,
            n_centroids,
            iters,
            kmeans::Init::KMeansPlusPlus { seed: 1337 },
        );

        let mut state = self.state.write();
        state.centroids = centroids;
        state.inverted_lists = vec![Vec::new(); n_centroids];
        state.trained = true;
        let existing: Vec<Vec<f32>> = state.vectors.clone();
        for (i, v) in existing.iter().enumerate() {
            let c = nearest_centroid(&state.centroids, v);
            state.inverted_lists[c].push(i);
        }
        Ok(())
    }

    /// Clamps `n_probe` to at most `n_centroids`.
    pub fn set_n_probe(&self, n_probe: usize) {
        let n_centroids = self.config.read().n_centroids.get();
        let clamped = n_probe.clamp(1, n_centroids);
        self.config.write().n_probe = NonZeroUsize::new(clamped).unwrap();
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], v: &[f32]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, crate::distance::squared_euclidean_distance(v, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap()
}

impl VectorIndex for IvfIndex {
    #[tracing::instrument(skip(self, vector))]
    fn insert(&self, id: String, vector: Vec<f32>) -> Result<(), SimilarityError> {
        if vector.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dim,
                found: vector.len(),
            });
        }
        let mut state = self.state.write();
        if !state.trained {
            return Err(SimilarityError::Untrained { operation: "insert" });
        }
        let c = nearest_centroid(&state.centroids, &vector);
        let idx = state.vectors.len();
        state.vectors.push(vector);
        state.ids.push(id);
        state.inverted_lists[c].push(idx);
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
        if !state.trained || state.centroids.is_empty() {
            return Ok(Vec::new());
        }
        let n_probe = self.config.read().n_probe.get().min(state.centroids.len());

        let mut centroid_order: Vec<usize> = (0..state.centroids.len()).collect();
        centroid_order.sort_by(|&a, &b| {
            let da = crate::distance::squared_euclidean_distance(query, &state.centroids[a]);
            let db = crate::distance::squared_euclidean_distance(query, &state.centroids[b]);
            da.partial_cmp(&db).unwrap()
        });

        let capacity = std::num::NonZeroUsize::new(k).unwrap();
        let mut heap = BoundedMaxHeap::new(capacity);
        for &c in centroid_order.iter().take(n_probe) {
            for &idx in &state.inverted_lists[c] {
                let s = crate::score(self.algorithm, query, &state.vectors[idx]);
                heap.push(ScoredId::new(state.ids[idx].clone(), s));
            }
        }
        Ok(heap.into_sorted_vec())
    }

    /// O(n): shifts the vector/id arrays and rewrites every inverted list's
    /// indices above the removed slot. Acceptable for small indices;
    /// tombstones would be needed at larger scale (documented, not
    /// implemented here).
    #[tracing::instrument(skip(self))]
    fn delete(&self, id: &str) -> Result<(), SimilarityError> {
        let mut state = self.state.write();
        let Some(pos) = state.ids.iter().position(|existing| existing == id) else {
            return Ok(());
        };
        state.ids.remove(pos);
        state.vectors.remove(pos);
        for list in state.inverted_lists.iter_mut() {
            list.retain(|&idx| idx != pos);
            for idx in list.iter_mut() {
                if *idx > pos {
                    *idx -= 1;
                }
            }
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.state.read().ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dataset() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
        ]
    }

    #[test]
    fn insert_before_train_is_untrained_error() {
        let index = IvfIndex::new(
            2,
            Algorithm::EuclideanDistance,
            IvfConfig {
                n_centroids: NonZeroUsize::new(2).unwrap(),
                ..Default::default()
            },
        );
        assert!(matches!(
            index.insert("a".into(), vec![0.0, 0.0]).unwrap_err(),
            SimilarityError::Untrained { .. }
        ));
    }

    #[test]
    fn n_probe_equal_to_n_centroids_recovers_flat_ordering() {
        let config = IvfConfig {
            n_centroids: NonZeroUsize::new(2).unwrap(),
            n_probe: NonZeroUsize::new(2).unwrap(),
            ..Default::default()
        };
        let index = IvfIndex::new(2, Algorithm::EuclideanDistance, config);
        let data = dataset();
        index.train(&data).unwrap();
        for (i, v) in data.iter().enumerate() {
            index.insert(format!("id{i}"), v.clone()).unwrap();
        }

        let flat = crate::index::FlatIndex::new(2, Algorithm::EuclideanDistance);
        for (i, v) in data.iter().enumerate() {
            flat.insert(format!("id{i}"), v.clone()).unwrap();
        }

        let ivf_results = index.search(&[0.0, 0.0], 4).unwrap();
        let flat_results = flat.search(&[0.0, 0.0], 4).unwrap();
        let ivf_ids: Vec<_> = ivf_results.iter().map(|r| r.id.clone()).collect();
        let flat_ids: Vec<_> = flat_results.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ivf_ids, flat_ids);
    }

    #[test]
    fn set_n_probe_clamps_to_n_centroids() {
        let index = IvfIndex::new(
            2,
            Algorithm::EuclideanDistance,
            IvfConfig {
                n_centroids: NonZeroUsize::new(3).unwrap(),
                ..Default::default()
            },
        );
        index.set_n_probe(100);
        assert_eq!(index.config.read().n_probe.get(), 3);
    }

    #[test]
    fn delete_rewrites_inverted_list_indices() {
        let config = IvfConfig {
            n_centroids: NonZeroUsize::new(2).unwrap(),
            n_probe: NonZeroUsize::new(2).unwrap(),
            ..Default::default()
        };
        let index = IvfIndex::new(2, Algorithm::EuclideanDistance, config);
        let data = dataset();
        index.train(&data).unwrap();
        for (i, v) in data.iter().enumerate() {
            index.insert(format!("id{i}"), v.clone()).unwrap();
        }
        index.delete("id0").unwrap();
        assert_eq!(index.size(), 3);
        let results = index.search(&[10.0, 10.0], 3).unwrap();
        assert!(results.iter().all(|r| r.id != "id0"));
    }
}
