//! Locality-sensitive hashing via random projections: `num_tables`
//! independent hash tables, each built from `num_hash_funcs` random Gaussian
//! projections over `R^d`, producing a `num_hash_funcs`-bit signature per
//! vector. Vectors sharing a signature in any table are candidates.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use types::Algorithm;

use crate::error::SimilarityError;
use crate::heap::BoundedMaxHeap;
use crate::{ScoredId, VectorIndex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LshConfig {
    pub num_tables: NonZeroUsize,
    pub num_hash_funcs: NonZeroUsize,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            num_tables: NonZeroUsize::new(4).unwrap(),
            num_hash_funcs: NonZeroUsize::new(10).unwrap(),
        }
    }
}

/// A `Vec<bool>` signature, one bit per hash function.
type Signature = Vec<bool>;

struct HashTable {
    /// One random Gaussian vector per hash function.
    projections: Vec<Vec<f32>>,
    buckets: HashMap<Signature, Vec<String>>,
}

impl HashTable {
    fn new(dim: usize, num_hash_funcs: usize, rng: &mut StdRng) -> Self {
        let projections = (0..num_hash_funcs)
            .map(|_| (0..dim).map(|_| sample_gaussian(rng)).collect())
            .collect();
        Self {
            projections,
            buckets: HashMap::new(),
        }
    }

    /// Raw dot products of `v` against each projection, in bit order.
    fn projection_values(&self, v: &[f32]) -> Vec<f32> {
        self.projections
            .iter()
            .map(|p| crate::distance::dot_product(p, v))
            .collect()
    }

    fn signature_from_values(values: &[f32]) -> Signature {
        values.iter().map(|&x| x >= 0.0).collect()
    }
}

/// Standard-normal sample via the Box-Muller transform. `rand` does not
/// carry a Gaussian distribution without the `rand_distr` crate, and
/// bringing in another dependency for one call site is not worth it.
fn sample_gaussian(rng: &mut StdRng) -> f32 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
}

struct LshState {
    tables: Vec<HashTable>,
    vectors: HashMap<String, Vec<f32>>,
}

pub struct LshIndex {
    dim: usize,
    algorithm: Algorithm,
    config: LshConfig,
    state: RwLock<LshState>,
}

impl LshIndex {
    pub fn new(dim: usize, algorithm: Algorithm, config: LshConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let tables = (0..config.num_tables.get())
            .map(|_| HashTable::new(dim, config.num_hash_funcs.get(), &mut rng))
            .collect();
        Self {
            dim,
            algorithm,
            config,
            state: RwLock::new(LshState {
                tables,
                vectors: HashMap::new(),
            }),
        }
    }

    fn rank_candidates(
        &self,
        state: &LshState,
        query: &[f32],
        candidates: impl Iterator<Item = String>,
        k: usize,
    ) -> Vec<ScoredId> {
        let capacity = NonZeroUsize::new(k).unwrap();
        let mut heap = BoundedMaxHeap::new(capacity);
        let mut seen = std::collections::HashSet::new();
        for id in candidates {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(v) = state.vectors.get(&id) {
                let s = crate::score(self.algorithm, query, v);
                heap.push(ScoredId::new(id, s));
            }
        }
        heap.into_sorted_vec()
    }

    /// Exact search restricted to the union of each table's bucket at the
    /// query's own signature.
    #[tracing::instrument(skip(self, query))]
    pub fn search_basic(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, SimilarityError> {
        self.validate_query(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let candidates = state.tables.iter().flat_map(|t| {
            let sig = HashTable::signature_from_values(&t.projection_values(query));
            t.buckets.get(&sig).cloned().unwrap_or_default()
        });
        Ok(self.rank_candidates(&state, query, candidates, k))
    }

    /// Like [`search_basic`](Self::search_basic), but each table also probes
    /// the `num_probes` signatures obtained by flipping, one at a time, the
    /// bit whose projection value is closest to zero (the least confident
    /// bits, most likely to have landed on the wrong side of the hyperplane
    /// for a near neighbor).
    #[tracing::instrument(skip(self, query))]
    pub fn search_multiprobe(
        &self,
        query: &[f32],
        k: usize,
        num_probes: usize,
    ) -> Result<Vec<ScoredId>, SimilarityError> {
        self.validate_query(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let mut candidates = Vec::new();
        for table in &state.tables {
            let values = table.projection_values(query);
            let primary = HashTable::signature_from_values(&values);
            if let Some(ids) = table.buckets.get(&primary) {
                candidates.extend(ids.iter().cloned());
            }

            let mut bit_order: Vec<usize> = (0..values.len()).collect();
            bit_order.sort_by(|&a, &b| values[a].abs().partial_cmp(&values[b].abs()).unwrap());

            for &bit in bit_order.iter().take(num_probes) {
                let mut probe = primary.clone();
                probe[bit] = !probe[bit];
                if let Some(ids) = table.buckets.get(&probe) {
                    candidates.extend(ids.iter().cloned());
                }
            }
        }
        Ok(self.rank_candidates(&state, query, candidates.into_iter(), k))
    }

    fn validate_query(&self, query: &[f32]) -> Result<(), SimilarityError> {
        if query.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dim,
                found: query.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for LshIndex {
    #[tracing::instrument(skip(self, vector))]
    fn insert(&self, id: String, vector: Vec<f32>) -> Result<(), SimilarityError> {
        self.validate_query(&vector)?;
        let mut state = self.state.write();
        for table in state.tables.iter_mut() {
            let sig = HashTable::signature_from_values(&table.projection_values(&vector));
            table.buckets.entry(sig).or_default().push(id.clone());
        }
        state.vectors.insert(id, vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, SimilarityError> {
        self.search_basic(query, k)
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, id: &str) -> Result<(), SimilarityError> {
        let mut state = self.state.write();
        let Some(vector) = state.vectors.remove(id) else {
            return Ok(());
        };
        for table in state.tables.iter_mut() {
            let sig = HashTable::signature_from_values(&table.projection_values(&vector));
            if let Some(bucket) = table.buckets.get_mut(&sig) {
                bucket.retain(|existing| existing != id);
            }
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.state.read().vectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index() -> LshIndex {
        LshIndex::new(
            4,
            Algorithm::CosineSimilarity,
            LshConfig {
                num_tables: NonZeroUsize::new(4).unwrap(),
                num_hash_funcs: NonZeroUsize::new(6).unwrap(),
            },
            11,
        )
    }

    #[test]
    fn finds_close_neighbor() {
        let index = index();
        index.insert("a".into(), vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        index.insert("b".into(), vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        index
            .insert("c".into(), vec![0.95, 0.05, 0.0, 0.0])
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        assert!(results.iter().any(|r| r.id == "a"));
    }

    #[test]
    fn delete_removes_vector_from_all_tables() {
        let index = index();
        index.insert("a".into(), vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        index.delete("a").unwrap();
        assert_eq!(index.size(), 0);
        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn multiprobe_finds_more_than_basic_search() {
        let index = index();
        for i in 0..30 {
            let angle = i as f32 * 0.02;
            index
                .insert(format!("id{i}"), vec![angle.cos(), angle.sin(), 0.0, 0.0])
                .unwrap();
        }
        let basic = index.search_basic(&[1.0, 0.0, 0.0, 0.0], 30).unwrap();
        let multi = index
            .search_multiprobe(&[1.0, 0.0, 0.0, 0.0], 30, 3)
            .unwrap();
        assert!(multi.len() >= basic.len());
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let index = index();
        assert!(matches!(
            index.insert("a".into(), vec![1.0, 0.0]).unwrap_err(),
            SimilarityError::DimensionMismatch { .. }
        ));
    }
}
