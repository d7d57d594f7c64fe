//! Product quantization: splits each vector into `M` subspaces, each
//! compressed to one of `K` centroids, giving a `u8[M]` encoded form.

use crate::distance::squared_euclidean_distance;
use crate::error::SimilarityError;
use crate::quantizer::{deserialize_codebook, kmeans, serialize_codebook, Quantizer};

pub struct ProductQuantizer {
    dim: usize,
    m: usize,
    k: usize,
    sub_dim: usize,
    /// `codebooks[subspace][centroid]` → `sub_dim`-length centroid.
    codebooks: Vec<Vec<Vec<f32>>>,
    trained: bool,
}

impl ProductQuantizer {
    /// `dim % m == 0` and `k <= 256` (a centroid index must fit in `u8`).
    pub fn new(dim: usize, m: usize, k: usize) -> Result<Self, SimilarityError> {
        if m == 0 || dim % m != 0 {
            return Err(SimilarityError::InvalidParameter {
                name: "m",
                reason: format!("dim ({dim}) must be a multiple of m ({m})"),
            });
        }
        if k == 0 || k > 256 {
            return Err(SimilarityError::InvalidParameter {
                name: "k",
                reason: format!("k ({k}) must be in 1..=256"),
            });
        }
        Ok(Self {
            dim,
            m,
            k,
            sub_dim: dim / m,
            codebooks: Vec::new(),
            trained: false,
        })
    }

    fn subvector(v: &[f32], sub_dim: usize, subspace: usize) -> &[f32] {
        &v[subspace * sub_dim..(subspace + 1) * sub_dim]
    }

    /// Precomputes `dist_table[m][k]`: squared distance from the query's
    /// subvector `m` to each of the `k` centroids of that subspace.
    pub fn distance_table(&self, query: &[f32]) -> Result<Vec<Vec<f32>>, SimilarityError> {
        if !self.trained {
            return Err(SimilarityError::Untrained {
                operation: "distance_table",
            });
        }
        Ok(self
            .codebooks
            .iter()
            .enumerate()
            .map(|(m, centroids)| {
                let sub_q = Self::subvector(query, self.sub_dim, m);
                centroids
                    .iter()
                    .map(|c| squared_euclidean_distance(sub_q, c))
                    .collect()
            })
            .collect())
    }

    /// Asymmetric distance between a query and an already-encoded point,
    /// using a precomputed distance table: `Σ dist_table[m][codes[m]]`.
    pub fn asymmetric_distance(table: &[Vec<f32>], codes: &[u8]) -> f32 {
        table
            .iter()
            .zip(codes.iter())
            .map(|(row, &c)| row[c as usize])
            .sum()
    }
}

impl Quantizer for ProductQuantizer {
    type Code = Vec<u8>;

    fn train(&mut self, vectors: &[Vec<f32>]) -> Result<(), SimilarityError> {
        let required = self.k * self.m;
        if vectors.len() < required {
            return Err(SimilarityError::InsufficientTrainingData {
                required,
                given: vectors.len(),
            });
        }
        let mut codebooks = Vec::with_capacity(self.m);
        for subspace in 0..self.m {
            let sub_vectors: Vec<Vec<f32>> = vectors
                .iter()
                .map(|v| Self::subvector(v, self.sub_dim, subspace).to_vec())
                .collect();
            let centroids = kmeans::train(
                &sub_vectors,
                self.k,
                kmeans::DEFAULT_MAX_ITERS,
                kmeans::Init::Random {
                    seed: subspace as u64,
                },
            );
            codebooks.push(centroids);
        }
        self.codebooks = codebooks;
        self.trained = true;
        Ok(())
    }

    fn encode(&self, v: &[f32]) -> Result<Vec<u8>, SimilarityError> {
        if !self.trained {
            return Err(SimilarityError::Untrained { operation: "encode" });
        }
        if v.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dim,
                found: v.len(),
            });
        }
        Ok(self
            .codebooks
            .iter()
            .enumerate()
            .map(|(m, centroids)| {
                let sub_v = Self::subvector(v, self.sub_dim, m);
                centroids
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, squared_euclidean_distance(sub_v, c)))
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                    .map(|(i, _)| i as u8)
                    .unwrap_or(0)
            })
            .collect())
    }

    fn decode(&self, code: &Vec<u8>) -> Result<Vec<f32>, SimilarityError> {
        if !self.trained {
            return Err(SimilarityError::Untrained { operation: "decode" });
        }
        let mut out = Vec::with_capacity(self.dim);
        for (m, &c) in code.iter().enumerate() {
            out.extend_from_slice(&self.codebooks[m][c as usize]);
        }
        Ok(out)
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn compression_ratio(&self) -> f32 {
        (4 * self.dim) as f32 / self.m as f32
    }
}

impl ProductQuantizer {
    pub fn codebook_serialize(&self) -> Vec<u8> {
        let flat: Vec<f32> = self
            .codebooks
            .iter()
            .flatten()
            .flatten()
            .copied()
            .collect();
        serialize_codebook(self.m as u32, self.k as u32, self.dim as u32, self.sub_dim as u32, &flat)
    }

    pub fn codebook_deserialize(bytes: &[u8]) -> Result<Self, SimilarityError> {
        let (m, k, d, sub_dim, flat) = deserialize_codebook(bytes)?;
        let (m, k, d, sub_dim) = (m as usize, k as usize, d as usize, sub_dim as usize);
        let mut codebooks = Vec::with_capacity(m);
        let mut cursor = 0;
        for _ in 0..m {
            let mut centroids = Vec::with_capacity(k);
            for _ in 0..k {
                centroids.push(flat[cursor..cursor + sub_dim].to_vec());
                cursor += sub_dim;
            }
            codebooks.push(centroids);
        }
        Ok(Self {
            dim: d,
            m,
            k,
            sub_dim,
            codebooks,
            trained: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn training_set() -> Vec<Vec<f32>> {
        let mut v = Vec::new();
        for i in 0..16 {
            let x = i as f32;
            v.push(vec![x, x, -x, -x]);
        }
        v
    }

    #[test]
    fn rejects_dim_not_divisible_by_m() {
        assert!(ProductQuantizer::new(5, 2, 4).is_err());
    }

    #[test]
    fn rejects_k_over_256() {
        assert!(ProductQuantizer::new(4, 2, 300).is_err());
    }

    #[test]
    fn encode_before_train_is_untrained_error() {
        let pq = ProductQuantizer::new(4, 2, 4).unwrap();
        assert!(matches!(
            pq.encode(&[1.0, 2.0, 3.0, 4.0]).unwrap_err(),
            SimilarityError::Untrained { .. }
        ));
    }

    #[test]
    fn train_requires_k_times_m_points() {
        let mut pq = ProductQuantizer::new(4, 2, 4).unwrap();
        let too_few = vec![vec![0.0; 4]; 3];
        assert!(matches!(
            pq.train(&too_few).unwrap_err(),
            SimilarityError::InsufficientTrainingData { required: 8, given: 3 }
        ));
    }

    #[test]
    fn compression_ratio_matches_formula() {
        let pq = ProductQuantizer::new(8, 2, 4).unwrap();
        assert_eq!(pq.compression_ratio(), (4 * 8) as f32 / 2.0);
    }

    #[test]
    fn encode_decode_round_trip_is_approximate() {
        let mut pq = ProductQuantizer::new(4, 2, 4).unwrap();
        pq.train(&training_set()).unwrap();
        let v = vec![3.0, 3.0, -3.0, -3.0];
        let code = pq.encode(&v).unwrap();
        let decoded = pq.decode(&code).unwrap();
        assert_eq!(decoded.len(), 4);
    }

    #[test]
    fn codebook_round_trips() {
        let mut pq = ProductQuantizer::new(4, 2, 4).unwrap();
        pq.train(&training_set()).unwrap();
        let bytes = pq.codebook_serialize();
        let restored = ProductQuantizer::codebook_deserialize(&bytes).unwrap();
        assert_eq!(restored.dim, pq.dim);
        assert_eq!(restored.m, pq.m);
        assert_eq!(restored.k, pq.k);
        assert!(restored.is_trained());
    }
}
