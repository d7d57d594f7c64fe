pub mod distance;
pub mod embedding_key;
pub mod error;
pub mod heap;
pub mod index;
pub mod multi;
pub mod quantizer;

pub use embedding_key::EmbeddingKey;
pub use error::SimilarityError;
pub use heap::{BoundedMaxHeap, BoundedMinHeap};
pub use types::Algorithm;

/// Computes a similarity/distance score between two vectors under the given
/// algorithm. Always "higher is more similar", including for
/// [`Algorithm::EuclideanDistance`], which returns `-distance`.
pub fn score(algorithm: Algorithm, a: &[f32], b: &[f32]) -> f32 {
    match algorithm {
        Algorithm::CosineSimilarity => distance::cosine_similarity(a, b),
        Algorithm::DotProductSimilarity => distance::dot_product(a, b),
        Algorithm::EuclideanDistance => distance::euclidean_similarity(a, b),
        Algorithm::HammingDistance => {
            let a_bits: Vec<u8> = a.iter().map(|&x| x.to_bits() as u8).collect();
            let b_bits: Vec<u8> = b.iter().map(|&x| x.to_bits() as u8).collect();
            -(distance::hamming_distance(&a_bits, &b_bits) as f32)
        }
    }
}

/// One scored candidate returned from an ANN index search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

impl ScoredId {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

impl Eq for ScoredId {}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Capability set every ANN index implements: insert/search/delete/size.
/// Modeled as an explicit trait rather than an adapter-wrapped enum.
pub trait VectorIndex: Send + Sync {
    /// Inserts a vector under `id`. Implementations that forbid duplicate
    /// ids (HNSW) return [`SimilarityError::DuplicateInsert`].
    fn insert(&self, id: String, vector: Vec<f32>) -> Result<(), SimilarityError>;

    /// Returns the `k` nearest ids by the index's configured similarity,
    /// best first. Returns fewer than `k` if the index holds fewer points.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, SimilarityError>;

    /// Removes `id` from the index, if present.
    fn delete(&self, id: &str) -> Result<(), SimilarityError>;

    /// Number of live (non-deleted) vectors held by the index.
    fn size(&self) -> usize;
}
