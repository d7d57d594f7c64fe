//! ANN index family: Flat (exact), IVF, HNSW, LSH. Each holds a single
//! reader-writer lock guarding its internal state; searches take the read
//! lock, inserts/deletes take the write lock.

pub mod flat;
pub mod hnsw;
pub mod ivf;
pub mod lsh;

pub use flat::FlatIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use ivf::{IvfConfig, IvfIndex};
pub use lsh::{LshConfig, LshIndex};

/// A distance-like measure where *lower* means *closer*, used by
/// [`flat::FlatIndex::range_search`]. For similarity-style algorithms
/// (cosine, dot) this is `1 - score`; for Euclidean it is the raw distance.
pub(crate) fn distance_metric(algorithm: types::Algorithm, a: &[f32], b: &[f32]) -> f32 {
    use types::Algorithm;
    match algorithm {
        Algorithm::EuclideanDistance => crate::distance::euclidean_distance(a, b),
        Algorithm::HammingDistance => -crate::score(algorithm, a, b),
        _ => 1.0 - crate::score(algorithm, a, b),
    }
}
