/// Similarity/distance kernels usable to score a pair of vectors.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Algorithm {
    /// `dot/(‖a‖·‖b‖)`; returns 0 on zero-norm.
    CosineSimilarity,
    /// Plain dot product.
    DotProductSimilarity,
    /// `√Σ(aᵢ−bᵢ)²`; higher-is-similar form returns `−distance`.
    EuclideanDistance,
    /// Bitwise XOR popcount over two equal-length byte arrays.
    HammingDistance,
}
