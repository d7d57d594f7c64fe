//! Vector compression: Product, Scalar, and Binary quantization, all sharing
//! the k-means training routine in [`kmeans`].

pub mod binary;
pub mod kmeans;
pub mod product;
pub mod scalar;

pub use binary::BinaryQuantizer;
pub use product::ProductQuantizer;
pub use scalar::ScalarQuantizer;

use crate::error::SimilarityError;

/// Common contract for all quantizers: train once on a representative
/// sample, then encode/decode individual vectors against the trained
/// codebook. Encoding/decoding before training is a [`SimilarityError::Untrained`]
/// error, not a panic.
pub trait Quantizer {
    type Code;

    fn train(&mut self, vectors: &[Vec<f32>]) -> Result<(), SimilarityError>;
    fn encode(&self, v: &[f32]) -> Result<Self::Code, SimilarityError>;
    fn decode(&self, code: &Self::Code) -> Result<Vec<f32>, SimilarityError>;
    fn is_trained(&self) -> bool;

    /// Ratio of the original `f32` encoding size to the quantized size.
    fn compression_ratio(&self) -> f32;
}

/// Writes the four-`u32`-little-endian-header codebook format shared by
/// quantizers whose codebook is a flat `f32` array: `M, K, D, SubDim`
/// followed by `M * K * SubDim` `f32` little-endian values.
pub fn serialize_codebook(m: u32, k: u32, d: u32, sub_dim: u32, data: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + data.len() * 4);
    for header in [m, k, d, sub_dim] {
        buf.extend_from_slice(&header.to_le_bytes());
    }
    for &x in data {
        buf.extend_from_slice(&x.to_le_bytes());
    }
    buf
}

/// Parses the format written by [`serialize_codebook`], returning
/// `(m, k, d, sub_dim, data)`. Rejects truncated buffers.
pub fn deserialize_codebook(bytes: &[u8]) -> Result<(u32, u32, u32, u32, Vec<f32>), SimilarityError> {
    if bytes.len() < 16 {
        return Err(SimilarityError::MalformedCodebook {
            reason: "buffer shorter than the 16-byte header".into(),
        });
    }
    let read_u32 = |s: &[u8]| u32::from_le_bytes(s.try_into().unwrap());
    let m = read_u32(&bytes[0..4]);
    let k = read_u32(&bytes[4..8]);
    let d = read_u32(&bytes[8..12]);
    let sub_dim = read_u32(&bytes[12..16]);

    let rest = &bytes[16..];
    let expected_floats = m as usize * k as usize * sub_dim as usize;
    if rest.len() != expected_floats * 4 {
        return Err(SimilarityError::MalformedCodebook {
            reason: format!(
                "header declares {expected_floats} floats but buffer holds {}",
                rest.len() / 4
            ),
        });
    }
    let data = rest
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    Ok((m, k, d, sub_dim, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn codebook_round_trips() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let bytes = serialize_codebook(1, 2, 4, 2, &data);
        let (m, k, d, sub_dim, decoded) = deserialize_codebook(&bytes).unwrap();
        assert_eq!((m, k, d, sub_dim), (1, 2, 4, 2));
        assert_eq!(decoded, data);
    }

    #[test]
    fn rejects_truncated_codebook() {
        let mut bytes = serialize_codebook(1, 2, 4, 2, &[1.0, 2.0, 3.0, 4.0]);
        bytes.truncate(bytes.len() - 2);
        assert!(deserialize_codebook(&bytes).is_err());
    }
}
