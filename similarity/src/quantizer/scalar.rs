//! Scalar quantization: per-dimension min/max learned from training data,
//! with `n_bits ∈ [1,8]` per component, bit-packed into bytes.

use crate::error::SimilarityError;
use crate::quantizer::Quantizer;

pub struct ScalarQuantizer {
    dim: usize,
    n_bits: u8,
    min: Vec<f32>,
    max: Vec<f32>,
    trained: bool,
}

impl ScalarQuantizer {
    pub fn new(dim: usize, n_bits: u8) -> Result<Self, SimilarityError> {
        if !(1..=8).contains(&n_bits) {
            return Err(SimilarityError::InvalidParameter {
                name: "n_bits",
                reason: format!("n_bits ({n_bits}) must be in 1..=8"),
            });
        }
        Ok(Self {
            dim,
            n_bits,
            min: vec![0.0; dim],
            max: vec![0.0; dim],
            trained: false,
        })
    }

    fn levels(&self) -> u32 {
        (1u32 << self.n_bits) - 1
    }

    fn quantize_component(&self, i: usize, x: f32) -> u32 {
        let (lo, hi) = (self.min[i], self.max[i]);
        if hi <= lo {
            return 0;
        }
        let t = ((x - lo) / (hi - lo)).clamp(0.0, 1.0);
        (t * self.levels() as f32).round() as u32
    }

    fn dequantize_component(&self, i: usize, level: u32) -> f32 {
        let (lo, hi) = (self.min[i], self.max[i]);
        if hi <= lo {
            return lo;
        }
        lo + (level as f32 / self.levels() as f32) * (hi - lo)
    }
}

impl Quantizer for ScalarQuantizer {
    type Code = Vec<u8>;

    fn train(&mut self, vectors: &[Vec<f32>]) -> Result<(), SimilarityError> {
        if vectors.is_empty() {
            return Err(SimilarityError::InsufficientTrainingData {
                required: 1,
                given: 0,
            });
        }
        let mut min = vectors[0].clone();
        let mut max = vectors[0].clone();
        for v in &vectors[1..] {
            for i in 0..self.dim {
                min[i] = min[i].min(v[i]);
                max[i] = max[i].max(v[i]);
            }
        }
        self.min = min;
        self.max = max;
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
        let mut bits: Vec<bool> = Vec::with_capacity(self.dim * self.n_bits as usize);
        for (i, &x) in v.iter().enumerate() {
            let level = self.quantize_component(i, x);
            for b in (0..self.n_bits).rev() {
                bits.push((level >> b) & 1 == 1);
            }
        }
        Ok(pack_bits(&bits))
    }

    fn decode(&self, code: &Vec<u8>) -> Result<Vec<f32>, SimilarityError> {
        if !self.trained {
            return Err(SimilarityError::Untrained { operation: "decode" });
        }
        let bits = unpack_bits(code, self.dim * self.n_bits as usize);
        let mut out = Vec::with_capacity(self.dim);
        for i in 0..self.dim {
            let mut level = 0u32;
            for b in 0..self.n_bits as usize {
                level = (level << 1) | bits[i * self.n_bits as usize + b] as u32;
            }
            out.push(self.dequantize_component(i, level));
        }
        Ok(out)
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn compression_ratio(&self) -> f32 {
        32.0 / self.n_bits as f32
    }
}

pub(crate) fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &b) in bits.iter().enumerate() {
        if b {
            out[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    out
}

pub(crate) fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| (bytes[i / 8] >> (7 - (i % 8))) & 1 == 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_n_bits_out_of_range() {
        assert!(ScalarQuantizer::new(4, 0).is_err());
        assert!(ScalarQuantizer::new(4, 9).is_err());
    }

    #[test]
    fn compression_ratio_matches_formula() {
        let sq = ScalarQuantizer::new(4, 8).unwrap();
        assert_eq!(sq.compression_ratio(), 4.0);
    }

    #[test]
    fn encode_decode_approximates_original() {
        let mut sq = ScalarQuantizer::new(2, 8).unwrap();
        sq.train(&[vec![0.0, 0.0], vec![10.0, 10.0]]).unwrap();
        let code = sq.encode(&[5.0, 5.0]).unwrap();
        let decoded = sq.decode(&code).unwrap();
        assert!((decoded[0] - 5.0).abs() < 0.1);
        assert!((decoded[1] - 5.0).abs() < 0.1);
    }

    #[test]
    fn bit_packing_round_trips() {
        let bits = vec![true, false, true, true, false, false, true, false, true];
        let packed = pack_bits(&bits);
        let unpacked = unpack_bits(&packed, bits.len());
        assert_eq!(unpacked, bits);
    }
}
