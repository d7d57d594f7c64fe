//! Binary quantization: one bit per dimension, thresholded against the
//! per-dimension mean learned during training.

use crate::error::SimilarityError;
use crate::quantizer::scalar::{pack_bits, unpack_bits};
use crate::quantizer::Quantizer;

pub struct BinaryQuantizer {
    dim: usize,
    threshold: Vec<f32>,
    trained: bool,
}

impl BinaryQuantizer {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            threshold: vec![0.0; dim],
            trained: false,
        }
    }
}

impl Quantizer for BinaryQuantizer {
    type Code = Vec<u8>;

    fn train(&mut self, vectors: &[Vec<f32>]) -> Result<(), SimilarityError> {
        if vectors.is_empty() {
            return Err(SimilarityError::InsufficientTrainingData {
                required: 1,
                given: 0,
            });
        }
        let mut sums = vec![0.0f32; self.dim];
        for v in vectors {
            for (s, &x) in sums.iter_mut().zip(v.iter()) {
                *s += x;
            }
        }
        for s in sums.iter_mut() {
            *s /= vectors.len() as f32;
        }
        self.threshold = sums;
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
        let bits: Vec<bool> = v
            .iter()
            .zip(self.threshold.iter())
            .map(|(&x, &t)| x >= t)
            .collect();
        Ok(pack_bits(&bits))
    }

    fn decode(&self, code: &Vec<u8>) -> Result<Vec<f32>, SimilarityError> {
        if !self.trained {
            return Err(SimilarityError::Untrained { operation: "decode" });
        }
        let bits = unpack_bits(code, self.dim);
        Ok(bits
            .iter()
            .zip(self.threshold.iter())
            .map(|(&b, &t)| if b { t + 0.5 } else { t - 0.5 })
            .collect())
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn compression_ratio(&self) -> f32 {
        32.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compression_ratio_is_always_32() {
        let bq = BinaryQuantizer::new(8);
        assert_eq!(bq.compression_ratio(), 32.0);
    }

    #[test]
    fn encode_is_one_bit_per_dimension() {
        let mut bq = BinaryQuantizer::new(8);
        bq.train(&[vec![0.0; 8], vec![10.0; 8]]).unwrap();
        let code = bq.encode(&[10.0; 8]).unwrap();
        assert_eq!(code.len(), 1);
    }

    #[test]
    fn above_threshold_encodes_to_one() {
        let mut bq = BinaryQuantizer::new(1);
        bq.train(&[vec![0.0], vec![10.0]]).unwrap();
        let code = bq.encode(&[10.0]).unwrap();
        let bits = unpack_bits(&code, 1);
        assert!(bits[0]);
    }
}
