//! Vector codec: little-endian length-prefixed `f32` blobs, plus the
//! content-addressed [`StoreKeyId`] used by ANN indices for O(1) dedup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TypeError;

/// Encodes a vector as `i32` little-endian length followed by `len` `f32`
/// little-endian values.
pub fn encode(v: &[f32]) -> Result<Vec<u8>, TypeError> {
    if v.is_empty() {
        return Err(TypeError::EmptyVector);
    }
    let mut buf = Vec::with_capacity(4 + 4 * v.len());
    let len: i32 = v
        .len()
        .try_into()
        .map_err(|_| TypeError::MalformedVector {
            reason: "vector too long to encode".into(),
        })?;
    buf.extend_from_slice(&len.to_le_bytes());
    for &x in v {
        buf.extend_from_slice(&x.to_le_bytes());
    }
    Ok(buf)
}

/// Decodes a length-prefixed vector blob, validating the length header and
/// rejecting truncated buffers.
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, TypeError> {
    if bytes.len() < 4 {
        return Err(TypeError::MalformedVector {
            reason: "buffer shorter than the length header".into(),
        });
    }
    let (len_bytes, rest) = bytes.split_at(4);
    let len = i32::from_le_bytes(len_bytes.try_into().unwrap());
    if len < 0 {
        return Err(TypeError::MalformedVector {
            reason: "negative length header".into(),
        });
    }
    let len = len as usize;
    if rest.len() != len * 4 {
        return Err(TypeError::MalformedVector {
            reason: format!(
                "length header declares {len} components but buffer holds {}",
                rest.len() / 4
            ),
        });
    }
    let mut out = Vec::with_capacity(len);
    for chunk in rest.chunks_exact(4) {
        out.push(f32::from_le_bytes(chunk.try_into().unwrap()));
    }
    validate_vector(&out)?;
    Ok(out)
}

/// Rejects `NaN`/`±Inf` components and empty vectors.
pub fn validate_vector(v: &[f32]) -> Result<(), TypeError> {
    if v.is_empty() {
        return Err(TypeError::EmptyVector);
    }
    for (index, x) in v.iter().enumerate() {
        if !x.is_finite() {
            return Err(TypeError::NonFiniteComponent { index });
        }
    }
    Ok(())
}

/// Checks a vector's length against the store's configured dimension.
pub fn validate_dimension(v: &[f32], expected: usize) -> Result<(), TypeError> {
    if v.len() != expected {
        return Err(TypeError::DimensionMismatch {
            expected,
            actual: v.len(),
        });
    }
    Ok(())
}

/// Serializes metadata/properties to stable JSON text.
pub fn encode_metadata<T: Serialize>(m: &T) -> Result<String, TypeError> {
    serde_json::to_string(m).map_err(|e| TypeError::MalformedMetadata {
        reason: e.to_string(),
    })
}

/// Parses metadata/properties JSON text, rejecting malformed input.
pub fn decode_metadata<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TypeError> {
    serde_json::from_str(s).map_err(|e| TypeError::MalformedMetadata {
        reason: e.to_string(),
    })
}

/// Content-addressed identity of a vector: a blake3 hash of its encoded
/// little-endian bytes. Used internally by ANN indices as an O(1) dedup/
/// lookup key; this is not a node id, which remains caller-supplied.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StoreKeyId([u8; 32]);

impl StoreKeyId {
    pub fn from_vector(v: &[f32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for x in v {
            hasher.update(&x.to_le_bytes());
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for StoreKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", blake3::Hash::from(self.0).to_hex())
    }
}
