//! Tunables for recall fusion and prompt assembly, serializable the way the
//! rest of the workspace's index/store configs are.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Controls how the four TEMPR channels (semantic/keyword/graph/temporal)
/// are queried and fused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Results requested per channel before fusion.
    pub per_channel_limit: NonZeroUsize,
    /// Reciprocal Rank Fusion constant; higher flattens the influence of
    /// rank position.
    pub rrf_k: f64,
    /// Whether [`crate::layers::MemoryLayer`] priority contributes a flat
    /// bonus to the fused score (see `MemoryLayer::rrf_bonus`).
    pub layer_bonus_enabled: bool,
    /// Facts returned to the caller after fusion and optional reranking.
    pub top_k: NonZeroUsize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            per_channel_limit: NonZeroUsize::new(20).unwrap(),
            rrf_k: 60.0,
            layer_bonus_enabled: true,
            top_k: NonZeroUsize::new(10).unwrap(),
        }
    }
}

/// A persona definition [`crate::reflect::reflect`] assembles into a
/// system prompt and a set of disposition hints, swappable at runtime via
/// [`crate::reflect::ReflectState::set_bank_config`]/`bank_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankConfig {
    /// One-paragraph statement of who the agent is, folded under an
    /// `## Identity` heading. Left empty to omit the section entirely.
    pub mission: String,
    /// Numbered, non-negotiable constraints folded under a `## Rules (must
    /// never be violated)` heading. Left empty to omit the section.
    pub rules: Vec<String>,
    /// Named personality traits on a roughly 0–5 intensity scale (e.g.
    /// `"curiosity" -> 3.2`). Traits below level 1 are not surfaced as
    /// hints; see [`crate::reflect::disposition_hints`].
    pub disposition: BTreeMap<String, f64>,
    /// Upper bound on facts folded into the memory block, applied after
    /// layer-priority ordering.
    pub max_facts: NonZeroUsize,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            mission: "You are a helpful, attentive assistant that remembers context about the people you talk to.".to_string(),
            rules: vec![
                "Never fabricate a memory you were not given.".to_string(),
                "Never reveal another user's facts.".to_string(),
            ],
            disposition: BTreeMap::new(),
            max_facts: NonZeroUsize::new(30).unwrap(),
        }
    }
}
