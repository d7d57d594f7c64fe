//! Layered agent memory: four memory layers stored as graph nodes
//! ([`layers`]), four-channel TEMPR recall fused by Reciprocal Rank Fusion
//! ([`recall`]), LLM-prompt assembly on top of a recall ([`reflect`]), and
//! the pluggable extraction/reranking hooks around both ([`hooks`]).
//!
//! Every public function here takes a `&graph::GraphStore` explicitly
//! rather than owning one: callers compose a `GraphStore` and this crate's
//! services as two separately owned pieces, per the workspace's design
//! notes on avoiding an owning `MemoryManager` wrapper.

pub mod config;
pub mod error;
pub mod hooks;
pub mod layers;
pub mod recall;
pub mod reflect;

pub use config::{BankConfig, RecallConfig};
pub use error::MemoryError;
pub use hooks::{ExtractResult, ExtractedFact, FactExtractor, MemoryHooks, Reranker};
pub use layers::MemoryFact;
pub use recall::{MemoryContext, RecallItem, RecallPayload};
pub use reflect::{ReflectState, Reflection};
