//! Pluggable extraction/reranking: callers supply the LLM-backed pieces,
//! this crate supplies the storage and fusion plumbing around them.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::MemoryError;
use crate::layers;
use crate::recall::RecallItem;
use graph::GraphStore;
use types::{MemoryLayer, Properties};

/// One fact pulled out of free-form text by a [`FactExtractor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFact {
    pub fact_id: String,
    pub layer: MemoryLayer,
    pub content: String,
    pub vector: Vec<f32>,
}

/// Turns a chunk of conversation text into zero or more discrete facts.
/// Implementations typically wrap an LLM call; this crate ships no default
/// implementation since it has no model-calling dependency of its own.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, user_id: &str, messages: &[String]) -> Result<Vec<ExtractedFact>, MemoryError>;
}

/// Re-scores a fused recall against the original query, e.g. with a
/// cross-encoder. Runs after RRF fusion, before [`crate::reflect::reflect`].
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, items: Vec<RecallItem>) -> Result<Vec<RecallItem>, MemoryError>;
}

/// Holds the two optional caller-supplied hooks, swappable at runtime under
/// a reader-writer lock (same pattern as
/// [`crate::reflect::ReflectState`]'s `BankConfig`). Passing `None` to
/// either setter clears it.
#[derive(Default)]
pub struct MemoryHooks {
    extractor: RwLock<Option<Arc<dyn FactExtractor>>>,
    reranker: RwLock<Option<Arc<dyn Reranker>>>,
}

impl MemoryHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fact_extractor(&self, extractor: Option<Arc<dyn FactExtractor>>) {
        *self.extractor.write() = extractor;
    }

    pub fn set_reranker(&self, reranker: Option<Arc<dyn Reranker>>) {
        *self.reranker.write() = reranker;
    }

    pub fn fact_extractor(&self) -> Option<Arc<dyn FactExtractor>> {
        self.extractor.read().clone()
    }

    pub fn reranker(&self) -> Option<Arc<dyn Reranker>> {
        self.reranker.read().clone()
    }
}

/// Result of [`retain_from_text`]: how many extracted facts were stored,
/// how many were skipped (missing id/vector), and why.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractResult {
    pub retained: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Runs the registered [`FactExtractor`] over `messages`, then retains each
/// returned fact via [`crate::layers::store_fact`]. Never aborts on a
/// per-fact failure: invalid facts are counted in `skipped` and every
/// per-fact error message is collected, matching the batch-operation
/// failure semantics used elsewhere in the workspace.
#[tracing::instrument(skip(store, hooks, messages))]
pub async fn retain_from_text(
    store: &GraphStore,
    hooks: &MemoryHooks,
    user_id: &str,
    messages: &[String],
) -> Result<ExtractResult, MemoryError> {
    let Some(extractor) = hooks.fact_extractor() else {
        return Err(MemoryError::NoExtractorConfigured);
    };
    let facts = extractor.extract(user_id, messages).await?;

    let mut result = ExtractResult::default();
    for fact in facts {
        if fact.fact_id.trim().is_empty() || fact.vector.is_empty() {
            result.skipped += 1;
            result.errors.push(format!("fact {:?} missing id or vector", fact.fact_id));
            continue;
        }
        match layers::store_fact(store, user_id, &fact.fact_id, fact.layer, &fact.content, &fact.vector, Properties::new()) {
            Ok(_) => result.retained += 1,
            Err(e) => {
                result.skipped += 1;
                result.errors.push(e.to_string());
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Algorithm;

    struct StaticExtractor(Vec<ExtractedFact>);

    #[async_trait]
    impl FactExtractor for StaticExtractor {
        async fn extract(&self, _user_id: &str, _messages: &[String]) -> Result<Vec<ExtractedFact>, MemoryError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn errs_without_a_configured_extractor() {
        let store = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        let hooks = MemoryHooks::new();
        let err = retain_from_text(&store, &hooks, "u1", &["hi".to_string()]).await.unwrap_err();
        assert!(matches!(err, MemoryError::NoExtractorConfigured));
    }

    #[tokio::test]
    async fn retains_valid_facts_and_skips_invalid_ones() {
        let store = GraphStore::open_in_memory(2, Algorithm::CosineSimilarity).unwrap();
        let hooks = MemoryHooks::new();
        hooks.set_fact_extractor(Some(Arc::new(StaticExtractor(vec![
            ExtractedFact { fact_id: "f1".into(), layer: MemoryLayer::WorldFact, content: "likes tea".into(), vector: vec![1.0, 0.0] },
            ExtractedFact { fact_id: "".into(), layer: MemoryLayer::WorldFact, content: "bad".into(), vector: vec![] },
        ]))));

        let result = retain_from_text(&store, &hooks, "u1", &["I like tea".to_string()]).await.unwrap();
        assert_eq!(result.retained, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors.len(), 1);
    }
}
