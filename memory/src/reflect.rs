//! Turns a [`crate::recall::MemoryContext`] into the three pieces an LLM
//! call site actually wants: a system prompt, short disposition hints, and
//! a `<MEMORY>`-wrapped block of recalled facts grouped by layer.

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use types::MemoryLayer;

use crate::config::BankConfig;
use crate::error::MemoryError;
use crate::hooks::Reranker;
use crate::recall::{self, MemoryContext, RecallItem};
use crate::RecallConfig;
use graph::GraphStore;

const LAYER_SECTIONS: [(MemoryLayer, &str); 4] = [
    (MemoryLayer::MentalModel, "Mental Models"),
    (MemoryLayer::Observation, "Observations"),
    (MemoryLayer::WorldFact, "Facts"),
    (MemoryLayer::Experience, "Experiences"),
];

/// Holds the active [`BankConfig`], swappable at runtime under a
/// reader-writer lock so a long-lived agent process can update its persona
/// without restarting.
#[derive(Default)]
pub struct ReflectState {
    bank_config: RwLock<BankConfig>,
}

impl ReflectState {
    pub fn new(config: BankConfig) -> Self {
        Self {
            bank_config: RwLock::new(config),
        }
    }

    pub fn set_bank_config(&self, config: BankConfig) {
        *self.bank_config.write() = config;
    }

    pub fn bank_config(&self) -> BankConfig {
        self.bank_config.read().clone()
    }
}

/// The assembled, LLM-ready output of [`reflect`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub system_prompt: String,
    pub disposition_hints: Option<String>,
    pub memory_block: String,
    pub context: MemoryContext,
}

fn intensity_label(level: f64) -> &'static str {
    if level >= 4.5 {
        "very strong"
    } else if level >= 3.5 {
        "strong"
    } else if level >= 2.5 {
        "moderate"
    } else {
        "mild"
    }
}

/// Renders active disposition traits (level >= 1) as `"Disposition: trait
/// (label); trait (label)"`, alphabetically by trait name for determinism.
/// `None` when no trait reaches the threshold.
fn disposition_hints(config: &BankConfig) -> Option<String> {
    let parts: Vec<String> = config
        .disposition
        .iter()
        .filter(|(_, level)| **level >= 1.0)
        .map(|(trait_name, level)| format!("{trait_name} ({})", intensity_label(*level)))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(format!("Disposition: {}", parts.join("; ")))
    }
}

fn system_prompt(config: &BankConfig) -> String {
    let mut sections = Vec::new();
    if !config.mission.trim().is_empty() {
        sections.push(format!("## Identity\n{}", config.mission));
    }
    if !config.rules.is_empty() {
        let numbered: Vec<String> = config.rules.iter().enumerate().map(|(i, rule)| format!("{}. {rule}", i + 1)).collect();
        sections.push(format!("## Rules (must never be violated)\n{}", numbered.join("\n")));
    }
    sections.join("\n\n")
}

fn memory_block(context: &MemoryContext, max_facts: usize) -> String {
    let mut sections = Vec::new();

    if !context.recent_history.is_empty() {
        let lines: Vec<String> = context.recent_history.iter().map(|m| format!("{}: {}", m.role, m.content)).collect();
        sections.push(format!("### Recent Conversation\n{}", lines.join("\n")));
    }

    let mut budget = max_facts;
    for (layer, heading) in LAYER_SECTIONS {
        if budget == 0 {
            break;
        }
        let facts: Vec<&RecallItem> = context
            .related_facts
            .iter()
            .filter(|item| item.layer() == Some(layer))
            .take(budget)
            .collect();
        if facts.is_empty() {
            continue;
        }
        budget -= facts.len();
        let lines: Vec<String> = facts.iter().map(|item| format!("- {}", item.content())).collect();
        sections.push(format!("### {heading}\n{}", lines.join("\n")));
    }

    format!("<MEMORY>\n{}\n</MEMORY>", sections.join("\n\n"))
}

/// Runs [`crate::recall::recall_reranked`] and assembles its three LLM-ready
/// outputs against the currently active [`BankConfig`].
#[tracing::instrument(skip(store, state, recall_config, reranker, query_vec, query_text))]
pub async fn reflect(
    store: &GraphStore,
    state: &ReflectState,
    recall_config: &RecallConfig,
    reranker: Option<&dyn Reranker>,
    user_id: &str,
    session_id: Option<&str>,
    query_vec: &[f32],
    query_text: &str,
    cancellation: Option<&CancellationToken>,
) -> Result<Reflection, MemoryError> {
    let context = recall::recall_reranked(store, recall_config, reranker, user_id, session_id, query_vec, query_text, cancellation).await?;
    let config = state.bank_config();

    Ok(Reflection {
        system_prompt: system_prompt(&config),
        disposition_hints: disposition_hints(&config),
        memory_block: memory_block(&context, config.max_facts.get()),
        context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn system_prompt_skips_empty_sections() {
        let config = BankConfig {
            mission: String::new(),
            rules: vec![],
            disposition: BTreeMap::new(),
            max_facts: std::num::NonZeroUsize::new(10).unwrap(),
        };
        assert_eq!(system_prompt(&config), "");
    }

    #[test]
    fn system_prompt_numbers_rules() {
        let mut config = BankConfig::default();
        config.mission = "Be helpful.".to_string();
        config.rules = vec!["Never lie.".to_string(), "Never repeat secrets.".to_string()];
        let prompt = system_prompt(&config);
        assert!(prompt.contains("## Identity\nBe helpful."));
        assert!(prompt.contains("1. Never lie."));
        assert!(prompt.contains("2. Never repeat secrets."));
    }

    #[test]
    fn disposition_hints_filters_by_level_and_sorts_alphabetically() {
        let mut config = BankConfig::default();
        config.disposition.insert("curiosity".to_string(), 4.0);
        config.disposition.insert("patience".to_string(), 0.5);
        config.disposition.insert("assertiveness".to_string(), 5.0);
        let hints = disposition_hints(&config).unwrap();
        assert_eq!(hints, "Disposition: assertiveness (very strong); curiosity (strong)");
    }

    #[test]
    fn disposition_hints_none_when_nothing_qualifies() {
        let config = BankConfig::default();
        assert_eq!(disposition_hints(&config), None);
    }

    #[test]
    fn memory_block_wraps_sections_in_memory_tag() {
        let context = MemoryContext::default();
        let block = memory_block(&context, 10);
        assert!(block.starts_with("<MEMORY>"));
        assert!(block.ends_with("</MEMORY>"));
    }
}
