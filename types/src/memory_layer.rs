use serde::{Deserialize, Serialize};

/// The four memory layers, ordered by authority:
/// `MentalModel > Observation > WorldFact > Experience`.
///
/// `Ord` follows this priority (lower discriminant = higher priority), so
/// `MemoryLayer::MentalModel < MemoryLayer::Experience` sorts mental models
/// first when layers are compared directly.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemoryLayer {
    MentalModel = 0,
    Observation = 1,
    WorldFact = 2,
    Experience = 3,
}

impl MemoryLayer {
    /// The `node_type` string this layer maps to 1:1.
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryLayer::MentalModel => "mental_model",
            MemoryLayer::Observation => "observation",
            MemoryLayer::WorldFact => "world_fact",
            MemoryLayer::Experience => "experience",
        }
    }

    /// Parses a `node_type` string back into a layer, if it names one.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mental_model" => Some(MemoryLayer::MentalModel),
            "observation" => Some(MemoryLayer::Observation),
            "world_fact" => Some(MemoryLayer::WorldFact),
            "experience" => Some(MemoryLayer::Experience),
            _ => None,
        }
    }

    /// The small rank bonus applied after RRF fusion: MentalModel +0.04,
    /// Observation +0.03, WorldFact +0.02, Experience 0.
    pub fn rrf_bonus(self) -> f64 {
        match self {
            MemoryLayer::MentalModel => 0.04,
            MemoryLayer::Observation => 0.03,
            MemoryLayer::WorldFact => 0.02,
            MemoryLayer::Experience => 0.0,
        }
    }

    /// Deterministic memory node id: `"{layer_str}_{user_id}_{fact_id}"`.
    /// Same inputs always produce the same id, giving upsert semantics.
    pub fn node_id(self, user_id: &str, fact_id: &str) -> String {
        format!("{}_{}_{}", self.as_str(), user_id, fact_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn priority_order_matches_spec() {
        assert!(MemoryLayer::MentalModel < MemoryLayer::Observation);
        assert!(MemoryLayer::Observation < MemoryLayer::WorldFact);
        assert!(MemoryLayer::WorldFact < MemoryLayer::Experience);
    }

    #[test]
    fn node_id_is_a_total_function() {
        let id1 = MemoryLayer::WorldFact.node_id("u1", "f1");
        let id2 = MemoryLayer::WorldFact.node_id("u1", "f1");
        assert_eq!(id1, id2);
        assert_eq!(id1, "world_fact_u1_f1");
    }

    #[test]
    fn round_trips_through_node_type_string() {
        for layer in [
            MemoryLayer::MentalModel,
            MemoryLayer::Observation,
            MemoryLayer::WorldFact,
            MemoryLayer::Experience,
        ] {
            assert_eq!(MemoryLayer::from_str(layer.as_str()), Some(layer));
        }
    }
}
