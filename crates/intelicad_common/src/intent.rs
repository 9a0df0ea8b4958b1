//! Structured design intent produced by intent analysis.
//!
//! Every field defaults so that a partially filled reply from the model still
//! yields a usable intent.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Part categories whose geometry carries load.
pub const LOAD_BEARING_KEYWORDS: &[&str] = &["hanger", "bracket", "clip", "mount", "hook"];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesignIntent {
    #[serde(default)]
    pub design_intent: IntentSummary,
    #[serde(default, deserialize_with = "classification_from_any")]
    pub part_classification: PartClassification,
    #[serde(default)]
    pub modification_strategy: ModificationStrategy,
    #[serde(default)]
    pub high_level_plan: Vec<PlanStep>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntentSummary {
    #[serde(default)]
    pub primary_goal: String,
    #[serde(default)]
    pub quantitative_targets: BTreeMap<String, Value>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub material_assumed: Option<String>,
    #[serde(default)]
    pub use_case: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartClassification {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub load_bearing: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModificationStrategy {
    #[serde(default)]
    pub approach: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub operations_to_avoid: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub step: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expected_outcome: String,
}

impl PartClassification {
    /// Lowercased text the safety rules match against.
    pub fn text(&self) -> String {
        format!("{} {}", self.category, self.description).to_lowercase()
    }

    pub fn mentions(&self, keyword: &str) -> bool {
        self.text().contains(&keyword.to_lowercase())
    }

    /// Force `load_bearing` on when the category names a load-bearing part.
    pub fn normalize(&mut self) {
        if LOAD_BEARING_KEYWORDS.iter().any(|k| self.mentions(k)) {
            self.load_bearing = true;
        }
    }
}

impl DesignIntent {
    /// Build an intent from a parsed reply, tolerating missing sections.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut intent: DesignIntent = serde_json::from_value(value)?;
        intent.part_classification.normalize();
        Ok(intent)
    }

    /// Whether the reply carried anything we can plan from.
    pub fn is_empty(&self) -> bool {
        self.design_intent.primary_goal.trim().is_empty()
            && self.high_level_plan.is_empty()
            && self.part_classification.category.trim().is_empty()
    }

    pub fn use_case(&self) -> &str {
        &self.design_intent.use_case
    }
}

/// Models sometimes answer `"part_classification": "bracket"`.
fn classification_from_any<'de, D>(deserializer: D) -> Result<PartClassification, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(category) => Ok(PartClassification {
            category,
            ..Default::default()
        }),
        Value::Null => Ok(PartClassification::default()),
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bracket_forces_load_bearing() {
        let intent = DesignIntent::from_value(json!({
            "design_intent": {"primary_goal": "reduce weight", "quantitative_targets": {"weight_reduction": 30}},
            "part_classification": {"category": "Wall Bracket", "load_bearing": false}
        }))
        .unwrap();
        assert!(intent.part_classification.load_bearing);
        assert_eq!(
            intent.design_intent.quantitative_targets["weight_reduction"],
            json!(30)
        );
    }

    #[test]
    fn test_string_classification() {
        let intent = DesignIntent::from_value(json!({"part_classification": "headphone hanger"})).unwrap();
        assert_eq!(intent.part_classification.category, "headphone hanger");
        assert!(intent.part_classification.load_bearing);
    }

    #[test]
    fn test_enclosure_is_not_load_bearing() {
        let intent = DesignIntent::from_value(json!({
            "part_classification": {"category": "enclosure", "description": "Raspberry Pi case"}
        }))
        .unwrap();
        assert!(!intent.part_classification.load_bearing);
        assert!(intent.part_classification.mentions("enclosure"));
    }

    #[test]
    fn test_empty_reply_is_empty_intent() {
        let intent = DesignIntent::from_value(json!({"operations": []})).unwrap();
        assert!(intent.is_empty());
    }
}
