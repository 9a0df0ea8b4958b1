//! CAD operation vocabulary.
//!
//! Plans arrive from the LLM as loosely-typed JSON. Each operation's `type`
//! string is mapped onto the closed [`OperationKind`] sum type; anything
//! outside the vocabulary is preserved verbatim as [`OperationKind::Other`]
//! so it can still be reported back as "not implemented".

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    Scale,
    ShellBody,
    Fillet,
    FilletAllEdges,
    Mirror,
    Rotate,
    Move,
    AddRibs,
    Pattern,
    StrategicHoles,
    AddVentilation,
    TopologyOptimization,
    LatticeInfill,
    VariableWallThickness,
    ApplyDraftAngles,
    AddGussets,
    Extrude,
    Other(String),
}

/// Wall thickness a `shell_body` uses when the plan leaves it out.
pub const DEFAULT_WALL_THICKNESS_MM: f64 = 2.0;

impl OperationKind {
    /// Every named kind, in the order the generation prompt lists them.
    pub const VOCABULARY: &'static [OperationKind] = &[
        OperationKind::Scale,
        OperationKind::ShellBody,
        OperationKind::Fillet,
        OperationKind::FilletAllEdges,
        OperationKind::Mirror,
        OperationKind::Rotate,
        OperationKind::Move,
        OperationKind::AddRibs,
        OperationKind::Pattern,
        OperationKind::StrategicHoles,
        OperationKind::AddVentilation,
        OperationKind::TopologyOptimization,
        OperationKind::LatticeInfill,
        OperationKind::VariableWallThickness,
        OperationKind::ApplyDraftAngles,
        OperationKind::AddGussets,
        OperationKind::Extrude,
    ];

    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "scale" => OperationKind::Scale,
            "shell_body" | "shell" => OperationKind::ShellBody,
            "fillet" | "fillet_edges" => OperationKind::Fillet,
            "fillet_all_edges" => OperationKind::FilletAllEdges,
            "mirror" => OperationKind::Mirror,
            "rotate" => OperationKind::Rotate,
            "move" | "translate" => OperationKind::Move,
            "add_ribs" => OperationKind::AddRibs,
            "pattern" => OperationKind::Pattern,
            "strategic_holes" => OperationKind::StrategicHoles,
            "add_ventilation" | "ventilation" => OperationKind::AddVentilation,
            "topology_optimization" | "run_topology_optimization" => {
                OperationKind::TopologyOptimization
            }
            "lattice_infill" => OperationKind::LatticeInfill,
            "variable_wall_thickness" => OperationKind::VariableWallThickness,
            "apply_draft_angles" => OperationKind::ApplyDraftAngles,
            "add_gussets" => OperationKind::AddGussets,
            "extrude" => OperationKind::Extrude,
            _ => OperationKind::Other(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::Scale => "scale",
            OperationKind::ShellBody => "shell_body",
            OperationKind::Fillet => "fillet",
            OperationKind::FilletAllEdges => "fillet_all_edges",
            OperationKind::Mirror => "mirror",
            OperationKind::Rotate => "rotate",
            OperationKind::Move => "move",
            OperationKind::AddRibs => "add_ribs",
            OperationKind::Pattern => "pattern",
            OperationKind::StrategicHoles => "strategic_holes",
            OperationKind::AddVentilation => "add_ventilation",
            OperationKind::TopologyOptimization => "topology_optimization",
            OperationKind::LatticeInfill => "lattice_infill",
            OperationKind::VariableWallThickness => "variable_wall_thickness",
            OperationKind::ApplyDraftAngles => "apply_draft_angles",
            OperationKind::AddGussets => "add_gussets",
            OperationKind::Extrude => "extrude",
            OperationKind::Other(name) => name,
        }
    }

    /// Kinds the executor recognises but has no geometry for.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            OperationKind::Pattern
                | OperationKind::TopologyOptimization
                | OperationKind::LatticeInfill
                | OperationKind::VariableWallThickness
                | OperationKind::ApplyDraftAngles
                | OperationKind::AddGussets
                | OperationKind::Extrude
        )
    }

    /// Parameters the generation prompt requires for this kind.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            OperationKind::Scale => &["factor"],
            OperationKind::ShellBody => &["wall_thickness"],
            OperationKind::Fillet | OperationKind::FilletAllEdges => &["radius"],
            OperationKind::Mirror => &["axis"],
            OperationKind::Rotate => &["angle", "axis"],
            OperationKind::Move => &["x", "y", "z"],
            OperationKind::AddRibs => &["thickness", "height", "pattern"],
            OperationKind::StrategicHoles => &["hole_diameter", "spacing"],
            OperationKind::AddVentilation => &["hole_size", "spacing"],
            _ => &[],
        }
    }
}

impl From<String> for OperationKind {
    fn from(value: String) -> Self {
        OperationKind::parse(&value)
    }
}

impl From<OperationKind> for String {
    fn from(value: OperationKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic CAD edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: OperationKind,

    #[serde(default)]
    pub params: Map<String, Value>,

    #[serde(default)]
    pub reasoning: String,

    /// Declared ordering hints. Execution ignores them and runs in list order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_results: Option<Value>,

    /// Retry operations only: id of the failed operation being replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
}

impl Operation {
    pub fn new(id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            kind,
            params: Map::new(),
            reasoning: String::new(),
            depends_on: Vec::new(),
            expected_results: None,
            replaces: None,
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn param_f64(&self, name: &str) -> Option<f64> {
        self.params.get(name).and_then(value_as_f64)
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_str())
    }

    pub fn param_bool(&self, name: &str) -> Option<bool> {
        self.params.get(name).and_then(|v| v.as_bool())
    }

    pub fn set_param_f64(&mut self, name: &str, value: f64) {
        if let Some(number) = serde_json::Number::from_f64(value) {
            self.params.insert(name.to_string(), Value::Number(number));
        }
    }
}

/// Numbers sometimes come back quoted ("2.5") or with a unit suffix ("2.5mm").
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches("mm")
            .trim_end_matches("deg")
            .trim()
            .parse()
            .ok(),
        _ => None,
    }
}

/// Pull the `operations` array out of a parsed plan.
///
/// Malformed entries are skipped rather than failing the whole plan, and
/// missing ids are filled in as `op_<n>` so every id in the list is unique.
pub fn operations_from_plan(plan: &Value) -> Vec<Operation> {
    let Some(items) = plan.get("operations").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut operations: Vec<Operation> = Vec::with_capacity(items.len());
    let mut used: HashSet<String> = HashSet::new();
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<Operation>(item.clone()) {
            Ok(mut op) => {
                if op.id.trim().is_empty() || used.contains(&op.id) {
                    let mut n = index + 1;
                    while used.contains(&format!("op_{}", n)) {
                        n += 1;
                    }
                    op.id = format!("op_{}", n);
                }
                used.insert(op.id.clone());
                operations.push(op);
            }
            Err(e) => warn!("Skipping malformed operation #{}: {}", index + 1, e),
        }
    }
    operations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_ids_skip_ids_already_taken() {
        let ops = operations_from_plan(&json!({"operations": [
            {"id": "op_2", "type": "scale"},
            {"type": "fillet"},
            {"id": "op_2", "type": "mirror"},
        ]}));
        let ids: Vec<&str> = ops.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["op_2", "op_3", "op_4"]);
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!(OperationKind::parse("fillet_edges"), OperationKind::Fillet);
        assert_eq!(OperationKind::parse("ventilation"), OperationKind::AddVentilation);
        assert_eq!(
            OperationKind::parse("run_topology_optimization"),
            OperationKind::TopologyOptimization
        );
        assert_eq!(
            OperationKind::parse("warp_drive"),
            OperationKind::Other("warp_drive".to_string())
        );
    }

    #[test]
    fn test_operation_serializes_type_as_string() {
        let op = Operation::new("op_1", OperationKind::ShellBody).with_param("wall_thickness", 2.0);
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "shell_body");
        assert_eq!(value["params"]["wall_thickness"], 2.0);
        assert!(value.get("replaces").is_none());
    }

    #[test]
    fn test_unknown_kind_round_trips_name() {
        let op: Operation = serde_json::from_value(json!({"id": "x", "type": "knurl"})).unwrap();
        assert_eq!(op.kind, OperationKind::Other("knurl".to_string()));
        assert_eq!(serde_json::to_value(&op).unwrap()["type"], "knurl");
    }

    #[test]
    fn test_param_f64_accepts_quoted_numbers() {
        let op: Operation = serde_json::from_value(json!({
            "type": "shell_body",
            "params": {"wall_thickness": "2.5mm", "count": 3}
        }))
        .unwrap();
        assert_eq!(op.param_f64("wall_thickness"), Some(2.5));
        assert_eq!(op.param_f64("count"), Some(3.0));
        assert_eq!(op.param_f64("missing"), None);
    }

    #[test]
    fn test_operations_from_plan_assigns_ids_and_skips_garbage() {
        let plan = json!({
            "operations": [
                {"type": "shell_body", "params": {"wall_thickness": 2}},
                {"params": {}},
                {"id": "op_1", "type": "fillet"},
            ]
        });
        let ops = operations_from_plan(&plan);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].id, "op_1");
        assert_eq!(ops[1].id, "op_3");
        assert_eq!(ops[1].kind, OperationKind::Fillet);
    }

    #[test]
    fn test_operations_from_plan_without_array() {
        assert!(operations_from_plan(&json!({"plan": "none"})).is_empty());
    }
}
