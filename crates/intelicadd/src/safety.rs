//! Operation safety filter.
//!
//! Runs on the final plan before any executor can see it. Two passes:
//! context rules drop operations that are unsafe for the part's
//! classification, then parameters are clamped into the ranges derived from
//! the measured geometry. Everything dropped or changed lands in the audit.

use intelicad_common::analysis::SafeLimits;
use intelicad_common::{DesignIntent, ModelAnalysis, Operation, OperationKind, RemovedOperation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One context-aware removal rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRule {
    /// Matched against the part classification (category + description).
    pub keywords: Vec<String>,
    /// Operation type names removed when the rule matches.
    pub forbidden: Vec<String>,
    /// The rule is skipped when the use case mentions any of these.
    #[serde(default)]
    pub exempt_when: Vec<String>,
    #[serde(default)]
    pub rationale: String,
}

impl SafetyRule {
    pub fn defaults() -> Vec<SafetyRule> {
        vec![
            SafetyRule {
                keywords: strings(&["hanger", "bracket", "clip", "mount", "hook"]),
                forbidden: strings(&["strategic_holes", "add_ventilation", "fillet_all_edges"]),
                exempt_when: Vec::new(),
                rationale: "load-bearing part: holes and blanket fillets weaken stress paths"
                    .to_string(),
            },
            SafetyRule {
                keywords: strings(&["enclosure", "housing"]),
                forbidden: strings(&["add_ventilation"]),
                exempt_when: strings(&["electronic", "cooling"]),
                rationale: "enclosure without electronics has nothing to ventilate".to_string(),
            },
        ]
    }

    fn matches(&self, intent: &DesignIntent) -> bool {
        let classification = intent.part_classification.text();
        if !self
            .keywords
            .iter()
            .any(|k| classification.contains(&k.to_lowercase()))
        {
            return false;
        }
        let use_case = intent.use_case().to_lowercase();
        !self
            .exempt_when
            .iter()
            .any(|k| use_case.contains(&k.to_lowercase()))
    }

    fn forbids(&self, op: &Operation) -> bool {
        self.forbidden
            .iter()
            .any(|name| names(&OperationKind::parse(name), op))
    }
}

/// Whether a forbidden kind covers `op`. A fillet without a narrower edge
/// selection runs on every edge, so it counts as `fillet_all_edges`.
fn names(kind: &OperationKind, op: &Operation) -> bool {
    if kind == &op.kind {
        return true;
    }
    *kind == OperationKind::FilletAllEdges
        && op.kind == OperationKind::Fillet
        && op
            .param_str("edge_selection")
            .map_or(true, |sel| sel.trim().eq_ignore_ascii_case("all"))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub operations: Vec<Operation>,
    pub audit: Vec<RemovedOperation>,
}

#[derive(Debug, Clone)]
pub struct SafetyFilter {
    rules: Vec<SafetyRule>,
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::new(SafetyRule::defaults())
    }
}

impl SafetyFilter {
    pub fn new(rules: Vec<SafetyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SafetyRule] {
        &self.rules
    }

    pub fn apply(
        &self,
        operations: Vec<Operation>,
        intent: Option<&DesignIntent>,
        analysis: Option<&ModelAnalysis>,
    ) -> FilterOutcome {
        let active: Vec<&SafetyRule> = match intent {
            Some(intent) => self.rules.iter().filter(|r| r.matches(intent)).collect(),
            None => Vec::new(),
        };
        let avoid: Vec<OperationKind> = intent
            .map(|i| {
                i.modification_strategy
                    .operations_to_avoid
                    .iter()
                    .map(|name| OperationKind::parse(name))
                    .collect()
            })
            .unwrap_or_default();
        let limits = analysis.and_then(|a| a.safe_limits());

        let mut outcome = FilterOutcome::default();
        for mut op in operations {
            if let Some(rule) = active.iter().find(|r| r.forbids(&op)) {
                info!("Safety filter removed {} ({}): {}", op.id, op.kind, rule.rationale);
                outcome.audit.push(RemovedOperation {
                    operation: op,
                    reason: rule.rationale.clone(),
                    adjusted: false,
                });
                continue;
            }
            if avoid.iter().any(|kind| names(kind, &op)) {
                info!("Safety filter removed {} ({}): listed in operations_to_avoid", op.id, op.kind);
                outcome.audit.push(RemovedOperation {
                    operation: op,
                    reason: "listed in operations_to_avoid".to_string(),
                    adjusted: false,
                });
                continue;
            }
            if let Some(limits) = limits {
                let original = op.clone();
                if let Some(reason) = clamp(&mut op, &limits) {
                    debug!("Safety filter clamped {}: {}", op.id, reason);
                    outcome.audit.push(RemovedOperation {
                        operation: original,
                        reason,
                        adjusted: true,
                    });
                }
            }
            outcome.operations.push(op);
        }
        outcome
    }
}

/// Clamp the size parameter of `op` into `limits`. Returns what changed.
fn clamp(op: &mut Operation, limits: &SafeLimits) -> Option<String> {
    let (param, lo, hi) = match op.kind {
        OperationKind::ShellBody => (
            "wall_thickness",
            limits.min_wall_thickness,
            limits.max_wall_thickness,
        ),
        OperationKind::Fillet | OperationKind::FilletAllEdges => {
            ("radius", 0.0, limits.max_fillet_radius)
        }
        OperationKind::StrategicHoles => ("hole_diameter", 0.0, limits.max_hole_diameter),
        OperationKind::AddVentilation => ("hole_size", 0.0, limits.max_hole_diameter),
        _ => return None,
    };
    let value = op.param_f64(param)?;
    let clamped = value.clamp(lo, hi);
    if clamped == value && op.params.get(param).map_or(false, |v| v.is_number()) {
        return None;
    }
    op.set_param_f64(param, clamped);
    Some(format!("{} {} clamped to {} (safe range {}..={})", param, value, clamped, lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelicad_common::BoundingBox;
    use serde_json::json;

    fn intent(classification: serde_json::Value, use_case: &str) -> DesignIntent {
        DesignIntent::from_value(json!({
            "design_intent": {"primary_goal": "reduce weight", "use_case": use_case},
            "part_classification": classification,
        }))
        .unwrap()
    }

    fn analysis() -> ModelAnalysis {
        ModelAnalysis {
            bounding_box: BoundingBox::new(50.0, 20.0, 10.0),
            ..Default::default()
        }
    }

    fn plan() -> Vec<Operation> {
        vec![
            Operation::new("op_1", OperationKind::ShellBody).with_param("wall_thickness", 2.0),
            Operation::new("op_2", OperationKind::StrategicHoles).with_param("hole_diameter", 4.0),
            Operation::new("op_3", OperationKind::AddVentilation).with_param("hole_size", 3.0),
            Operation::new("op_4", OperationKind::Fillet)
                .with_param("radius", 1.0)
                .with_param("edge_selection", "outer"),
        ]
    }

    fn kinds(ops: &[Operation]) -> Vec<OperationKind> {
        ops.iter().map(|o| o.kind.clone()).collect()
    }

    #[test]
    fn test_bracket_drops_holes_and_ventilation() {
        let filter = SafetyFilter::default();
        let intent = intent(json!({"category": "bracket"}), "shelf support");
        let out = filter.apply(plan(), Some(&intent), None);
        assert_eq!(
            kinds(&out.operations),
            vec![OperationKind::ShellBody, OperationKind::Fillet]
        );
        assert_eq!(out.audit.len(), 2);
        assert!(out.audit.iter().all(|r| !r.adjusted));
    }

    #[test]
    fn test_bracket_drops_fillet_on_every_edge() {
        let filter = SafetyFilter::default();
        let intent = intent(json!({"category": "shelf bracket"}), "");
        let ops = vec![
            Operation::new("a", OperationKind::Fillet).with_param("radius", 1.0),
            Operation::new("b", OperationKind::Fillet)
                .with_param("radius", 1.0)
                .with_param("edge_selection", "ALL"),
            Operation::new("c", OperationKind::Fillet)
                .with_param("radius", 1.0)
                .with_param("edge_selection", "outer"),
        ];
        let out = filter.apply(ops, Some(&intent), None);
        let kept: Vec<&str> = out.operations.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(kept, vec!["c"]);
        assert_eq!(out.audit.len(), 2);
    }

    #[test]
    fn test_avoided_blanket_fillet_covers_plain_fillet() {
        let mut intent = intent(json!({"category": "vase"}), "decor");
        intent.modification_strategy.operations_to_avoid = vec!["fillet_all_edges".to_string()];
        let ops = vec![Operation::new("a", OperationKind::Fillet).with_param("radius", 1.0)];
        let out = SafetyFilter::default().apply(ops, Some(&intent), None);
        assert!(out.operations.is_empty());
    }

    #[test]
    fn test_enclosure_exempt_when_electronics() {
        let filter = SafetyFilter::default();
        let cooled = intent(json!({"category": "enclosure"}), "electronics housing for a Pi");
        let out = filter.apply(plan(), Some(&cooled), None);
        assert!(kinds(&out.operations).contains(&OperationKind::AddVentilation));

        let plain = intent(json!({"category": "enclosure"}), "storage box");
        let out = filter.apply(plan(), Some(&plain), None);
        assert!(!kinds(&out.operations).contains(&OperationKind::AddVentilation));
        assert!(kinds(&out.operations).contains(&OperationKind::StrategicHoles));
    }

    #[test]
    fn test_operations_to_avoid_removed() {
        let mut intent = intent(json!({"category": "vase"}), "decor");
        intent.modification_strategy.operations_to_avoid = vec!["fillet_edges".to_string()];
        let out = SafetyFilter::default().apply(plan(), Some(&intent), None);
        assert!(!kinds(&out.operations).contains(&OperationKind::Fillet));
        assert_eq!(out.audit[0].reason, "listed in operations_to_avoid");
    }

    #[test]
    fn test_clamps_into_safe_range() {
        let ops = vec![
            Operation::new("a", OperationKind::ShellBody).with_param("wall_thickness", 0.5),
            Operation::new("b", OperationKind::FilletAllEdges).with_param("radius", 9.0),
            Operation::new("c", OperationKind::StrategicHoles).with_param("hole_diameter", "12mm"),
        ];
        let out = SafetyFilter::default().apply(ops, None, Some(&analysis()));
        assert_eq!(out.operations[0].param_f64("wall_thickness"), Some(1.2));
        assert_eq!(out.operations[1].param_f64("radius"), Some(2.5));
        assert_eq!(out.operations[2].param_f64("hole_diameter"), Some(5.0));
        assert_eq!(out.audit.len(), 3);
        assert!(out.audit.iter().all(|r| r.adjusted));
        assert_eq!(out.audit[0].operation.param_f64("wall_thickness"), Some(0.5));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let filter = SafetyFilter::default();
        let intent = intent(json!({"category": "wall hook"}), "");
        let ops = vec![
            Operation::new("a", OperationKind::ShellBody).with_param("wall_thickness", 9.0),
            Operation::new("b", OperationKind::AddVentilation),
            Operation::new("c", OperationKind::Fillet).with_param("radius", 1.0),
        ];
        let first = filter.apply(ops, Some(&intent), Some(&analysis()));
        let second = filter.apply(first.operations.clone(), Some(&intent), Some(&analysis()));
        assert_eq!(second.operations, first.operations);
        assert!(second.audit.is_empty());
    }

    #[test]
    fn test_custom_rule() {
        let mut rules = SafetyRule::defaults();
        rules.push(SafetyRule {
            keywords: vec!["lens".to_string()],
            forbidden: vec!["scale".to_string()],
            exempt_when: Vec::new(),
            rationale: "optics".to_string(),
        });
        let filter = SafetyFilter::new(rules);
        let intent = intent(json!({"category": "lens holder"}), "");
        let ops = vec![Operation::new("a", OperationKind::Scale).with_param("factor", 0.8)];
        let out = filter.apply(ops, Some(&intent), None);
        assert!(out.operations.is_empty());
        assert_eq!(out.audit[0].reason, "optics");
    }
}
