//! Prompt text for the planning calls.
//!
//! Each system prompt opens with a `ROLE:` line so logs (and scripted test
//! clients) can tell the calls apart.

use intelicad_common::{DesignIntent, ExecutionResult, ModelAnalysis, OperationKind};
use serde_json::json;

pub const ROLE_INTENT: &str = "ROLE: intent-analysis";
pub const ROLE_REASONING: &str = "ROLE: operation-reasoning";
pub const ROLE_GENERATION: &str = "ROLE: operation-generation";
pub const ROLE_RETRY: &str = "ROLE: retry-adjustment";

/// Header of the measurement block in generation requests.
pub const MODEL_DATA_HEADER: &str = "Measured model data";

pub fn intent_system() -> String {
    format!(
        r#"{ROLE_INTENT}
You are a mechanical design engineer. Read the user's request for a change to
a 3D-printable part and describe the design intent. Do not propose CAD
operations yet.

Respond with ONLY a JSON object of this shape:
{{
  "design_intent": {{
    "primary_goal": "short statement",
    "quantitative_targets": {{"weight_reduction_percent": 30}},
    "constraints": ["must still hold 500 g"],
    "material_assumed": "PLA",
    "use_case": "where and how the part is used"
  }},
  "part_classification": {{
    "category": "bracket | hanger | clip | mount | hook | enclosure | housing | other",
    "load_bearing": true,
    "description": "what the part is"
  }},
  "modification_strategy": {{
    "approach": "one sentence",
    "reasoning": "why this approach fits",
    "operations_to_avoid": ["strategic_holes"],
    "risk_factors": ["thin walls near the mounting holes"]
  }},
  "high_level_plan": [
    {{"step": 1, "description": "...", "expected_outcome": "..."}}
  ]
}}"#
    )
}

pub fn intent_user(command: &str) -> String {
    format!("User request: {}", command)
}

pub fn reasoning_system() -> String {
    format!(
        "{ROLE_REASONING}\n\
You are planning CAD edits for a 3D-printable part. Think through which \
edits achieve the goal without compromising the part's function. Write plain \
notes: which operations, in what order, with what magnitudes and why. No JSON."
    )
}

pub fn generation_system() -> String {
    let mut vocabulary = String::new();
    for kind in OperationKind::VOCABULARY {
        let params = kind.required_params();
        if params.is_empty() {
            vocabulary.push_str(&format!("- {} (not yet supported by the executor)\n", kind));
        } else {
            vocabulary.push_str(&format!("- {}: params {}\n", kind, params.join(", ")));
        }
    }

    format!(
        r#"{ROLE_GENERATION}
Convert the planning notes into concrete CAD operations. Use only these
operation types, with the listed params (lengths in mm, angles in degrees):
{vocabulary}
Rules:
- Give every operation a unique "id" ("op_1", "op_2", ...).
- Stay inside any safe ranges provided with the measured model data.
- Never emit operations the design intent lists as operations_to_avoid.

Respond with ONLY a JSON object:
{{"operations": [{{"id": "op_1", "type": "shell_body", "params": {{"wall_thickness": 2.0}}, "reasoning": "...", "depends_on": [], "expected_results": {{"mass_change_percent": -30}}}}]}}"#
    )
}

fn intent_block(intent: Option<&DesignIntent>) -> String {
    match intent.and_then(|i| serde_json::to_string_pretty(i).ok()) {
        Some(text) => format!("Design intent:\n{}", text),
        None => "Design intent: (none)".to_string(),
    }
}

/// Measurements plus the derived safe magnitudes.
pub fn model_data_block(analysis: &ModelAnalysis) -> String {
    let mut block = format!("{}:\n{}", MODEL_DATA_HEADER, analysis.summary());
    if let Some(limits) = analysis.safe_limits() {
        block.push_str(&format!(
            "\nSafe ranges:\n- shell wall_thickness: {} to {} mm\n- fillet radius: at most {} mm\n- hole diameter: at most {} mm",
            limits.min_wall_thickness,
            limits.max_wall_thickness,
            limits.max_fillet_radius,
            limits.max_hole_diameter
        ));
    }
    block
}

pub fn reasoning_user(
    command: &str,
    intent: Option<&DesignIntent>,
    analysis: Option<&ModelAnalysis>,
) -> String {
    let mut message = format!("User request: {}\n\n{}", command, intent_block(intent));
    if let Some(analysis) = analysis {
        message.push_str("\n\n");
        message.push_str(&model_data_block(analysis));
    }
    message
}

pub fn generation_user(
    command: &str,
    intent: Option<&DesignIntent>,
    analysis: Option<&ModelAnalysis>,
    notes: Option<&str>,
) -> String {
    let mut message = reasoning_user(command, intent, analysis);
    if analysis.is_none() {
        message.push_str("\n\nNo model measurements yet; choose conservative magnitudes.");
    }
    if let Some(notes) = notes {
        message.push_str("\n\nPlanning notes:\n");
        message.push_str(notes);
    }
    message
}

/// Known failure messages and the adjustment that usually fixes them.
pub const FAILURE_GUIDANCE: &[(&str, &str)] = &[
    (
        "shell_body: \"topology change\" or \"too much material\"",
        "INCREASE wall_thickness (try 1.5x to 2x); never decrease it",
    ),
    (
        "fillet: \"radius too large\" or \"failed to create\"",
        "DECREASE radius (try half)",
    ),
    (
        "strategic_holes / add_ventilation: \"no room\" or \"intersects\"",
        "DECREASE hole_diameter or hole_size, INCREASE spacing",
    ),
    (
        "scale: \"invalid factor\"",
        "use a factor between 0.5 and 1.0 for size reduction",
    ),
    (
        "mirror / rotate: \"no plane\" or \"invalid axis\"",
        "use axis \"x\", \"y\" or \"z\"",
    ),
];

pub fn retry_system() -> String {
    let mut guidance = String::new();
    for (pattern, fix) in FAILURE_GUIDANCE {
        guidance.push_str(&format!("- {} => {}\n", pattern, fix));
    }
    format!(
        r#"{ROLE_RETRY}
Some CAD operations failed. Propose ONE adjusted replacement per failed
operation. Keep the same "type", change the params according to the error.
Set "replaces" to the id of the failed operation. Do not repeat operations
that succeeded and do not add new kinds of operations.

Failure guidance:
{guidance}
Respond with ONLY a JSON object:
{{"operations": [{{"id": "retry_1", "replaces": "op_1", "type": "shell_body", "params": {{"wall_thickness": 3.0}}, "reasoning": "..."}}]}}"#
    )
}

pub fn retry_user(
    command: &str,
    intent: Option<&DesignIntent>,
    analysis: Option<&ModelAnalysis>,
    failed: &[&ExecutionResult],
) -> String {
    let failures: Vec<_> = failed
        .iter()
        .map(|r| {
            json!({
                "id": r.operation.id,
                "type": r.operation.kind.as_str(),
                "params": r.operation.params,
                "error": r.error_text(),
            })
        })
        .collect();
    let failures = serde_json::to_string_pretty(&failures).unwrap_or_default();
    format!(
        "{}\n\nFailed operations:\n{}",
        reasoning_user(command, intent, analysis),
        failures
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelicad_common::{BoundingBox, Operation};

    #[test]
    fn test_generation_system_lists_vocabulary() {
        let prompt = generation_system();
        assert!(prompt.starts_with(ROLE_GENERATION));
        assert!(prompt.contains("- shell_body: params wall_thickness"));
        assert!(prompt.contains("- add_ribs: params thickness, height, pattern"));
        assert!(prompt.contains("lattice_infill (not yet supported"));
    }

    #[test]
    fn test_model_data_block_carries_safe_ranges() {
        let analysis = ModelAnalysis {
            bounding_box: BoundingBox::new(50.0, 20.0, 10.0),
            ..Default::default()
        };
        let user = generation_user("lighter", None, Some(&analysis), Some("shell it"));
        assert!(user.contains(MODEL_DATA_HEADER));
        assert!(user.contains("shell wall_thickness: 1.2 to 4 mm"));
        assert!(user.ends_with("shell it"));
    }

    #[test]
    fn test_generation_without_analysis_has_no_model_data() {
        let user = generation_user("lighter", None, None, None);
        assert!(!user.contains(MODEL_DATA_HEADER));
    }

    #[test]
    fn test_retry_user_lists_failures() {
        let result = ExecutionResult::failed(
            Operation::new("op_1", OperationKind::ShellBody).with_param("wall_thickness", 2.0),
            "topology change",
        );
        let user = retry_user("lighter", None, None, &[&result]);
        assert!(user.contains("\"error\": \"topology change\""));
        assert!(retry_system().contains("INCREASE wall_thickness"));
    }
}
