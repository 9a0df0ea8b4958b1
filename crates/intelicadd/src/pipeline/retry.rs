//! Phase 3: retry/adjustment of failed operations.
//!
//! The model is asked for one replacement per failed operation. Whatever it
//! returns is then checked structurally: a replacement must target a failed
//! operation, keep its type, actually change its params, and move known
//! parameters in the direction that fixes the failure.

use std::collections::HashSet;

use intelicad_common::operation::{operations_from_plan, DEFAULT_WALL_THICKNESS_MM};
use intelicad_common::{
    CompletionRequest, DesignIntent, ExecutionResult, ModelAnalysis, Operation, OperationKind,
    ParseOutcome,
};
use tracing::{info, warn};

use super::{Pipeline, PlanOutcome};
use crate::prompts;

impl Pipeline {
    pub async fn plan_retries(
        &self,
        command: &str,
        intent: Option<&DesignIntent>,
        analysis: Option<&ModelAnalysis>,
        failed: &[&ExecutionResult],
    ) -> PlanOutcome {
        let mut outcome = PlanOutcome::default();
        if failed.is_empty() {
            return outcome;
        }

        let request = CompletionRequest::new(
            prompts::retry_system(),
            prompts::retry_user(command, intent, analysis, failed),
        )
        .with_max_tokens(self.config.retry_max_tokens);

        let proposed = match self.gateway.complete(&request).await {
            ParseOutcome::Parsed(plan) => operations_from_plan(&plan),
            ParseOutcome::Degraded(diagnostic) => {
                warn!("Retry planning degraded: {}", diagnostic);
                outcome.diagnostics.push(format!("retry planning: {}", diagnostic));
                return outcome;
            }
        };

        let targets: Vec<&Operation> = failed.iter().map(|r| &r.operation).collect();
        let (accepted, discarded) = enforce_retry_structure(&targets, proposed);
        info!(
            "Retry planning: {} accepted, {} discarded for {} failures",
            accepted.len(),
            discarded.len(),
            failed.len()
        );
        outcome.operations = accepted;
        outcome.diagnostics.extend(discarded);
        outcome
    }
}

/// Keep only replacements that are structurally valid for `failed`.
///
/// Returns the accepted operations (each with `replaces` set) and one
/// message per discarded proposal.
pub fn enforce_retry_structure(
    failed: &[&Operation],
    proposed: Vec<Operation>,
) -> (Vec<Operation>, Vec<String>) {
    let mut replaced: HashSet<&str> = HashSet::new();
    let mut accepted: Vec<Operation> = Vec::new();
    let mut discarded = Vec::new();

    for mut op in proposed {
        let Some(target) = find_target(failed, &replaced, &op) else {
            discarded.push(format!("retry {} ({}) has no failed operation to replace", op.id, op.kind));
            continue;
        };
        if op.kind != target.kind {
            discarded.push(format!(
                "retry {} changes type {} -> {}",
                op.id, target.kind, op.kind
            ));
            continue;
        }
        if op.params == target.params {
            discarded.push(format!("retry {} repeats the params of {}", op.id, target.id));
            continue;
        }
        if let Some(violation) = direction_violation(target, &op) {
            discarded.push(format!("retry {}: {}", op.id, violation));
            continue;
        }

        replaced.insert(target.id.as_str());
        op.replaces = Some(target.id.clone());
        accepted.push(op);
    }
    (accepted, discarded)
}

fn find_target<'a>(
    failed: &[&'a Operation],
    replaced: &HashSet<&str>,
    op: &Operation,
) -> Option<&'a Operation> {
    let open = |t: &&&'a Operation| !replaced.contains(t.id.as_str());
    if let Some(id) = op.replaces.as_deref() {
        if let Some(t) = failed.iter().filter(open).find(|t| t.id == id) {
            return Some(*t);
        }
    }
    // Ids may be generated, so an id match only counts for the same type.
    if let Some(t) = failed
        .iter()
        .filter(open)
        .find(|t| t.id == op.id && t.kind == op.kind)
    {
        return Some(*t);
    }
    failed.iter().filter(open).find(|t| t.kind == op.kind).copied()
}

/// Known one-way adjustments: a failed shell is fixed by a thicker wall.
fn direction_violation(target: &Operation, retry: &Operation) -> Option<String> {
    if target.kind != OperationKind::ShellBody {
        return None;
    }
    let old = target
        .param_f64("wall_thickness")
        .unwrap_or(DEFAULT_WALL_THICKNESS_MM);
    match retry.param_f64("wall_thickness") {
        None => Some("shell_body retry without wall_thickness".to_string()),
        Some(new) if new <= old => Some(format!(
            "shell_body wall_thickness must increase ({} -> {})",
            old, new
        )),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::prompts::ROLE_RETRY;
    use intelicad_common::{FakeLlmClient, LlmGateway};
    use std::sync::Arc;

    fn shell(id: &str, wall: f64) -> Operation {
        Operation::new(id, OperationKind::ShellBody).with_param("wall_thickness", wall)
    }

    fn fillet(id: &str, radius: f64) -> Operation {
        Operation::new(id, OperationKind::Fillet).with_param("radius", radius)
    }

    #[test]
    fn test_type_mismatch_discarded() {
        let target = shell("op_1", 2.0);
        let (ok, dropped) = enforce_retry_structure(&[&target], vec![fillet("op_1", 0.5)]);
        assert!(ok.is_empty());
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn test_shell_must_thicken() {
        let target = shell("op_1", 2.0);
        let (ok, _) = enforce_retry_structure(&[&target], vec![shell("r1", 1.5)]);
        assert!(ok.is_empty());

        let (ok, _) = enforce_retry_structure(&[&target], vec![shell("r1", 3.0)]);
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].replaces.as_deref(), Some("op_1"));
    }

    #[test]
    fn test_unchanged_params_discarded() {
        let target = fillet("op_2", 1.0);
        let (ok, dropped) = enforce_retry_structure(&[&target], vec![fillet("op_2", 1.0)]);
        assert!(ok.is_empty());
        assert!(dropped[0].contains("repeats"));
    }

    #[test]
    fn test_one_replacement_per_failure() {
        let a = fillet("op_1", 2.0);
        let b = fillet("op_3", 2.0);
        let proposed = vec![fillet("x", 1.0), fillet("y", 0.8), fillet("z", 0.5)];
        let (ok, dropped) = enforce_retry_structure(&[&a, &b], proposed);
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[0].replaces.as_deref(), Some("op_1"));
        assert_eq!(ok[1].replaces.as_deref(), Some("op_3"));
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn test_id_of_other_type_falls_back_to_same_type_target() {
        let a = shell("op_1", 2.0);
        let b = fillet("op_2", 2.0);
        let (ok, dropped) = enforce_retry_structure(&[&a, &b], vec![fillet("op_1", 0.5)]);
        assert!(dropped.is_empty(), "{:?}", dropped);
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].replaces.as_deref(), Some("op_2"));
    }

    #[test]
    fn test_shell_without_thickness_compares_against_default() {
        let target = Operation::new("op_1", OperationKind::ShellBody);
        let (ok, dropped) = enforce_retry_structure(&[&target], vec![shell("r1", 1.5)]);
        assert!(ok.is_empty());
        assert!(dropped[0].contains("must increase"));

        let (ok, _) = enforce_retry_structure(&[&target], vec![shell("r1", 2.5)]);
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_replaces_takes_priority_over_id() {
        let a = fillet("op_1", 2.0);
        let b = fillet("op_2", 2.0);
        let mut retry = fillet("op_1", 1.0);
        retry.replaces = Some("op_2".to_string());
        let (ok, _) = enforce_retry_structure(&[&a, &b], vec![retry]);
        assert_eq!(ok[0].replaces.as_deref(), Some("op_2"));
    }

    #[tokio::test]
    async fn test_plan_retries_filters_model_output() {
        let reply = r#"{"operations": [
            {"id": "retry_1", "replaces": "op_1", "type": "shell_body", "params": {"wall_thickness": 1.0}},
            {"id": "retry_2", "replaces": "op_1", "type": "fillet", "params": {"radius": 0.5}},
            {"id": "retry_3", "replaces": "op_1", "type": "shell_body", "params": {"wall_thickness": 3.5}}
        ]}"#;
        let client = FakeLlmClient::always("{}").with_route(ROLE_RETRY, reply);
        let pipeline = Pipeline::new(LlmGateway::new(Arc::new(client)), PipelineConfig::default());

        let failed = ExecutionResult::failed(shell("op_1", 2.0), "topology change");
        let out = pipeline.plan_retries("lighter", None, None, &[&failed]).await;
        assert_eq!(out.operations.len(), 1);
        assert_eq!(out.operations[0].kind, OperationKind::ShellBody);
        assert_eq!(out.operations[0].param_f64("wall_thickness"), Some(3.5));
        assert_eq!(out.diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn test_no_failures_no_call() {
        let client = Arc::new(FakeLlmClient::always("{}"));
        let pipeline = Pipeline::new(LlmGateway::new(client.clone()), PipelineConfig::default());
        let out = pipeline.plan_retries("lighter", None, None, &[]).await;
        assert!(out.operations.is_empty());
        assert_eq!(client.call_count(), 0);
    }
}
