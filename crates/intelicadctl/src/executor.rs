//! Operation executor
//!
//! Maps each [`Operation`] onto [`CadSession`] primitives. One operation
//! failing never stops the rest of the plan; every operation produces
//! exactly one [`ExecutionResult`].

use intelicad_common::operation::DEFAULT_WALL_THICKNESS_MM;
use intelicad_common::{ExecutionResult, ModelAnalysis, Operation, OperationKind};
use std::path::Path;
use tracing::{debug, warn};

use crate::cad::{Axis, CadError, CadSession};

pub struct OperationExecutor {
    session: Box<dyn CadSession>,
}

impl OperationExecutor {
    pub fn new(session: Box<dyn CadSession>) -> Self {
        Self { session }
    }

    pub fn analyze(&self) -> Result<ModelAnalysis, CadError> {
        self.session.analyze()
    }

    pub fn export(&self, path: &Path) -> Result<(), CadError> {
        self.session.export(path)
    }

    /// Run one operation against the live document.
    pub fn execute(&mut self, op: &Operation) -> ExecutionResult {
        if op.kind.is_placeholder() {
            debug!("  {} ({}) skipped", op.id, op.kind);
            return ExecutionResult::succeeded(
                op.clone(),
                format!("{} skipped: not yet implemented", op.kind),
            );
        }

        match self.apply(op) {
            Ok(message) => {
                debug!("  {} ({}) ok: {}", op.id, op.kind, message);
                ExecutionResult::succeeded(op.clone(), message)
            }
            Err(e) => {
                warn!("  {} ({}) failed: {}", op.id, op.kind, e);
                ExecutionResult::failed(op.clone(), e.to_string())
            }
        }
    }

    /// Run a plan in list order.
    pub fn execute_all(&mut self, ops: &[Operation]) -> Vec<ExecutionResult> {
        ops.iter().map(|op| self.execute(op)).collect()
    }

    fn apply(&mut self, op: &Operation) -> Result<String, CadError> {
        let num = |name: &str, default: f64| op.param_f64(name).unwrap_or(default);
        let text = |name: &str, default: &'static str| -> String {
            op.param_str(name).unwrap_or(default).to_string()
        };

        match &op.kind {
            OperationKind::ShellBody => {
                let t = num("wall_thickness", DEFAULT_WALL_THICKNESS_MM);
                self.session.shell(t)?;
                Ok(format!("Shelled body with {} mm walls", t))
            }
            OperationKind::Fillet | OperationKind::FilletAllEdges => {
                let r = num("radius", 1.0);
                let all = op.kind == OperationKind::FilletAllEdges
                    || text("edge_selection", "all") == "all";
                self.session.fillet(r, all)?;
                Ok(format!("Filleted edges with {} mm radius", r))
            }
            OperationKind::Mirror => {
                let axis = Axis::parse(&text("axis", "X"))?;
                self.session.mirror(axis)?;
                Ok(format!("Mirrored across {} axis", axis))
            }
            OperationKind::Rotate => {
                let angle = num("angle", 90.0);
                let axis = Axis::parse(&text("axis", "Z"))?;
                self.session.rotate(angle, axis)?;
                Ok(format!("Rotated {} degrees around {}", angle, axis))
            }
            OperationKind::Move => {
                let (x, y, z) = (num("x", 0.0), num("y", 0.0), num("z", 0.0));
                self.session.translate(x, y, z)?;
                Ok(format!("Moved by ({}, {}, {}) mm", x, y, z))
            }
            OperationKind::Scale => {
                let (x, y, z) = if op.param_bool("uniform").unwrap_or(true) {
                    let f = num("factor", 1.0);
                    (f, f, f)
                } else {
                    (num("x_factor", 1.0), num("y_factor", 1.0), num("z_factor", 1.0))
                };
                self.session.scale(x, y, z)?;
                Ok(format!("Scaled by ({}, {}, {})", x, y, z))
            }
            OperationKind::AddRibs => {
                let pattern = text("pattern", "cross_bracing");
                let (t, h) = (num("thickness", 1.5), num("height", 10.0));
                self.session.add_ribs(t, h, &pattern)?;
                Ok(format!("Added {} ribs ({} mm thick, {} mm high)", pattern, t, h))
            }
            OperationKind::StrategicHoles => {
                let (d, s) = (num("hole_diameter", 5.0), num("spacing", 15.0));
                let count = self.session.cut_hole_grid(d, s)?;
                Ok(format!("Cut {} holes of {} mm", count, d))
            }
            OperationKind::AddVentilation => {
                let (d, s) = (num("hole_size", 5.0), num("spacing", 20.0));
                let count = self.session.cut_hole_grid(d, s)?;
                Ok(format!("Cut {} ventilation holes of {} mm", count, d))
            }
            other => Err(CadError::Unsupported(other.as_str().to_string())),
        }
    }
}

/// "N/M operations succeeded"
pub fn summarize(results: &[ExecutionResult]) -> String {
    summarize_with_retries(results, &[])
}

/// Like [`summarize`], counting a successful retry toward the plan it
/// repaired. M stays the size of the original plan.
pub fn summarize_with_retries(results: &[ExecutionResult], retries: &[ExecutionResult]) -> String {
    let ok = results
        .iter()
        .chain(retries)
        .filter(|r| r.success)
        .count()
        .min(results.len());
    format!("{}/{} operations succeeded", ok, results.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cad::SimulatedSession;

    fn executor() -> OperationExecutor {
        OperationExecutor::new(Box::new(SimulatedSession::default()))
    }

    #[test]
    fn test_shell_with_default_thickness() {
        let mut ex = executor();
        let r = ex.execute(&Operation::new("op_1", OperationKind::ShellBody));
        assert!(r.success, "{:?}", r.error);
        assert!(!ex.analyze().unwrap().can_shell);
    }

    #[test]
    fn test_failure_does_not_stop_plan() {
        let mut ex = executor();
        let plan = vec![
            Operation::new("op_1", OperationKind::ShellBody).with_param("wall_thickness", 0.5),
            Operation::new("op_2", OperationKind::Fillet).with_param("radius", 1.0),
        ];
        let results = ex.execute_all(&plan);
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error_text().contains("topology change"));
        assert!(results[1].success);
        assert_eq!(summarize(&results), "1/2 operations succeeded");
    }

    #[test]
    fn test_placeholder_kinds_succeed_as_skipped() {
        let mut ex = executor();
        let r = ex.execute(&Operation::new("op_1", OperationKind::LatticeInfill));
        assert!(r.success);
        assert!(r.message.unwrap().contains("not yet implemented"));
    }

    #[test]
    fn test_unknown_kind_fails() {
        let mut ex = executor();
        let r = ex.execute(&Operation::new("op_1", OperationKind::parse("knurl")));
        assert!(!r.success);
        assert_eq!(r.error_text(), "Operation 'knurl' not yet implemented");
    }

    #[test]
    fn test_non_uniform_scale() {
        let mut ex = executor();
        let op = Operation::new("op_1", OperationKind::Scale)
            .with_param("uniform", false)
            .with_param("x_factor", 2.0);
        assert!(ex.execute(&op).success);
        assert_eq!(ex.analyze().unwrap().bounding_box.x, 200.0);
    }

    #[test]
    fn test_bad_axis_fails() {
        let mut ex = executor();
        let op = Operation::new("op_1", OperationKind::Mirror).with_param("axis", "Q");
        assert!(!ex.execute(&op).success);
    }

    #[test]
    fn test_hole_grid_reports_count() {
        let mut ex = executor();
        let op = Operation::new("op_1", OperationKind::StrategicHoles);
        let r = ex.execute(&op);
        assert_eq!(r.message.as_deref(), Some("Cut 10 holes of 5 mm"));
    }
}
