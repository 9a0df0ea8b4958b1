//! Phase 2: operation generation.
//!
//! Two calls: free reasoning first, then a strict JSON-only call that
//! carries the reasoning notes. Called once without model data at submit
//! time and once with it after the executor reports measurements.

use intelicad_common::operation::operations_from_plan;
use intelicad_common::{CompletionRequest, DesignIntent, ModelAnalysis, ParseOutcome};
use tracing::{info, warn};

use super::{Pipeline, PlanOutcome};
use crate::prompts;

impl Pipeline {
    pub async fn generate_operations(
        &self,
        command: &str,
        intent: Option<&DesignIntent>,
        analysis: Option<&ModelAnalysis>,
    ) -> PlanOutcome {
        let mut outcome = PlanOutcome::default();

        let reasoning = CompletionRequest::new(
            prompts::reasoning_system(),
            prompts::reasoning_user(command, intent, analysis),
        )
        .with_max_tokens(self.config.reasoning_max_tokens);
        let notes = self.gateway.complete_text(&reasoning).await;
        if notes.is_none() {
            outcome
                .diagnostics
                .push("operation reasoning returned nothing; generating without notes".to_string());
        }

        let generation = CompletionRequest::new(
            prompts::generation_system(),
            prompts::generation_user(command, intent, analysis, notes.as_deref()),
        )
        .with_max_tokens(self.config.generation_max_tokens);

        match self.gateway.complete(&generation).await {
            ParseOutcome::Parsed(plan) => {
                outcome.operations = operations_from_plan(&plan);
                info!(
                    "Generated {} operations ({} model data)",
                    outcome.operations.len(),
                    if analysis.is_some() { "with" } else { "without" }
                );
            }
            ParseOutcome::Degraded(diagnostic) => {
                warn!("Operation generation degraded: {}", diagnostic);
                outcome
                    .diagnostics
                    .push(format!("operation generation: {}", diagnostic));
            }
        }
        outcome
    }
}
