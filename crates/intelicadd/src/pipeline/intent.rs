//! Phase 1: intent analysis.

use intelicad_common::{CompletionRequest, DesignIntent, ParseOutcome};
use tracing::info;

use super::{Pipeline, PipelineError};
use crate::prompts;

impl Pipeline {
    /// Turn the user's command into a [`DesignIntent`].
    ///
    /// A degraded reply (transport or parse) is an error: without an intent
    /// there is nothing to plan or filter against.
    pub async fn analyze_intent(&self, command: &str) -> Result<DesignIntent, PipelineError> {
        let request = CompletionRequest::new(prompts::intent_system(), prompts::intent_user(command))
            .with_max_tokens(self.config.intent_max_tokens);

        let value = match self.gateway.complete(&request).await {
            ParseOutcome::Parsed(value) => value,
            ParseOutcome::Degraded(diagnostic) => return Err(PipelineError::Degraded(diagnostic)),
        };

        let intent =
            DesignIntent::from_value(value).map_err(|e| PipelineError::Schema(e.to_string()))?;
        if intent.is_empty() {
            return Err(PipelineError::EmptyIntent);
        }

        info!(
            "Intent: {} ({}, load_bearing={})",
            intent.design_intent.primary_goal,
            intent.part_classification.category,
            intent.part_classification.load_bearing
        );
        Ok(intent)
    }
}
