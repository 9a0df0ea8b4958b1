//! LLM planning pipeline.
//!
//! - Phase 1 ([`intent`]): free-text command to structured design intent
//! - Phase 2 ([`generate`]): intent (and later model data) to operations
//! - Phase 3 ([`retry`]): failed results to same-type replacements

pub mod generate;
pub mod intent;
pub mod retry;

use intelicad_common::{LlmGateway, Operation, ParseDiagnostic};
use thiserror::Error;

use crate::config::PipelineConfig;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("intent analysis failed: {0}")]
    Degraded(ParseDiagnostic),

    #[error("intent analysis returned no usable intent")]
    EmptyIntent,

    #[error("intent analysis reply did not match the intent schema: {0}")]
    Schema(String),
}

/// Operations from one planning call plus anything worth auditing.
#[derive(Debug, Clone, Default)]
pub struct PlanOutcome {
    pub operations: Vec<Operation>,
    pub diagnostics: Vec<String>,
}

#[derive(Clone)]
pub struct Pipeline {
    gateway: LlmGateway,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(gateway: LlmGateway, config: PipelineConfig) -> Self {
        Self { gateway, config }
    }
}
