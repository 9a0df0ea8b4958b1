//! Shared types and utilities for InteliCAD components.
//!
//! The daemon (`intelicadd`) and the executor (`intelicadctl`) agree on the
//! job model and wire format defined here. The LLM client, the tolerant
//! JSON extractor and the gateway built on top of them also live here so
//! both sides can drive them from tests.

pub mod analysis;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod intent;
pub mod job;
pub mod llm_client;
pub mod llm_parse;
pub mod operation;
pub mod wire;

pub use analysis::{BoundingBox, ModelAnalysis};
pub use error::JobError;
pub use execution::ExecutionResult;
pub use gateway::{CompletionRequest, LlmGateway};
pub use intent::{DesignIntent, PartClassification};
pub use job::{ArtifactRef, DispatchStage, Job, JobPhase, RemovedOperation};
pub use llm_client::{FakeLlmClient, HttpLlmClient, LlmClient, LlmConfig, LlmError};
pub use llm_parse::{extract_structured, ParseDiagnostic, ParseFailure, ParseOutcome};
pub use operation::{Operation, OperationKind};

/// Crate version shared by the daemon health endpoint and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
