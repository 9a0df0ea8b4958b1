//! Request and response bodies shared by the daemon and the executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::execution::ExecutionResult;
use crate::intent::DesignIntent;
use crate::job::{DispatchStage, JobPhase};
use crate::operation::Operation;

/// Form field names of the multipart endpoints.
pub const FIELD_FILE: &str = "file";
pub const FIELD_TEXT_COMMAND: &str = "text_command";
pub const FIELD_SUMMARY: &str = "summary";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub jobs: usize,
    #[serde(default)]
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub phase: JobPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_intent: Option<DesignIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preliminary_operations: Option<Vec<Operation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub status: String,
    pub refined_operations: Vec<Operation>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub stage: DispatchStage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub status: String,
    pub stage: DispatchStage,
}

/// What the executor needs to analyze a job. Nothing else is exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwaitingAnalysisView {
    pub text_command: String,
    #[serde(default)]
    pub intent: Option<DesignIntent>,
    #[serde(default)]
    pub preliminary_operations: Vec<Operation>,
}

/// What the executor needs to run a job's final plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyForExecutionView {
    pub text_command: String,
    #[serde(default)]
    pub final_operations: Vec<Operation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub awaiting_analysis: BTreeMap<String, AwaitingAnalysisView>,
    #[serde(default)]
    pub ready_for_execution: BTreeMap<String, ReadyForExecutionView>,
}

impl PollResponse {
    pub fn is_empty(&self) -> bool {
        self.awaiting_analysis.is_empty() && self.ready_for_execution.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub execution_results: Vec<ExecutionResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryResponse {
    pub retry_operations: Vec<Operation>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
