//! The job entity and its lifecycle phases.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::ModelAnalysis;
use crate::execution::ExecutionResult;
use crate::intent::DesignIntent;
use crate::operation::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    PendingAnalysis,
    ReadyForExecution,
    RetryReady,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::PendingAnalysis => "pending_analysis",
            JobPhase::ReadyForExecution => "ready_for_execution",
            JobPhase::RetryReady => "retry_ready",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which executor task a claim is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    Analysis,
    Execution,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStage::Analysis => f.write_str("analysis"),
            DispatchStage::Execution => f.write_str("execution"),
        }
    }
}

/// Reference to a CAD file owned by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

/// An operation the safety filter removed or adjusted, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedOperation {
    pub operation: Operation,
    pub reason: String,
    /// True when the operation was kept with clamped parameters.
    #[serde(default)]
    pub adjusted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(rename = "text_command")]
    pub command: String,
    pub phase: JobPhase,

    #[serde(rename = "design_intent", default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<DesignIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preliminary_operations: Option<Vec<Operation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_analysis: Option<ModelAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_operations: Option<Vec<Operation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_operations: Option<Vec<Operation>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_results: Vec<ExecutionResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_audit: Vec<RemovedOperation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_summary: Option<String>,

    #[serde(default)]
    pub analysis_dispatched: bool,
    #[serde(default)]
    pub execution_dispatched: bool,

    /// Set while final generation runs outside the store lock.
    #[serde(skip)]
    pub refining: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            command: command.into(),
            phase: JobPhase::PendingAnalysis,
            intent: None,
            preliminary_operations: None,
            model_analysis: None,
            final_operations: None,
            retry_operations: None,
            execution_results: Vec::new(),
            filter_audit: Vec::new(),
            diagnostics: Vec::new(),
            input_artifact: None,
            output_artifact: None,
            execution_summary: None,
            analysis_dispatched: false,
            execution_dispatched: false,
            refining: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, phase: JobPhase) {
        self.phase = phase;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Operations the executor should run: final, else nothing.
    pub fn operative_plan(&self) -> &[Operation] {
        self.final_operations.as_deref().unwrap_or(&[])
    }

    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}
