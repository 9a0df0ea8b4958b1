//! Job service: the only place job phases change.
//!
//! ```text
//! submit ──► pending_analysis ──(model analysis)──► ready_for_execution
//!    │                                                  │
//!    └──► failed (intent analysis)        (report) ──► retry_ready
//!                                                       │
//!                 ready_for_execution / retry_ready ──(complete)──► completed
//! ```
//!
//! LLM calls never run under the store lock. Phase 2 and Phase 3 first
//! reserve the job (a `refining` flag, or the move to `retry_ready`), run the
//! pipeline, then commit. A duplicate request sees the reservation and is
//! rejected.

use std::sync::Arc;

use intelicad_common::execution::partition;
use intelicad_common::wire::{AwaitingAnalysisView, PollResponse, ReadyForExecutionView};
use intelicad_common::{
    ArtifactRef, DispatchStage, ExecutionResult, Job, JobError, JobPhase, ModelAnalysis, Operation,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::{ArtifactKind, ArtifactStore};
use crate::pipeline::Pipeline;
use crate::safety::SafetyFilter;
use crate::store::JobStore;

/// An uploaded CAD file.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct JobService {
    store: Arc<dyn JobStore>,
    pipeline: Pipeline,
    filter: SafetyFilter,
    artifacts: ArtifactStore,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: Pipeline,
        filter: SafetyFilter,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            store,
            pipeline,
            filter,
            artifacts,
        }
    }

    pub fn job_count(&self) -> usize {
        self.store.len()
    }

    /// Run `f` against the stored job under the store's lock.
    fn mutate<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Job) -> Result<R, JobError>,
    ) -> Result<R, JobError> {
        let mut f = Some(f);
        let mut out = None;
        self.store.update(id, &mut |job| {
            let f = f
                .take()
                .ok_or_else(|| JobError::Storage("job mutation applied twice".to_string()))?;
            out = Some(f(job)?);
            Ok(())
        })?;
        out.ok_or_else(|| JobError::Storage("job mutation produced no result".to_string()))
    }

    // ========================================================================
    // Submit
    // ========================================================================

    /// Create a job: Phase 1, then Phase 2 without model data.
    ///
    /// An intent-analysis failure still creates the job, directly in
    /// `failed`, so the caller gets an id and the error.
    pub async fn submit(&self, command: &str, upload: Option<Upload>) -> Result<Job, JobError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(JobError::BadRequest("text_command is empty".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let mut job = Job::new(&id, command);
        info!("[{}] New job: {}", job.short_id(), command);

        if let Some(upload) = upload {
            let artifact = self
                .artifacts
                .save(&id, ArtifactKind::Input, upload.file_name.as_deref(), &upload.bytes)
                .await?;
            job.input_artifact = Some(artifact);
        }

        match self.pipeline.analyze_intent(command).await {
            Ok(intent) => {
                let plan = self
                    .pipeline
                    .generate_operations(command, Some(&intent), None)
                    .await;
                job.diagnostics.extend(plan.diagnostics);
                job.preliminary_operations = Some(plan.operations);
                job.intent = Some(intent);
                job.touch();
            }
            Err(e) => {
                warn!("[{}] Intent analysis failed: {}", job.short_id(), e);
                job.diagnostics.push(e.to_string());
                job.error = Some(e.to_string());
                job.transition(JobPhase::Failed);
            }
        }

        self.store.insert(job.clone())?;
        Ok(job)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub fn claim(&self, id: &str, stage: DispatchStage) -> Result<(), JobError> {
        self.mutate(id, |job| {
            let (expected, dispatched) = match stage {
                DispatchStage::Analysis => (JobPhase::PendingAnalysis, &mut job.analysis_dispatched),
                DispatchStage::Execution => {
                    (JobPhase::ReadyForExecution, &mut job.execution_dispatched)
                }
            };
            if job.phase != expected {
                return Err(JobError::invalid_phase(id, &expected.to_string(), job.phase));
            }
            if *dispatched {
                return Err(JobError::AlreadyDispatched {
                    job_id: id.to_string(),
                    stage,
                });
            }
            *dispatched = true;
            job.touch();
            Ok(())
        })?;
        info!("[{}] Claimed for {}", short(id), stage);
        Ok(())
    }

    /// What an executor may work on right now.
    pub fn poll_ready(&self) -> PollResponse {
        let mut poll = PollResponse::default();
        for job in self.store.list() {
            match job.phase {
                JobPhase::PendingAnalysis if !job.analysis_dispatched && !job.refining => {
                    poll.awaiting_analysis.insert(
                        job.id,
                        AwaitingAnalysisView {
                            text_command: job.command,
                            intent: job.intent,
                            preliminary_operations: job.preliminary_operations.unwrap_or_default(),
                        },
                    );
                }
                JobPhase::ReadyForExecution if !job.execution_dispatched => {
                    poll.ready_for_execution.insert(
                        job.id,
                        ReadyForExecutionView {
                            text_command: job.command,
                            final_operations: job.final_operations.unwrap_or_default(),
                        },
                    );
                }
                _ => {}
            }
        }
        poll
    }

    // ========================================================================
    // Phase 2 with model data
    // ========================================================================

    /// Accept the executor's measurements and produce the final plan.
    pub async fn submit_model_analysis(
        &self,
        id: &str,
        analysis: ModelAnalysis,
    ) -> Result<Vec<Operation>, JobError> {
        let (command, intent) = self.mutate(id, |job| {
            if job.refining || job.model_analysis.is_some() {
                return Err(JobError::AnalysisAlreadySubmitted(id.to_string()));
            }
            if job.phase != JobPhase::PendingAnalysis {
                return Err(JobError::invalid_phase(id, "pending_analysis", job.phase));
            }
            job.refining = true;
            Ok((job.command.clone(), job.intent.clone()))
        })?;
        let reservation = Reservation::new(self.store.clone(), id);

        info!("[{}] Model analysis received, refining plan", short(id));
        let plan = self
            .pipeline
            .generate_operations(&command, intent.as_ref(), Some(&analysis))
            .await;
        let filtered = self
            .filter
            .apply(plan.operations, intent.as_ref(), Some(&analysis));
        if !filtered.audit.is_empty() {
            info!(
                "[{}] Safety filter touched {} operations",
                short(id),
                filtered.audit.len()
            );
        }

        let operations = filtered.operations;
        let committed = operations.clone();
        self.mutate(id, move |job| {
            job.refining = false;
            job.model_analysis = Some(analysis);
            job.final_operations = Some(committed);
            job.filter_audit.extend(filtered.audit);
            job.diagnostics.extend(plan.diagnostics);
            job.transition(JobPhase::ReadyForExecution);
            Ok(())
        })?;
        reservation.release();
        Ok(operations)
    }

    // ========================================================================
    // Phase 3
    // ========================================================================

    /// Record execution results and plan replacements for the failures.
    ///
    /// Only one report is accepted per job.
    pub async fn report_execution(
        &self,
        id: &str,
        results: Vec<ExecutionResult>,
    ) -> Result<Vec<Operation>, JobError> {
        let (command, intent, analysis) = self.mutate(id, |job| {
            if job.phase != JobPhase::ReadyForExecution {
                return Err(JobError::invalid_phase(id, "ready_for_execution", job.phase));
            }
            job.execution_results = results.clone();
            job.transition(JobPhase::RetryReady);
            Ok((job.command.clone(), job.intent.clone(), job.model_analysis.clone()))
        })?;

        let (succeeded, failed) = partition(&results);
        info!(
            "[{}] Execution report: {} succeeded, {} failed",
            short(id),
            succeeded.len(),
            failed.len()
        );
        if failed.is_empty() {
            return Ok(Vec::new());
        }

        let plan = self
            .pipeline
            .plan_retries(&command, intent.as_ref(), analysis.as_ref(), &failed)
            .await;
        let retries = plan.operations;
        let committed = retries.clone();
        self.mutate(id, move |job| {
            job.retry_operations = Some(committed);
            job.diagnostics.extend(plan.diagnostics);
            job.touch();
            Ok(())
        })?;
        Ok(retries)
    }

    // ========================================================================
    // Completion and reads
    // ========================================================================

    pub async fn complete(
        &self,
        id: &str,
        upload: Upload,
        summary: Option<String>,
    ) -> Result<(), JobError> {
        let job = self.status(id)?;
        ensure_completable(&job)?;

        let artifact = self
            .artifacts
            .save(id, ArtifactKind::Output, upload.file_name.as_deref(), &upload.bytes)
            .await?;

        self.mutate(id, |job| {
            ensure_completable(job)?;
            job.output_artifact = Some(artifact);
            job.execution_summary = summary;
            job.transition(JobPhase::Completed);
            Ok(())
        })?;
        info!("[{}] Completed", short(id));
        Ok(())
    }

    pub fn status(&self, id: &str) -> Result<Job, JobError> {
        self.store
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// The exported file, once the job is completed.
    pub async fn output_artifact(&self, id: &str) -> Result<(ArtifactRef, Vec<u8>), JobError> {
        let job = self.status(id)?;
        let artifact = match (job.phase, job.output_artifact) {
            (JobPhase::Completed, Some(artifact)) => artifact,
            _ => return Err(JobError::OutputNotReady(id.to_string())),
        };
        let bytes = self.artifacts.read(&artifact).await?;
        Ok((artifact, bytes))
    }
}

fn ensure_completable(job: &Job) -> Result<(), JobError> {
    match job.phase {
        JobPhase::ReadyForExecution | JobPhase::RetryReady => Ok(()),
        other => Err(JobError::invalid_phase(
            &job.id,
            "ready_for_execution or retry_ready",
            other,
        )),
    }
}

/// Holds a job's `refining` flag while Phase 2 runs. Dropping it without
/// [`Reservation::release`] (a cancelled request, a failed commit) clears
/// the flag so the job can be analysed again.
struct Reservation {
    store: Arc<dyn JobStore>,
    id: String,
    held: bool,
}

impl Reservation {
    fn new(store: Arc<dyn JobStore>, id: &str) -> Self {
        Self {
            store,
            id: id.to_string(),
            held: true,
        }
    }

    /// The commit already cleared the flag.
    fn release(mut self) {
        self.held = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        warn!("[{}] Plan refinement abandoned, releasing job", short(&self.id));
        let cleared = self.store.update(&self.id, &mut |job: &mut Job| {
            job.refining = false;
            Ok(())
        });
        if let Err(e) = cleared {
            warn!("[{}] Could not release job: {}", short(&self.id), e);
        }
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
