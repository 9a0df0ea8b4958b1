//! Executor poll loop (cooperative, stoppable).
//!
//! One background task polls the backend, analyzes jobs awaiting analysis
//! and runs jobs ready for execution. Errors are logged and the loop keeps
//! going; only [`ExecutorHandle::stop`] ends it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use intelicad_common::wire::{AwaitingAnalysisView, ReadyForExecutionView};
use intelicad_common::DispatchStage;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cad::{CadError, CadSession, SimulatedSession};
use crate::client::{ClientError, JobBackend};
use crate::executor::{summarize_with_retries, OperationExecutor};

/// Exported document name, as uploaded on completion.
pub const OUTPUT_FILE_NAME: &str = "output.f3d";

/// Opens the CAD document a job works on.
pub trait SessionOpener: Send + Sync {
    fn open(&self, job_id: &str) -> Result<Box<dyn CadSession>, CadError>;
}

/// Fresh box-model document per job.
#[derive(Debug, Default, Clone)]
pub struct SimulatedOpener;

impl SessionOpener for SimulatedOpener {
    fn open(&self, _job_id: &str) -> Result<Box<dyn CadSession>, CadError> {
        Ok(Box::new(SimulatedSession::default()))
    }
}

/// What one cycle did, for logs and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub analyzed: usize,
    pub completed: usize,
    /// Claims lost to another executor.
    pub skipped: usize,
    pub failed: usize,
}

pub struct PollLoop {
    backend: Arc<dyn JobBackend>,
    opener: Box<dyn SessionOpener>,
    /// Documents opened for analysis, reused when the job is executed.
    sessions: HashMap<String, OperationExecutor>,
    work_dir: PathBuf,
    interval: Duration,
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

/// Owner side of a spawned loop.
pub struct ExecutorHandle {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ExecutorHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Signal the loop and wait up to `timeout` for it to exit. Returns
    /// false when the loop was still busy (a CAD call in flight) at the
    /// deadline; the task is left to finish on its own.
    pub async fn stop(self, timeout: Duration) -> bool {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Poll loop task ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!("Poll loop did not stop within {:?}", timeout);
                false
            }
        }
    }
}

impl PollLoop {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        opener: Box<dyn SessionOpener>,
        work_dir: PathBuf,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            opener,
            sessions: HashMap::new(),
            work_dir,
            interval,
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Start the loop on a background task.
    pub fn spawn(mut self) -> ExecutorHandle {
        let running = self.running.clone();
        let notify = self.notify.clone();
        let task = tokio::spawn(async move { self.run().await });
        ExecutorHandle {
            running,
            notify,
            task,
        }
    }

    async fn run(&mut self) {
        info!(
            "Executor polling every {}s, work dir {}",
            self.interval.as_secs(),
            self.work_dir.display()
        );
        while self.running.load(Ordering::SeqCst) {
            match self.cycle().await {
                Ok(report) if report != CycleReport::default() => info!(
                    "Cycle: {} analyzed, {} completed, {} skipped, {} failed",
                    report.analyzed, report.completed, report.skipped, report.failed
                ),
                Ok(_) => {}
                Err(e) => warn!("Poll failed: {}", e),
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.wait_interruptible(self.interval).await;
        }
        info!("Executor stopped");
    }

    fn stopping(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until stop is requested.
    async fn wait_interruptible(&self, duration: Duration) {
        let _ = tokio::time::timeout(duration, self.notify.notified()).await;
    }

    /// One poll plus all the work it returned. A stop request is honoured
    /// between jobs; unclaimed jobs stay on the backend for the next poll.
    pub async fn cycle(&mut self) -> Result<CycleReport, ClientError> {
        let poll = self.backend.poll().await?;
        let mut report = CycleReport::default();

        for (job_id, view) in &poll.awaiting_analysis {
            if self.stopping() {
                return Ok(report);
            }
            match self.handle_analysis(job_id, view).await {
                Ok(true) => report.analyzed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("[{}] analysis failed: {}", short(job_id), e);
                }
            }
        }

        for (job_id, view) in &poll.ready_for_execution {
            if self.stopping() {
                return Ok(report);
            }
            match self.handle_execution(job_id, view).await {
                Ok(true) => report.completed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("[{}] execution failed: {}", short(job_id), e);
                }
            }
        }

        Ok(report)
    }

    /// Returns Ok(false) when another executor holds the claim.
    async fn handle_analysis(
        &mut self,
        job_id: &str,
        view: &AwaitingAnalysisView,
    ) -> anyhow::Result<bool> {
        if !self.claim(job_id, DispatchStage::Analysis).await? {
            return Ok(false);
        }
        info!("[{}] analyzing: {}", short(job_id), view.text_command);

        match self.analyze_and_submit(job_id).await {
            Ok(refined) => {
                info!("[{}] {} refined operations", short(job_id), refined);
                Ok(true)
            }
            Err(e) => {
                // The backend never saw this analysis; do not keep its document.
                self.sessions.remove(job_id);
                Err(e)
            }
        }
    }

    async fn analyze_and_submit(&mut self, job_id: &str) -> anyhow::Result<usize> {
        let analysis = self.session_for(job_id)?.analyze()?;
        debug!("[{}] {}", short(job_id), analysis.summary().replace('\n', ", "));
        let refined = self.backend.submit_analysis(job_id, &analysis).await?;
        Ok(refined.len())
    }

    async fn handle_execution(
        &mut self,
        job_id: &str,
        view: &ReadyForExecutionView,
    ) -> anyhow::Result<bool> {
        if !self.claim(job_id, DispatchStage::Execution).await? {
            return Ok(false);
        }
        info!(
            "[{}] executing {} operations",
            short(job_id),
            view.final_operations.len()
        );

        let mut executor = match self.sessions.remove(job_id) {
            Some(executor) => executor,
            None => OperationExecutor::new(self.opener.open(job_id)?),
        };

        let results = executor.execute_all(&view.final_operations);
        let retries = match self.backend.report_execution(job_id, &results).await {
            Ok(retries) => retries,
            Err(e) => {
                warn!("[{}] no retries: {}", short(job_id), e);
                Vec::new()
            }
        };
        if !retries.is_empty() {
            info!("[{}] running {} retries", short(job_id), retries.len());
        }
        let retry_results = executor.execute_all(&retries);
        let summary = summarize_with_retries(&results, &retry_results);

        let output = self.work_dir.join(job_id).join(OUTPUT_FILE_NAME);
        executor.export(&output)?;
        let bytes = tokio::fs::read(&output).await?;

        self.backend
            .complete(job_id, OUTPUT_FILE_NAME, bytes, &summary)
            .await?;
        info!("[{}] complete: {}", short(job_id), summary);
        Ok(true)
    }

    /// Ok(false) on a lost race; other errors propagate.
    async fn claim(&self, job_id: &str, stage: DispatchStage) -> Result<bool, ClientError> {
        match self.backend.claim(job_id, stage).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_conflict() => {
                debug!("[{}] {} already claimed", short(job_id), stage);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn session_for(&mut self, job_id: &str) -> Result<&OperationExecutor, CadError> {
        if !self.sessions.contains_key(job_id) {
            let session = self.opener.open(job_id)?;
            self.sessions
                .insert(job_id.to_string(), OperationExecutor::new(session));
        }
        self.sessions.get(job_id).ok_or(CadError::NoBody)
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
