//! Operator commands.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use intelicad_common::wire::PollResponse;
use intelicad_common::Job;
use tracing::info;

use crate::client::BackendClient;
use crate::config::ExecutorConfig;
use crate::poll_loop::{PollLoop, SimulatedOpener};

const RULE: &str = "================================================================================";

fn client(config: &ExecutorConfig) -> Result<BackendClient> {
    BackendClient::new(&config.backend_url, config.request_timeout())
        .context("Failed to build HTTP client")
}

/// Run the poll loop with the simulated session until ctrl-c.
pub async fn run(config: ExecutorConfig) -> Result<()> {
    let client = client(&config)?;
    match client.health().await {
        Ok(health) => info!(
            "Backend {} v{} ({} jobs)",
            config.backend_url, health.version, health.jobs
        ),
        Err(e) => tracing::warn!("Backend not reachable yet: {}", e),
    }

    let handle = PollLoop::new(
        Arc::new(client),
        Box::new(SimulatedOpener),
        config.work_dir.clone(),
        config.poll_interval(),
    )
    .spawn();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Stopping executor");
    if !handle.stop(config.join_timeout()).await {
        anyhow::bail!("executor did not stop within {}s", config.join_timeout_secs);
    }
    Ok(())
}

pub async fn submit(config: &ExecutorConfig, file: &Path, command: &str) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model.f3d".to_string());

    let response = client(config)?.submit_job(&file_name, bytes, command).await?;
    println!("Job {} ({})", response.job_id, response.phase);
    if let Some(error) = response.error {
        println!("  Error: {}", error);
    }
    if let Some(intent) = response.design_intent {
        println!("  Goal: {}", intent.design_intent.primary_goal);
    }
    for op in response.preliminary_operations.unwrap_or_default() {
        println!("  - {} {}", op.kind, serde_json::Value::Object(op.params));
    }
    Ok(())
}

pub async fn status(config: &ExecutorConfig, job_id: &str) -> Result<()> {
    let job = client(config)?.status(job_id).await?;
    print!("{}", job_report(&job));
    Ok(())
}

pub async fn download(config: &ExecutorConfig, job_id: &str, out: Option<PathBuf>) -> Result<()> {
    let bytes = client(config)?.download(job_id).await?;
    let out = out.unwrap_or_else(|| PathBuf::from(format!("{}_modified.f3d", job_id)));
    tokio::fs::write(&out, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Saved {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

pub async fn poll(config: &ExecutorConfig) -> Result<()> {
    use crate::client::JobBackend;
    let response = client(config)?.poll().await?;
    print!("{}", poll_report(&response));
    Ok(())
}

/// Human-readable job inspection.
pub fn job_report(job: &Job) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Job {}", job.id);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Command: {}", job.command);
    let _ = writeln!(out, "Phase:   {}", job.phase);
    if let Some(error) = &job.error {
        let _ = writeln!(out, "Error:   {}", error);
    }

    if let Some(intent) = &job.intent {
        let _ = writeln!(out, "\nDesign intent");
        let _ = writeln!(out, "  Goal:     {}", intent.design_intent.primary_goal);
        let _ = writeln!(out, "  Part:     {}", intent.part_classification.category);
        let _ = writeln!(out, "  Strategy: {}", intent.modification_strategy.approach);
        if !intent.modification_strategy.operations_to_avoid.is_empty() {
            let _ = writeln!(
                out,
                "  Avoid:    {}",
                intent.modification_strategy.operations_to_avoid.join(", ")
            );
        }
    }

    if let Some(analysis) = &job.model_analysis {
        let _ = writeln!(out, "\nModel analysis");
        for line in analysis.summary().lines() {
            let _ = writeln!(out, "  {}", line);
        }
    }

    let sections = [
        ("Preliminary operations", job.preliminary_operations.as_deref()),
        ("Final operations", job.final_operations.as_deref()),
        ("Retry operations", job.retry_operations.as_deref()),
    ];
    for (title, ops) in sections {
        let Some(ops) = ops else { continue };
        let _ = writeln!(out, "\n{} ({})", title, ops.len());
        for (i, op) in ops.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} {}",
                i + 1,
                op.kind,
                serde_json::Value::Object(op.params.clone())
            );
        }
    }

    if !job.filter_audit.is_empty() {
        let _ = writeln!(out, "\nSafety filter");
        for entry in &job.filter_audit {
            let verb = if entry.adjusted { "adjusted" } else { "removed" };
            let _ = writeln!(out, "  {} {}: {}", verb, entry.operation.kind, entry.reason);
        }
    }

    if !job.execution_results.is_empty() {
        let _ = writeln!(out, "\nExecution");
        for r in &job.execution_results {
            let mark = if r.success { "ok" } else { "FAILED" };
            let detail = if r.success {
                r.message.as_deref().unwrap_or("")
            } else {
                r.error_text()
            };
            let _ = writeln!(out, "  [{}] {} {}", mark, r.operation.kind, detail);
        }
    }

    if let Some(summary) = &job.execution_summary {
        let _ = writeln!(out, "\nSummary: {}", summary);
    }
    if !job.diagnostics.is_empty() {
        let _ = writeln!(out, "\nDiagnostics");
        for d in &job.diagnostics {
            let _ = writeln!(out, "  {}", d);
        }
    }
    out
}

pub fn poll_report(poll: &PollResponse) -> String {
    if poll.is_empty() {
        return "No jobs waiting\n".to_string();
    }
    let mut out = String::new();
    for (id, view) in &poll.awaiting_analysis {
        let _ = writeln!(out, "{}  awaiting analysis   {}", id, view.text_command);
    }
    for (id, view) in &poll.ready_for_execution {
        let _ = writeln!(
            out,
            "{}  ready ({} ops)   {}",
            id,
            view.final_operations.len(),
            view.text_command
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelicad_common::wire::AwaitingAnalysisView;
    use intelicad_common::{ExecutionResult, JobPhase, Operation, OperationKind};

    #[test]
    fn test_job_report_sections() {
        let mut job = Job::new("abc", "make it lighter");
        job.phase = JobPhase::RetryReady;
        let op = Operation::new("op_1", OperationKind::ShellBody).with_param("wall_thickness", 2.0);
        job.final_operations = Some(vec![op.clone()]);
        job.execution_results = vec![ExecutionResult::failed(op, "topology change")];

        let report = job_report(&job);
        assert!(report.contains("Phase:   retry_ready"));
        assert!(report.contains("Final operations (1)"));
        assert!(report.contains("[FAILED] shell_body topology change"));
        assert!(!report.contains("Preliminary operations"));
    }

    #[test]
    fn test_poll_report() {
        assert_eq!(poll_report(&PollResponse::default()), "No jobs waiting\n");

        let mut poll = PollResponse::default();
        poll.awaiting_analysis.insert(
            "j1".into(),
            AwaitingAnalysisView {
                text_command: "lighter".into(),
                intent: None,
                preliminary_operations: Vec::new(),
            },
        );
        assert!(poll_report(&poll).contains("j1  awaiting analysis   lighter"));
    }
}
