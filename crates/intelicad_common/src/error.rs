//! Error types for the job lifecycle.

use thiserror::Error;

use crate::job::{DispatchStage, JobPhase};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} is {actual}, expected {expected}")]
    InvalidPhase {
        job_id: String,
        expected: String,
        actual: JobPhase,
    },

    #[error("Model analysis already submitted for job {0}")]
    AnalysisAlreadySubmitted(String),

    #[error("Job {job_id} already dispatched for {stage}")]
    AlreadyDispatched { job_id: String, stage: DispatchStage },

    #[error("Output for job {0} is not available until the job completes")]
    OutputNotReady(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl JobError {
    /// HTTP status code used by the daemon for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            JobError::NotFound(_) => 404,
            JobError::InvalidPhase { .. } => 409,
            JobError::AnalysisAlreadySubmitted(_) => 409,
            JobError::AlreadyDispatched { .. } => 409,
            JobError::OutputNotReady(_) => 409,
            JobError::BadRequest(_) => 400,
            JobError::Storage(_) => 500,
        }
    }

    pub fn invalid_phase(job_id: &str, expected: &str, actual: JobPhase) -> Self {
        JobError::InvalidPhase {
            job_id: job_id.to_string(),
            expected: expected.to_string(),
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(JobError::NotFound("x".into()).status_code(), 404);
        assert_eq!(JobError::AnalysisAlreadySubmitted("x".into()).status_code(), 409);
        assert_eq!(JobError::BadRequest("no file".into()).status_code(), 400);
        assert_eq!(JobError::Storage("disk".into()).status_code(), 500);
    }

    #[test]
    fn test_invalid_phase_message() {
        let err = JobError::invalid_phase("abc", "ready_for_execution", JobPhase::Completed);
        assert_eq!(
            err.to_string(),
            "Job abc is completed, expected ready_for_execution"
        );
    }
}
