//! HTTP client for intelicadd.

use std::time::Duration;

use async_trait::async_trait;
use intelicad_common::wire::{
    AnalysisResponse, ClaimRequest, CompleteResponse, ErrorBody, ExecutionReport, HealthResponse,
    PollResponse, RetryResponse, SubmitJobResponse, FIELD_FILE, FIELD_SUMMARY, FIELD_TEXT_COMMAND,
};
use intelicad_common::{DispatchStage, ExecutionResult, Job, ModelAnalysis, Operation};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cannot reach backend: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Another executor got there first, or the job moved on.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if *status == StatusCode::CONFLICT)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// The calls the poll loop makes. Separate from [`BackendClient`] so the
/// loop can run against a scripted backend.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn poll(&self) -> Result<PollResponse, ClientError>;

    async fn claim(&self, job_id: &str, stage: DispatchStage) -> Result<(), ClientError>;

    /// Returns the refined plan.
    async fn submit_analysis(
        &self,
        job_id: &str,
        analysis: &ModelAnalysis,
    ) -> Result<Vec<Operation>, ClientError>;

    /// Returns the retry plan.
    async fn report_execution(
        &self,
        job_id: &str,
        results: &[ExecutionResult],
    ) -> Result<Vec<Operation>, ClientError>;

    async fn complete(
        &self,
        job_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        summary: &str,
    ) -> Result<(), ClientError>;
}

pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let response = self.http.get(self.url("/health")).send().await?;
        decode(response).await
    }

    pub async fn submit_job(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        command: &str,
    ) -> Result<SubmitJobResponse, ClientError> {
        let form = Form::new()
            .text(FIELD_TEXT_COMMAND, command.to_string())
            .part(FIELD_FILE, Part::bytes(bytes).file_name(file_name.to_string()));
        let response = self
            .http
            .post(self.url("/submit-job/"))
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn status(&self, job_id: &str) -> Result<Job, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/job-status/{}", job_id)))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn download(&self, job_id: &str) -> Result<Vec<u8>, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/download/{}", job_id)))
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl JobBackend for BackendClient {
    async fn poll(&self) -> Result<PollResponse, ClientError> {
        let response = self.http.get(self.url("/poll-jobs/")).send().await?;
        decode(response).await
    }

    async fn claim(&self, job_id: &str, stage: DispatchStage) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{}/claim", job_id)))
            .json(&ClaimRequest { stage })
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn submit_analysis(
        &self,
        job_id: &str,
        analysis: &ModelAnalysis,
    ) -> Result<Vec<Operation>, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{}/analysis", job_id)))
            .json(analysis)
            .send()
            .await?;
        let body: AnalysisResponse = decode(response).await?;
        Ok(body.refined_operations)
    }

    async fn report_execution(
        &self,
        job_id: &str,
        results: &[ExecutionResult],
    ) -> Result<Vec<Operation>, ClientError> {
        let report = ExecutionReport {
            execution_results: results.to_vec(),
        };
        let response = self
            .http
            .post(self.url(&format!("/retry-failed/{}", job_id)))
            .json(&report)
            .send()
            .await?;
        let body: RetryResponse = decode(response).await?;
        Ok(body.retry_operations)
    }

    async fn complete(
        &self,
        job_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        summary: &str,
    ) -> Result<(), ClientError> {
        let form = Form::new()
            .part(FIELD_FILE, Part::bytes(bytes).file_name(file_name.to_string()))
            .text(FIELD_SUMMARY, summary.to_string());
        let response = self
            .http
            .post(self.url(&format!("/complete-job/{}", job_id)))
            .multipart(form)
            .send()
            .await?;
        let _: CompleteResponse = decode(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into [`ClientError::Api`], reading the
/// `{"error": ...}` body when there is one.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Api { status, message })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = check(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        let err = ClientError::Api {
            status: StatusCode::CONFLICT,
            message: "already claimed".into(),
        };
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "backend returned 409 Conflict: already claimed");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = BackendClient::new("http://127.0.0.1:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/health"), "http://127.0.0.1:8000/health");
    }
}
