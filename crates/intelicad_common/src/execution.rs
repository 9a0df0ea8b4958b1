//! Outcome of attempting one operation against the CAD document.

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub operation: Operation,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(operation: Operation, error: impl Into<String>) -> Self {
        Self {
            operation,
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }

    /// Error text for a failed result, with a fallback for reports that omit it.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

/// Split results into (succeeded, failed), preserving order.
pub fn partition(results: &[ExecutionResult]) -> (Vec<&ExecutionResult>, Vec<&ExecutionResult>) {
    results.iter().partition(|r| r.success)
}
