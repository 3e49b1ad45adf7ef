//! Error taxonomy for remote calls and whole scans

use thiserror::Error;

/// Failure of a single call against the org's REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("scan cancelled by user")]
    Cancelled,

    #[error("Salesforce API error: {status} {body}")]
    Remote { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure that escapes a collector or the whole scan.
///
/// Collector failures are absorbed where they happen, so out of the
/// orchestrator this only carries user cancellation or the org-info failure
/// that leaves nothing to aggregate. The scan service adds its own two.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Scan cancelled by user")]
    Cancelled,

    #[error("Failed to retrieve organization information: {0}")]
    NonRecoverable(String),

    #[error("Failed to store scan: {0}")]
    Storage(String),

    #[error("Scan task failed: {0}")]
    Task(String),
}

pub type ScanResult<T> = Result<T, ScanError>;
