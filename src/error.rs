use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rmcp::ErrorData as McpError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Failures of the bounded fetcher. None of these are retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0}s")]
    Timeout(u64),
    #[error("remote host answered HTTP {0}")]
    Status(u16),
    #[error("response carries no content-type header")]
    MissingContentType,
    #[error("response content-type {0:?} is not an image")]
    NotAnImage(String),
    #[error("image exceeds {limit} bytes (got {actual})")]
    TooLarge { limit: usize, actual: u64 },
    #[error("request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("filesystem write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("object storage answered HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("object storage credentials: {0}")]
    Credentials(String),
    #[error("object storage request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("transform failed: {0}")]
    Transform(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("content record {0} not found")]
    NotFound(String),
    #[error("content record access failed: {0}")]
    Record(String),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message.to_string() })).into_response()
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        json_error(self.status_code(), &self.to_string())
    }
}

impl From<PipelineError> for McpError {
    fn from(err: PipelineError) -> Self {
        let detail = Some(serde_json::Value::String(err.to_string()));
        match err {
            PipelineError::Validation(message) => McpError::invalid_params(message, None),
            PipelineError::NotFound(_) => McpError::invalid_params("content record not found", detail),
            PipelineError::Fetch(_) => McpError::internal_error("fetch image failed", detail),
            PipelineError::Transform(_) => McpError::internal_error("transform image failed", detail),
            PipelineError::Generation(_) => McpError::internal_error("generate thumbnail failed", detail),
            PipelineError::Storage(_) => McpError::internal_error("store thumbnail failed", detail),
            PipelineError::Record(_) => McpError::internal_error("content record access failed", detail),
        }
    }
}
