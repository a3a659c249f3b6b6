use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::JobStatus;

/// Failures raised while driving a transcription job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Recognition failed: {0}")]
    Recognition(String),
    #[error("Callback delivery failed: {0}")]
    Delivery(String),
    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Stable machine-readable code carried by failure records and callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    StorageError,
    ModelUnavailable,
    RecognitionError,
    DeliveryFailure,
    InvalidTransition,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::ModelUnavailable => "MODEL_UNAVAILABLE",
            ErrorCode::RecognitionError => "RECOGNITION_ERROR",
            ErrorCode::DeliveryFailure => "DELIVERY_FAILURE",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Storage(_) => ErrorCode::StorageError,
            PipelineError::ModelUnavailable(_) => ErrorCode::ModelUnavailable,
            PipelineError::Recognition(_) => ErrorCode::RecognitionError,
            PipelineError::Delivery(_) => ErrorCode::DeliveryFailure,
            PipelineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
