use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use speechtotext_transcription::{
    ComputeType, ErrorCode, JobOptions, JobOutcome, JobReport, JobStatus, ModelSize, Segment,
    SpeakerSummary, TranscriptionRequest, WordSegment,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct TranscribeRequest {
    pub job_id: Uuid,
    #[validate(length(min = 1, message = "s3_url must not be empty"))]
    pub s3_url: String,
    pub model: Option<ModelSize>,
    pub compute_type: Option<ComputeType>,
    /// ISO 639-1 code or "auto".
    pub language: Option<String>,
    #[serde(default)]
    pub diarize: bool,
    #[validate(range(min = 1, max = 64))]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub sync: bool,
    #[validate(url)]
    pub callback_url: Option<String>,
}

impl TranscribeRequest {
    fn into_request(self, default_model: ModelSize, default_compute: ComputeType) -> TranscriptionRequest {
        let defaults = JobOptions::default();
        TranscriptionRequest {
            job_id: self.job_id,
            audio_uri: self.s3_url,
            options: JobOptions {
                model: self.model.unwrap_or(default_model),
                compute_type: self.compute_type.unwrap_or(default_compute),
                language: self.language,
                diarize: self.diarize,
                batch_size: self.batch_size.unwrap_or(defaults.batch_size),
                sync: self.sync,
                callback_url: self.callback_url,
            },
        }
    }
}

/// Full terminal outcome, returned to synchronous callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_detected: Option<String>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub word_segments: Vec<WordSegment>,
    #[serde(default)]
    pub speakers: Vec<SpeakerSummary>,
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_type_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl From<JobReport> for TranscriptionResponse {
    fn from(report: JobReport) -> Self {
        let job_id = report.job.id;
        match report.outcome {
            JobOutcome::Completed(result) => Self {
                job_id,
                status: JobStatus::Completed,
                message: "Transcription completed successfully".to_string(),
                transcript_text: Some(result.transcript_text),
                confidence: result.confidence,
                language_detected: result.language,
                segments: result.segments,
                word_segments: result.word_segments,
                speakers: result.speakers,
                processing_time: result.processing_time,
                model_used: Some(result.model_used),
                compute_type_used: Some(result.compute_type_used),
                transcript_url: result.transcript_url,
                timestamps_url: result.timestamps_url,
                error_message: None,
                error_code: None,
            },
            JobOutcome::Failed(failure) => Self {
                job_id,
                status: JobStatus::Failed,
                message: "Transcription failed".to_string(),
                transcript_text: None,
                confidence: None,
                language_detected: None,
                segments: Vec::new(),
                word_segments: Vec::new(),
                speakers: Vec::new(),
                processing_time: failure.processing_time,
                model_used: None,
                compute_type_used: None,
                transcript_url: None,
                timestamps_url: None,
                error_message: Some(failure.message),
                error_code: Some(failure.code),
            },
        }
    }
}

/// Immediate answer to asynchronous callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

pub async fn transcribe(
    State(state): State<AppState>,
    Json(body): Json<TranscribeRequest>,
) -> Result<Response, ApiError> {
    body.validate()?;

    let t = &state.settings.transcription;
    let default_model = ModelSize::parse(&t.default_model).unwrap_or_default();
    let default_compute = ComputeType::parse(&t.default_compute_type).unwrap_or_default();
    let request = body.into_request(default_model, default_compute);
    let job_id = request.job_id;

    if request.options.sync {
        info!(%job_id, "Synchronous transcription requested");
        let report = state.orchestrator.run_sync(request).await?;
        let response = TranscriptionResponse::from(report);
        return Ok((StatusCode::OK, Json(response)).into_response());
    }

    let job = state.orchestrator.submit_async(request)?;
    let ack = AckResponse {
        job_id: job.ack.job_id,
        status: job.ack.status,
        message: "Transcription started".to_string(),
    };
    Ok((StatusCode::ACCEPTED, Json(ack)).into_response())
}
