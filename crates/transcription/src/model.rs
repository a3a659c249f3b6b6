use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorCode, PipelineError, PipelineResult};

/// Whisper model tiers, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub const ALL: [ModelSize; 5] = [
        ModelSize::Tiny,
        ModelSize::Base,
        ModelSize::Small,
        ModelSize::Medium,
        ModelSize::Large,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

/// Numeric precision requested for recognition inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    #[default]
    Float16,
    Float32,
    Int8,
}

impl ComputeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeType::Float16 => "float16",
            ComputeType::Float32 => "float32",
            ComputeType::Int8 => "int8",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [ComputeType::Float16, ComputeType::Float32, ComputeType::Int8]
            .into_iter()
            .find(|c| c.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options a caller attaches to a transcription request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    pub model: ModelSize,
    pub compute_type: ComputeType,
    /// ISO 639-1 code. `None` or `"auto"` = auto-detect.
    pub language: Option<String>,
    pub diarize: bool,
    pub batch_size: u32,
    pub sync: bool,
    /// Base URL; the callback is POSTed to `{callback_url}/{job_id}/callback`.
    pub callback_url: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            model: ModelSize::Base,
            compute_type: ComputeType::Float16,
            language: None,
            diarize: false,
            batch_size: 16,
            sync: false,
            callback_url: None,
        }
    }
}

impl JobOptions {
    /// The requested language, unless it asks for auto-detection.
    pub fn language_hint(&self) -> Option<&str> {
        self.language
            .as_deref()
            .filter(|lang| !lang.is_empty() && *lang != "auto")
    }
}

/// A transcription job and its lifecycle timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub audio_uri: String,
    pub options: JobOptions,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: Uuid, audio_uri: impl Into<String>, options: JobOptions) -> Self {
        Self {
            id,
            audio_uri: audio_uri.into(),
            options,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Moves the job to `next`, rejecting anything outside
    /// `pending -> processing -> {completed|failed}`.
    pub fn advance(&mut self, next: JobStatus) -> PipelineResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            JobStatus::Processing => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => self.finished_at = Some(now),
            JobStatus::Pending => {}
        }
        self.status = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A timed sub-span of a segment, produced by alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// A time-bounded span of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordSegment>,
}

impl Segment {
    /// Builds a bare recognized segment. Reversed bounds are swapped so that
    /// `start <= end` always holds.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            start,
            end,
            text: text.into(),
            confidence: None,
            speaker: None,
            words: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Raw diarization output: one speaker holding the floor over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// Per-speaker statistics derived from diarized segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSummary {
    pub id: String,
    pub total_speech_time: f64,
    pub segments_count: u32,
}

/// Output of the recognition stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
}

/// Locators of the artifacts persisted for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLocations {
    pub transcript_url: Option<String>,
    pub timestamps_url: Option<String>,
}

/// The terminal artifact of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub transcript_text: String,
    pub segments: Vec<Segment>,
    pub word_segments: Vec<WordSegment>,
    pub speakers: Vec<SpeakerSummary>,
    pub language: Option<String>,
    pub confidence: Option<f64>,
    /// Seconds.
    pub processing_time: f64,
    pub model_used: String,
    pub compute_type_used: String,
    pub transcript_url: Option<String>,
    pub timestamps_url: Option<String>,
}

impl TranscriptResult {
    /// Final form of the result once artifacts are persisted and the
    /// wall time for the whole job is known.
    pub fn finish(self, artifacts: ArtifactLocations, processing_time: f64) -> Self {
        Self {
            transcript_url: artifacts.transcript_url,
            timestamps_url: artifacts.timestamps_url,
            processing_time,
            ..self
        }
    }

    pub fn timestamps_document(&self) -> TimestampsDocument<'_> {
        TimestampsDocument {
            segments: &self.segments,
            word_segments: &self.word_segments,
            speakers: &self.speakers,
            language: self.language.as_deref(),
            model: &self.model_used,
            confidence: self.confidence,
        }
    }
}

/// The structured timings document persisted under `timestamps/`.
#[derive(Debug, Serialize)]
pub struct TimestampsDocument<'a> {
    pub segments: &'a [Segment],
    pub word_segments: &'a [WordSegment],
    pub speakers: &'a [SpeakerSummary],
    pub language: Option<&'a str>,
    pub model: &'a str,
    pub confidence: Option<f64>,
}

/// Structured failure record of a job that reached `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: ErrorCode,
    pub message: String,
    /// Seconds.
    pub processing_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(TranscriptResult),
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed(_) => JobStatus::Completed,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn processing_time(&self) -> f64 {
        match self {
            JobOutcome::Completed(result) => result.processing_time,
            JobOutcome::Failed(failure) => failure.processing_time,
        }
    }
}

/// A job in its terminal state together with how it got there.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: Job,
    pub outcome: JobOutcome,
}
