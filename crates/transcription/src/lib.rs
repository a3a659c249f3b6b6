pub mod aggregate;
pub mod asr;
pub mod callback;
pub mod config;
pub mod error;
pub mod model;
pub mod model_cache;
pub mod orchestrator;
pub mod speakers;
pub mod stage;
pub mod storage;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use asr::{Aligner, Diarizer, ModelProvider, RecognitionRequest, Recognizer};
pub use callback::{CallbackDispatcher, CallbackPayload, DeliveryOutcome, RetryPolicy};
pub use config::TranscriptionConfig;
pub use error::{ErrorCode, PipelineError, PipelineResult};
pub use model::{
    ComputeType, Job, JobFailure, JobOptions, JobOutcome, JobReport, JobStatus, ModelSize,
    Segment, SpeakerSummary, TranscriptResult, WordSegment,
};
pub use model_cache::{ModelCache, ModelHandle, ModelKey};
pub use orchestrator::{
    AsyncJob, JobAck, JobOrchestrator, PipelineContext, SubmitError, TranscriptionRequest,
};
pub use stage::{StageOutcome, StageRunner};
pub use storage::{ArtifactGateway, LocalObjectStore, MemoryObjectStore, ObjectStore};
