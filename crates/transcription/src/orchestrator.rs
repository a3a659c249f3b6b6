use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::asr::ModelProvider;
use crate::callback::{CallbackDispatcher, DeliveryOutcome};
use crate::config::TranscriptionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{
    ArtifactLocations, Job, JobFailure, JobOptions, JobOutcome, JobReport, JobStatus, ModelSize,
    Segment, TranscriptResult, WordSegment,
};
use crate::model_cache::ModelCache;
use crate::stage::{StageOutcome, StageRunner};
use crate::storage::{ArtifactGateway, ObjectStore, timestamps_key, transcript_key};

/// A transcription job as submitted by a caller.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub job_id: Uuid,
    pub audio_uri: String,
    pub options: JobOptions,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Job {0} is already being processed")]
    AlreadyRunning(Uuid),
    #[error("Job {0} execution aborted: {1}")]
    Aborted(Uuid, String),
}

/// Immediate answer to an asynchronous submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAck {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// A detached job: the acknowledgment plus a handle on its final report.
pub struct AsyncJob {
    pub ack: JobAck,
    pub handle: JoinHandle<JobReport>,
}

/// Everything a job execution needs, constructed once per process (or per
/// test) and shared by all jobs.
pub struct PipelineContext {
    pub models: ModelCache,
    pub stages: StageRunner,
    pub artifacts: ArtifactGateway,
    pub callbacks: CallbackDispatcher,
}

impl PipelineContext {
    pub fn new(
        config: &TranscriptionConfig,
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            models: ModelCache::new(provider, config.hf_token.clone()),
            stages: StageRunner::new(config.max_concurrent_stages),
            artifacts: ArtifactGateway::new(store, config.store_config()),
            callbacks: CallbackDispatcher::new(config.retry_policy()),
        }
    }
}

/// Job ids currently executing. At most one execution per id.
#[derive(Default)]
pub struct JobRegistry {
    running: DashSet<Uuid>,
}

impl JobRegistry {
    pub fn claim(self: &Arc<Self>, job_id: Uuid) -> Result<JobClaim, SubmitError> {
        if self.running.insert(job_id) {
            Ok(JobClaim {
                registry: Arc::clone(self),
                job_id,
            })
        } else {
            Err(SubmitError::AlreadyRunning(job_id))
        }
    }

    pub fn is_running(&self, job_id: &Uuid) -> bool {
        self.running.contains(job_id)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

/// Releases a job id from the registry when dropped.
pub struct JobClaim {
    registry: Arc<JobRegistry>,
    job_id: Uuid,
}

impl Drop for JobClaim {
    fn drop(&mut self) {
        self.registry.running.remove(&self.job_id);
    }
}

/// Drives jobs through fetch → recognize → align → diarize → aggregate →
/// persist, then hands the outcome back or to the callback dispatcher.
#[derive(Clone)]
pub struct JobOrchestrator {
    ctx: Arc<PipelineContext>,
    registry: Arc<JobRegistry>,
}

impl JobOrchestrator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            registry: Arc::new(JobRegistry::default()),
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn models(&self) -> &ModelCache {
        &self.ctx.models
    }

    /// Recognition model sizes a request may ask for.
    pub fn supported_models() -> Vec<&'static str> {
        ModelSize::ALL.iter().map(|size| size.as_str()).collect()
    }

    /// Synchronous mode: runs the job to its terminal state and returns the
    /// report to the caller. No callback is sent.
    ///
    /// The job runs on its own task, so dropping the returned future does not
    /// stop it short of a terminal state.
    pub async fn run_sync(&self, request: TranscriptionRequest) -> Result<JobReport, SubmitError> {
        let claim = self.registry.claim(request.job_id)?;
        let job_id = request.job_id;
        let job = Job::new(request.job_id, request.audio_uri, request.options);

        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            let _claim = claim;
            orchestrator.execute(job).await
        });
        handle.await.map_err(|e| {
            error!(%job_id, "Synchronous job task failed: {}", e);
            SubmitError::Aborted(job_id, e.to_string())
        })
    }

    /// Asynchronous mode: acknowledges immediately and runs the job in the
    /// background. The outcome only leaves through the callback.
    pub fn submit_async(&self, request: TranscriptionRequest) -> Result<AsyncJob, SubmitError> {
        let claim = self.registry.claim(request.job_id)?;
        let job_id = request.job_id;
        let job = Job::new(request.job_id, request.audio_uri, request.options);

        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            let _claim = claim;
            let report = orchestrator.execute(job).await;
            orchestrator.notify(&report).await;
            report
        });

        info!(%job_id, "Async transcription accepted");
        Ok(AsyncJob {
            ack: JobAck {
                job_id,
                status: JobStatus::Processing,
            },
            handle,
        })
    }

    /// Sends the terminal outcome to the job's callback endpoint, if any.
    async fn notify(&self, report: &JobReport) -> Option<DeliveryOutcome> {
        let job_id = report.job.id;
        let Some(endpoint) = report.job.options.callback_url.as_deref() else {
            warn!(%job_id, status = %report.outcome.status(), "No callback URL, async outcome not delivered");
            return None;
        };
        Some(
            self.ctx
                .callbacks
                .deliver(endpoint, job_id, &report.outcome)
                .await,
        )
    }

    /// Runs one job through the state machine. Always ends in a terminal
    /// state.
    pub async fn execute(&self, mut job: Job) -> JobReport {
        let started = Instant::now();
        let job_id = job.id;

        if let Err(e) = job.advance(JobStatus::Processing) {
            error!(%job_id, "Refusing to run job: {}", e);
            let outcome = JobOutcome::Failed(JobFailure {
                code: e.code(),
                message: e.to_string(),
                processing_time: started.elapsed().as_secs_f64(),
            });
            return JobReport { job, outcome };
        }

        info!(
            %job_id,
            audio = %job.audio_uri,
            model = job.options.model.as_str(),
            compute_type = job.options.compute_type.as_str(),
            diarize = job.options.diarize,
            "Processing transcription"
        );

        let outcome = match self.run_pipeline(&job, started).await {
            Ok(result) => {
                info!(
                    %job_id,
                    processing_time = result.processing_time,
                    segments = result.segments.len(),
                    "Transcription completed"
                );
                JobOutcome::Completed(result)
            }
            Err(e) => {
                error!(%job_id, code = %e.code(), "Transcription failed: {}", e);
                JobOutcome::Failed(JobFailure {
                    code: e.code(),
                    message: e.to_string(),
                    processing_time: started.elapsed().as_secs_f64(),
                })
            }
        };

        // processing -> terminal is always legal here
        if let Err(e) = job.advance(outcome.status()) {
            error!(%job_id, "{}", e);
        }
        JobReport { job, outcome }
    }

    async fn run_pipeline(&self, job: &Job, started: Instant) -> PipelineResult<TranscriptResult> {
        let audio = self.ctx.artifacts.fetch(&job.audio_uri).await?;
        let result = self.process_audio(job, audio.path(), started).await;
        self.ctx.artifacts.cleanup(audio);
        result
    }

    async fn process_audio(
        &self,
        job: &Job,
        audio_path: &Path,
        started: Instant,
    ) -> PipelineResult<TranscriptResult> {
        let job_id = job.id;
        let options = &job.options;

        let recognizer = self
            .ctx
            .models
            .recognizer(options.model, options.compute_type)
            .await
            .map_err(|e| PipelineError::Recognition(e.to_string()))?;

        info!(%job_id, model = options.model.as_str(), "Transcribing audio");
        let recognition = match self
            .ctx
            .stages
            .recognize(
                audio_path,
                recognizer,
                options.batch_size,
                options.language_hint().map(str::to_string),
            )
            .await
        {
            StageOutcome::Success(recognition) => recognition,
            StageOutcome::Degraded { output, reason } => {
                warn!(%job_id, %reason, "Recognition degraded");
                output
            }
            StageOutcome::Fatal(e) => return Err(e),
        };

        let language = recognition
            .language
            .filter(|lang| !lang.is_empty() && lang != "auto")
            .or_else(|| options.language_hint().map(str::to_string));
        info!(%job_id, ?language, "Detected/used language");

        let mut segments = recognition.segments;

        if let Some(lang) = language.as_deref() {
            segments = match self.align_stage(segments, audio_path, lang).await {
                StageOutcome::Success(aligned) => {
                    info!(%job_id, "Word-level alignment applied");
                    aligned
                }
                StageOutcome::Degraded { output, reason } => {
                    warn!(%job_id, %reason, "Alignment failed, continuing without alignment");
                    output
                }
                StageOutcome::Fatal(e) => return Err(e),
            };
        }

        if options.diarize {
            segments = match self.diarize_stage(segments, audio_path).await {
                StageOutcome::Success(labelled) => {
                    info!(%job_id, "Speaker diarization applied");
                    labelled
                }
                StageOutcome::Degraded { output, reason } => {
                    warn!(%job_id, %reason, "Diarization failed, continuing without diarization");
                    output
                }
                StageOutcome::Fatal(e) => return Err(e),
            };
        }

        let word_segments: Vec<WordSegment> = segments
            .iter()
            .flat_map(|segment| segment.words.iter().cloned())
            .collect();

        let result = aggregate(
            segments,
            word_segments,
            language,
            options.model.as_str(),
            options.compute_type.as_str(),
            started.elapsed(),
        );

        let artifacts = self.persist(job_id, &result).await;
        Ok(result.finish(artifacts, started.elapsed().as_secs_f64()))
    }

    async fn align_stage(
        &self,
        segments: Vec<Segment>,
        audio_path: &Path,
        language: &str,
    ) -> StageOutcome<Vec<Segment>> {
        match self.ctx.models.aligner(language).await {
            Ok(aligner) => self.ctx.stages.align(segments, audio_path, aligner).await,
            Err(e) => StageOutcome::Degraded {
                output: segments,
                reason: e.to_string(),
            },
        }
    }

    async fn diarize_stage(
        &self,
        segments: Vec<Segment>,
        audio_path: &Path,
    ) -> StageOutcome<Vec<Segment>> {
        match self.ctx.models.diarizer().await {
            Ok(diarizer) => self.ctx.stages.diarize(segments, audio_path, diarizer).await,
            Err(e) => StageOutcome::Degraded {
                output: segments,
                reason: e.to_string(),
            },
        }
    }

    /// Uploads the transcript and timings. Failures only cost the locator.
    async fn persist(&self, job_id: Uuid, result: &TranscriptResult) -> ArtifactLocations {
        let artifacts = &self.ctx.artifacts;

        let transcript_url = match artifacts
            .put_text(&transcript_key(job_id), &result.transcript_text)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                error!(%job_id, "Failed to upload transcript: {}", e);
                None
            }
        };

        let timestamps_url = match artifacts
            .put_structured(&timestamps_key(job_id), &result.timestamps_document())
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                error!(%job_id, "Failed to upload timestamps: {}", e);
                None
            }
        };

        ArtifactLocations {
            transcript_url,
            timestamps_url,
        }
    }
}
