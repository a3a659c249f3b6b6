use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::asr::{Aligner, Diarizer, RecognitionRequest, Recognizer};
use crate::error::PipelineError;
use crate::model::{Recognition, Segment};
use crate::speakers::assign_speakers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Recognize,
    Align,
    Diarize,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Recognize => "recognize",
            StageKind::Align => "align",
            StageKind::Diarize => "diarize",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one stage, classified so the orchestrator can branch on it.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Success(T),
    /// The stage failed but its input is still usable downstream.
    Degraded { output: T, reason: String },
    Fatal(PipelineError),
}

impl<T> StageOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded { .. })
    }

    /// The usable output, or the fatal error.
    pub fn into_output(self) -> Result<T, PipelineError> {
        match self {
            StageOutcome::Success(output) | StageOutcome::Degraded { output, .. } => Ok(output),
            StageOutcome::Fatal(e) => Err(e),
        }
    }
}

/// Runs pipeline stages on a bounded pool of blocking threads so model
/// inference never stalls the async request path.
#[derive(Clone)]
pub struct StageRunner {
    permits: Arc<Semaphore>,
    pool_size: usize,
}

impl StageRunner {
    pub fn new(max_concurrent: usize) -> Self {
        let pool_size = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Slots currently free in the worker pool.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `work` on the blocking pool once a slot frees up. A panic inside
    /// `work` comes back as an error.
    async fn dispatch<T, F>(&self, stage: StageKind, work: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("worker pool closed"))?;

        let started = Instant::now();
        // The permit travels with the closure: the slot stays taken until the
        // blocking work is really done, even if the caller stops waiting.
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await
        .map_err(|e| anyhow::anyhow!("{} stage task failed: {}", stage, e))?;

        debug!(
            %stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Stage finished"
        );
        result
    }

    /// Speech-to-text. Any failure here is fatal to the job.
    pub async fn recognize(
        &self,
        audio_path: &Path,
        recognizer: Arc<dyn Recognizer>,
        batch_size: u32,
        language_hint: Option<String>,
    ) -> StageOutcome<Recognition> {
        let request = RecognitionRequest {
            audio_path: audio_path.to_path_buf(),
            language_hint,
            batch_size,
        };

        let result = self
            .dispatch(StageKind::Recognize, move || recognizer.transcribe(&request))
            .await;

        match result {
            Ok(recognition) => StageOutcome::Success(recognition),
            Err(e) => StageOutcome::Fatal(PipelineError::Recognition(format!("{e:#}"))),
        }
    }

    /// Word-level alignment. On failure the input segments pass through
    /// untouched.
    pub async fn align(
        &self,
        segments: Vec<Segment>,
        audio_path: &Path,
        aligner: Arc<dyn Aligner>,
    ) -> StageOutcome<Vec<Segment>> {
        let input = segments.clone();
        let path: PathBuf = audio_path.to_path_buf();
        let result = self
            .dispatch(StageKind::Align, move || aligner.align(&input, &path))
            .await;

        match result {
            Ok(aligned) => StageOutcome::Success(aligned),
            Err(e) => degraded(StageKind::Align, segments, e),
        }
    }

    /// Speaker diarization followed by speaker assignment. On failure the
    /// input segments pass through without speaker labels.
    pub async fn diarize(
        &self,
        segments: Vec<Segment>,
        audio_path: &Path,
        diarizer: Arc<dyn Diarizer>,
    ) -> StageOutcome<Vec<Segment>> {
        let input = segments.clone();
        let path: PathBuf = audio_path.to_path_buf();
        let result = self
            .dispatch(StageKind::Diarize, move || {
                let turns = diarizer.diarize(&path)?;
                Ok(assign_speakers(&turns, &input))
            })
            .await;

        match result {
            Ok(labelled) => StageOutcome::Success(labelled),
            Err(e) => degraded(StageKind::Diarize, segments, e),
        }
    }
}

fn degraded(stage: StageKind, segments: Vec<Segment>, error: anyhow::Error) -> StageOutcome<Vec<Segment>> {
    warn!(%stage, "Stage failed, continuing without it: {:#}", error);
    StageOutcome::Degraded {
        output: segments,
        reason: format!("{stage} failed: {error:#}"),
    }
}
