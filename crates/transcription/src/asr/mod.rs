#[cfg(feature = "local-whisper")]
pub mod local_whisper;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::model::{ComputeType, ModelSize, Recognition, Segment, SpeakerTurn};

/// Request to transcribe a localized audio file.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub audio_path: PathBuf,
    /// Optional language hint (ISO 639-1, e.g. "en", "de"). None = auto-detect.
    pub language_hint: Option<String>,
    pub batch_size: u32,
}

/// Speech-to-text capability. Implementations are CPU/GPU bound and are
/// only ever called from the blocking worker pool.
pub trait Recognizer: Send + Sync + 'static {
    fn transcribe(&self, request: &RecognitionRequest) -> anyhow::Result<Recognition>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Word-level alignment for one language.
pub trait Aligner: Send + Sync + 'static {
    /// Returns the input segments with their `words` filled in.
    fn align(&self, segments: &[Segment], audio_path: &Path) -> anyhow::Result<Vec<Segment>>;

    fn language(&self) -> &str;
}

/// Speaker diarization over a whole recording.
pub trait Diarizer: Send + Sync + 'static {
    fn diarize(&self, audio_path: &Path) -> anyhow::Result<Vec<SpeakerTurn>>;
}

/// Constructs the expensive model instances behind each stage.
///
/// Every `load_*` call may block for a long time (weights download, device
/// upload); the model cache makes sure each distinct configuration is loaded
/// at most once.
pub trait ModelProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn load_recognizer(
        &self,
        size: ModelSize,
        compute_type: ComputeType,
    ) -> anyhow::Result<Arc<dyn Recognizer>>;

    fn load_aligner(&self, language: &str) -> anyhow::Result<Arc<dyn Aligner>>;

    /// `auth_token` grants access to the gated diarization weights.
    fn load_diarizer(&self, auth_token: &str) -> anyhow::Result<Arc<dyn Diarizer>>;

    /// Frees device memory once every handle has been dropped.
    fn release(&self) {}
}
