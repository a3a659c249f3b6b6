use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{Aligner, Diarizer, ModelProvider, RecognitionRequest, Recognizer};
use crate::model::{ComputeType, ModelSize, Recognition, Segment};

/// Get the language string for a whisper language ID.
fn whisper_lang_str(lang_id: i32) -> Option<String> {
    whisper_rs::get_lang_str(lang_id).map(|s| s.to_string())
}

/// GGML file name for a model tier inside `model_dir`.
fn model_file(size: ModelSize) -> &'static str {
    match size {
        ModelSize::Tiny => "ggml-tiny.bin",
        ModelSize::Base => "ggml-base.bin",
        ModelSize::Small => "ggml-small.bin",
        ModelSize::Medium => "ggml-medium.bin",
        ModelSize::Large => "ggml-large-v3.bin",
    }
}

/// Model provider backed by whisper.cpp via whisper-rs.
///
/// Only recognition is available locally; alignment and diarization report
/// themselves as unavailable so the pipeline degrades gracefully.
pub struct LocalWhisperProvider {
    model_dir: PathBuf,
    use_gpu: bool,
}

impl LocalWhisperProvider {
    pub fn new(model_dir: impl Into<PathBuf>, device: &str) -> Self {
        Self {
            model_dir: model_dir.into(),
            use_gpu: device != "cpu",
        }
    }
}

impl ModelProvider for LocalWhisperProvider {
    fn name(&self) -> &str {
        "local_whisper"
    }

    fn load_recognizer(
        &self,
        size: ModelSize,
        compute_type: ComputeType,
    ) -> anyhow::Result<Arc<dyn Recognizer>> {
        let path = self.model_dir.join(model_file(size));
        info!(model_path = %path.display(), compute_type = compute_type.as_str(), "Loading Whisper model");

        let mut params = WhisperContextParameters::default();
        params.use_gpu(self.use_gpu);
        let model_path = path.to_string_lossy();
        let ctx = WhisperContext::new_with_params(&model_path, params)
            .map_err(|e| anyhow::anyhow!("Failed to load Whisper model '{}': {}", model_path, e))?;
        info!(model = size.as_str(), "Whisper model loaded");

        Ok(Arc::new(LocalWhisperRecognizer { ctx }))
    }

    fn load_aligner(&self, language: &str) -> anyhow::Result<Arc<dyn Aligner>> {
        anyhow::bail!("no alignment model for '{}' in the local_whisper backend", language)
    }

    fn load_diarizer(&self, _auth_token: &str) -> anyhow::Result<Arc<dyn Diarizer>> {
        anyhow::bail!("diarization is not supported by the local_whisper backend")
    }
}

struct LocalWhisperRecognizer {
    ctx: WhisperContext,
}

impl Recognizer for LocalWhisperRecognizer {
    fn transcribe(&self, request: &RecognitionRequest) -> anyhow::Result<Recognition> {
        let audio = read_wav_16k_mono(&request.audio_path)?;

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| anyhow::anyhow!("Failed to create Whisper state: {}", e))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: 5,
            patience: 1.0,
        });

        if let Some(ref lang) = request.language_hint {
            params.set_language(Some(lang.as_str()));
        } else {
            params.set_detect_language(true);
        }

        // Always transcribe in the source language (never translate to English)
        params.set_translate(false);
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_single_segment(false);
        params.set_suppress_blank(true);

        state
            .full(params, &audio)
            .map_err(|e| anyhow::anyhow!("Whisper transcription failed: {}", e))?;

        let mut segments = Vec::new();
        for i in 0..state.full_n_segments() {
            if let Some(segment) = state.get_segment(i)
                && let Ok(text) = segment.to_str()
            {
                // whisper.cpp timestamps are in centiseconds
                let start = segment.start_timestamp() as f64 / 100.0;
                let end = segment.end_timestamp() as f64 / 100.0;
                segments.push(Segment::new(start, end, text.trim()));
            }
        }

        let language =
            whisper_lang_str(state.full_lang_id_from_state()).or(request.language_hint.clone());

        debug!(segments = segments.len(), ?language, "Whisper transcription complete");

        Ok(Recognition { segments, language })
    }

    fn name(&self) -> &str {
        "local_whisper"
    }
}

/// Reads a WAV file that must already be 16kHz. Multi-channel audio is
/// down-mixed to mono.
fn read_wav_16k_mono(path: &Path) -> anyhow::Result<Vec<f32>> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open WAV '{}': {}", path.display(), e))?;
    let spec = reader.spec();
    if spec.sample_rate != 16000 {
        anyhow::bail!(
            "Expected 16kHz WAV but got {}Hz in '{}'",
            spec.sample_rate,
            path.display()
        );
    }
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.unwrap_or(0) as f32 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.unwrap_or(0.0))
            .collect(),
    };

    if channels > 1 {
        Ok(samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect())
    } else {
        Ok(samples)
    }
}
