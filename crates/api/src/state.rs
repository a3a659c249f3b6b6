use std::sync::Arc;

use anyhow::Context;
use speechtotext_config::Settings;
use speechtotext_transcription::{
    ComputeType, JobOrchestrator, ModelProvider, ModelSize, ObjectStore, PipelineContext,
    TranscriptionConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: JobOrchestrator,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn ObjectStore>,
    ) -> anyhow::Result<Self> {
        let config = pipeline_config(&settings)?;
        let ctx = PipelineContext::new(&config, provider, store);
        Ok(Self {
            orchestrator: JobOrchestrator::new(Arc::new(ctx)),
            settings: Arc::new(settings),
        })
    }

    /// Loads the default recognition model in the background. Readiness
    /// flips once it succeeds.
    pub fn spawn_warm_up(&self) -> Option<tokio::task::JoinHandle<()>> {
        let t = &self.settings.transcription;
        if !t.preload_default_model {
            return None;
        }
        let size = ModelSize::parse(&t.default_model)?;
        let compute_type = ComputeType::parse(&t.default_compute_type)?;

        let orchestrator = self.orchestrator.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = orchestrator.models().warm_up(size, compute_type).await {
                tracing::error!("Default model preload failed: {}", e);
            }
        }))
    }
}

/// Maps layered settings onto the pipeline's runtime knobs.
pub fn pipeline_config(settings: &Settings) -> anyhow::Result<TranscriptionConfig> {
    let t = &settings.transcription;
    let default_model = ModelSize::parse(&t.default_model)
        .with_context(|| format!("unknown default_model '{}'", t.default_model))?;
    let default_compute_type = ComputeType::parse(&t.default_compute_type)
        .with_context(|| format!("unknown default_compute_type '{}'", t.default_compute_type))?;

    Ok(TranscriptionConfig {
        default_model,
        default_compute_type,
        preload_default_model: t.preload_default_model,
        hf_token: t.hf_token.clone(),
        max_concurrent_stages: t.max_concurrent_stages,
        callback_max_retries: settings.callback.max_retries,
        callback_timeout_secs: settings.callback.timeout_secs,
        callback_base_delay_ms: settings.callback.base_delay_ms,
        bucket: settings.storage.bucket.clone(),
        public_base_url: settings.storage.public_base_url.clone(),
        temp_dir: settings.storage.temp_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_from_settings() {
        let mut settings = Settings::default();
        settings.callback.max_retries = 5;
        settings.transcription.default_model = "small".into();
        settings.transcription.default_compute_type = "int8".into();

        let config = pipeline_config(&settings).unwrap();
        assert_eq!(config.default_model, ModelSize::Small);
        assert_eq!(config.default_compute_type, ComputeType::Int8);
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.store_config().bucket, "speechtotext");
    }

    #[test]
    fn test_unknown_model_rejected() {
        let mut settings = Settings::default();
        settings.transcription.default_model = "gigantic".into();
        assert!(pipeline_config(&settings).is_err());
    }
}
