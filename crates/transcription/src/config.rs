use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::callback::RetryPolicy;
use crate::model::{ComputeType, ModelSize};
use crate::storage::StoreConfig;

/// Runtime knobs of the transcription pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Model preloaded at startup.
    pub default_model: ModelSize,
    pub default_compute_type: ComputeType,
    pub preload_default_model: bool,
    /// Authorization token for the gated diarization weights.
    pub hf_token: Option<String>,
    /// Size of the blocking worker pool shared by all stages of all jobs.
    pub max_concurrent_stages: usize,
    /// Callback attempts before giving up.
    pub callback_max_retries: u32,
    /// Per-attempt callback timeout.
    pub callback_timeout_secs: u64,
    /// Backoff after the first failed callback attempt (doubles each time).
    pub callback_base_delay_ms: u64,
    pub bucket: String,
    pub public_base_url: String,
    /// Where localized audio copies go. None = system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            default_model: ModelSize::Base,
            default_compute_type: ComputeType::Float16,
            preload_default_model: true,
            hf_token: None,
            max_concurrent_stages: 2,
            callback_max_retries: 3,
            callback_timeout_secs: 30,
            callback_base_delay_ms: 1000,
            bucket: "speechtotext".to_string(),
            public_base_url: "http://localhost:9000".to_string(),
            temp_dir: None,
        }
    }
}

impl TranscriptionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.callback_max_retries,
            base_delay: Duration::from_millis(self.callback_base_delay_ms),
            timeout: Duration::from_secs(self.callback_timeout_secs),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            bucket: self.bucket.clone(),
            public_base_url: self.public_base_url.clone(),
            temp_dir: self.temp_dir.clone(),
        }
    }
}
