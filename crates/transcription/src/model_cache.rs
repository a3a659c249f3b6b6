use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::asr::{Aligner, Diarizer, ModelProvider, Recognizer};
use crate::error::{PipelineError, PipelineResult};
use crate::model::{ComputeType, ModelSize};

/// Identity of a cached model: kind plus the configuration it was built with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelKey {
    Recognition {
        size: ModelSize,
        compute_type: ComputeType,
    },
    Alignment {
        language: String,
    },
    Diarization,
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKey::Recognition { size, compute_type } => {
                write!(f, "recognition:{}_{}", size.as_str(), compute_type.as_str())
            }
            ModelKey::Alignment { language } => write!(f, "alignment:{language}"),
            ModelKey::Diarization => f.write_str("diarization"),
        }
    }
}

/// A shared, read-only model instance.
#[derive(Clone)]
pub enum ModelHandle {
    Recognizer(Arc<dyn Recognizer>),
    Aligner(Arc<dyn Aligner>),
    Diarizer(Arc<dyn Diarizer>),
}

impl ModelHandle {
    pub fn recognizer(&self) -> Option<Arc<dyn Recognizer>> {
        match self {
            ModelHandle::Recognizer(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn aligner(&self) -> Option<Arc<dyn Aligner>> {
        match self {
            ModelHandle::Aligner(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn diarizer(&self) -> Option<Arc<dyn Diarizer>> {
        match self {
            ModelHandle::Diarizer(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Whether both handles point at the same underlying instance.
    pub fn same_instance(&self, other: &ModelHandle) -> bool {
        match (self, other) {
            (ModelHandle::Recognizer(a), ModelHandle::Recognizer(b)) => Arc::ptr_eq(a, b),
            (ModelHandle::Aligner(a), ModelHandle::Aligner(b)) => Arc::ptr_eq(a, b),
            (ModelHandle::Diarizer(a), ModelHandle::Diarizer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelHandle::Recognizer(r) => write!(f, "ModelHandle::Recognizer({})", r.name()),
            ModelHandle::Aligner(a) => write!(f, "ModelHandle::Aligner({})", a.language()),
            ModelHandle::Diarizer(_) => f.write_str("ModelHandle::Diarizer"),
        }
    }
}

/// Process-wide cache of expensive model instances.
///
/// Each key owns a `OnceCell`: the first caller runs the construction on the
/// blocking pool, concurrent callers for the same key await that same
/// construction. A failed construction leaves the cell empty so the next
/// caller retries.
pub struct ModelCache {
    provider: Arc<dyn ModelProvider>,
    /// Authorization for the gated diarization weights.
    diarization_token: Option<String>,
    slots: DashMap<ModelKey, Arc<OnceCell<ModelHandle>>>,
}

impl ModelCache {
    pub fn new(provider: Arc<dyn ModelProvider>, diarization_token: Option<String>) -> Self {
        let diarization_token = diarization_token.filter(|t| !t.trim().is_empty());
        if diarization_token.is_none() {
            warn!("No diarization token configured, diarization will be unavailable");
        }
        info!(provider = provider.name(), "Model cache created");
        Self {
            provider,
            diarization_token,
            slots: DashMap::new(),
        }
    }

    /// Returns the cached handle for `key`, constructing it on first use.
    pub async fn acquire(&self, key: ModelKey) -> PipelineResult<ModelHandle> {
        if key == ModelKey::Diarization && self.diarization_token.is_none() {
            return Err(PipelineError::ModelUnavailable(
                "diarization requires an authorization token".to_string(),
            ));
        }

        let slot = self.slots.entry(key.clone()).or_default().clone();
        let handle = slot.get_or_try_init(|| self.construct(key)).await?;
        Ok(handle.clone())
    }

    pub async fn recognizer(
        &self,
        size: ModelSize,
        compute_type: ComputeType,
    ) -> PipelineResult<Arc<dyn Recognizer>> {
        let key = ModelKey::Recognition { size, compute_type };
        let handle = self.acquire(key.clone()).await?;
        handle.recognizer().ok_or_else(|| mismatched(&key))
    }

    pub async fn aligner(&self, language: &str) -> PipelineResult<Arc<dyn Aligner>> {
        let key = ModelKey::Alignment {
            language: language.to_string(),
        };
        let handle = self.acquire(key.clone()).await?;
        handle.aligner().ok_or_else(|| mismatched(&key))
    }

    pub async fn diarizer(&self) -> PipelineResult<Arc<dyn Diarizer>> {
        let handle = self.acquire(ModelKey::Diarization).await?;
        handle
            .diarizer()
            .ok_or_else(|| mismatched(&ModelKey::Diarization))
    }

    async fn construct(&self, key: ModelKey) -> PipelineResult<ModelHandle> {
        info!(model = %key, "Loading model");
        let started = Instant::now();

        let provider = Arc::clone(&self.provider);
        let token = self.diarization_token.clone();
        let label = key.to_string();

        let loaded = tokio::task::spawn_blocking(move || -> anyhow::Result<ModelHandle> {
            match key {
                ModelKey::Recognition { size, compute_type } => provider
                    .load_recognizer(size, compute_type)
                    .map(ModelHandle::Recognizer),
                ModelKey::Alignment { language } => {
                    provider.load_aligner(&language).map(ModelHandle::Aligner)
                }
                ModelKey::Diarization => {
                    let token = token.unwrap_or_default();
                    provider.load_diarizer(&token).map(ModelHandle::Diarizer)
                }
            }
        })
        .await;

        match loaded {
            Ok(Ok(handle)) => {
                info!(
                    model = %label,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                Ok(handle)
            }
            Ok(Err(e)) => {
                warn!(model = %label, "Failed to load model: {:#}", e);
                Err(PipelineError::ModelUnavailable(format!("{label}: {e:#}")))
            }
            Err(e) => {
                warn!(model = %label, "Model construction task failed: {}", e);
                Err(PipelineError::ModelUnavailable(format!(
                    "{label}: construction task failed: {e}"
                )))
            }
        }
    }

    /// Loads the recognition model that most jobs use, ahead of the first
    /// request.
    pub async fn warm_up(&self, size: ModelSize, compute_type: ComputeType) -> PipelineResult<()> {
        info!(model = size.as_str(), compute_type = compute_type.as_str(), "Preloading default model");
        self.recognizer(size, compute_type).await.map(|_| ())
    }

    /// Number of models successfully constructed and held.
    pub fn loaded_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    /// Ready once at least one model is loaded.
    pub fn is_ready(&self) -> bool {
        self.loaded_count() > 0
    }

    pub fn is_loaded(&self, key: &ModelKey) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.initialized())
    }

    /// Drops every handle and asks the provider to free device memory.
    /// Only called at shutdown.
    pub fn clear(&self) {
        let count = self.loaded_count();
        self.slots.clear();
        self.provider.release();
        info!(released = count, "Model cache cleared");
    }
}

fn mismatched(key: &ModelKey) -> PipelineError {
    PipelineError::ModelUnavailable(format!("{key}: cached handle has the wrong kind"))
}
