use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tempfile::TempPath;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

/// Object storage as consumed by the pipeline: a flat key space inside one
/// bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
}

/// Directory-backed object store. Keys map to paths below `root`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            anyhow::bail!("invalid object key '{}'", key);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read object '{}': {}", key, e))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write object '{}': {}", key, e))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

/// In-process object store, mainly for tests and local runs.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, (Vec<u8>, String)>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects
            .insert(key.into(), (bytes.into(), "application/octet-stream".to_string()));
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        self.objects
            .get(key)
            .map(|entry| String::from_utf8_lossy(&entry.value().0).into_owned())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.get(key).map(|entry| entry.value().1.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self.objects
            .get(key)
            .map(|entry| entry.value().0.clone())
            .ok_or_else(|| anyhow::anyhow!("object '{}' not found", key))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        self.objects
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.objects.contains_key(key))
    }
}

/// Where artifacts live and how their public locators look.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bucket: String,
    pub public_base_url: String,
    /// Directory for localized audio copies. None = system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: "speechtotext".to_string(),
            public_base_url: "http://localhost:9000".to_string(),
            temp_dir: None,
        }
    }
}

/// Key of the plain-text transcript for a job.
pub fn transcript_key(job_id: Uuid) -> String {
    format!("transcripts/{job_id}.txt")
}

/// Key of the structured timings document for a job.
pub fn timestamps_key(job_id: Uuid) -> String {
    format!("timestamps/{job_id}.json")
}

/// A job-scoped local copy of the input audio. The file is removed when the
/// value is dropped or passed to [`ArtifactGateway::cleanup`].
#[derive(Debug)]
pub struct LocalizedAudio {
    path: TempPath,
}

impl LocalizedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Moves audio in and artifacts out of object storage for the pipeline.
#[derive(Clone)]
pub struct ArtifactGateway {
    store: Arc<dyn ObjectStore>,
    config: StoreConfig,
}

impl ArtifactGateway {
    pub fn new(store: Arc<dyn ObjectStore>, config: StoreConfig) -> Self {
        Self { store, config }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Maps `s3://bucket/key`, `{public_base_url}/bucket/key` or a bare key
    /// to a key inside the configured bucket.
    pub fn resolve_key(&self, uri: &str) -> PipelineResult<String> {
        let uri = uri.trim();
        let bucket_prefix = format!("{}/", self.config.bucket);
        let public_prefix = format!(
            "{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            bucket_prefix
        );

        let key = if let Some(rest) = uri.strip_prefix("s3://") {
            rest.strip_prefix(&bucket_prefix).ok_or_else(|| {
                PipelineError::Storage(format!(
                    "'{}' is outside bucket '{}'",
                    uri, self.config.bucket
                ))
            })?
        } else if let Some(rest) = uri.strip_prefix(&public_prefix) {
            rest
        } else if uri.contains("://") {
            return Err(PipelineError::Storage(format!("unsupported audio locator '{uri}'")));
        } else {
            uri.trim_start_matches('/')
        };

        if key.is_empty() {
            return Err(PipelineError::Storage(format!("empty object key in '{uri}'")));
        }
        Ok(key.to_string())
    }

    /// Public locator of a stored object.
    pub fn locator(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            self.config.bucket,
            key
        )
    }

    /// Copies the object at `uri` into a local temporary file.
    pub async fn fetch(&self, uri: &str) -> PipelineResult<LocalizedAudio> {
        let key = self.resolve_key(uri)?;
        let bytes = self
            .store
            .get(&key)
            .await
            .map_err(|e| PipelineError::Storage(format!("failed to fetch '{uri}': {e:#}")))?;

        let suffix = Path::new(&key)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let mut builder = tempfile::Builder::new();
        builder.prefix("stt-audio-").suffix(&suffix);
        let file = match &self.config.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| PipelineError::Storage(format!("failed to create local copy: {e}")))?;
        let path = file.into_temp_path();

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| PipelineError::Storage(format!("failed to write local copy: {e}")))?;

        debug!(%key, local = %path.display(), bytes = bytes.len(), "Audio localized");
        Ok(LocalizedAudio { path })
    }

    pub async fn put_text(&self, key: &str, content: &str) -> PipelineResult<String> {
        self.store
            .put(key, content.as_bytes().to_vec(), "text/plain; charset=utf-8")
            .await
            .map_err(|e| PipelineError::Storage(format!("failed to upload '{key}': {e:#}")))?;
        info!(%key, "Uploaded text artifact");
        Ok(self.locator(key))
    }

    pub async fn put_structured<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
    ) -> PipelineResult<String> {
        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|e| PipelineError::Storage(format!("failed to encode '{key}': {e}")))?;
        self.store
            .put(key, bytes, "application/json")
            .await
            .map_err(|e| PipelineError::Storage(format!("failed to upload '{key}': {e:#}")))?;
        info!(%key, "Uploaded JSON artifact");
        Ok(self.locator(key))
    }

    pub async fn exists(&self, uri: &str) -> PipelineResult<bool> {
        let key = self.resolve_key(uri)?;
        self.store
            .exists(&key)
            .await
            .map_err(|e| PipelineError::Storage(format!("failed to stat '{uri}': {e:#}")))
    }

    pub async fn delete(&self, uri: &str) -> PipelineResult<()> {
        let key = self.resolve_key(uri)?;
        self.store
            .delete(&key)
            .await
            .map_err(|e| PipelineError::Storage(format!("failed to delete '{uri}': {e:#}")))
    }

    /// Removes a localized copy. Best-effort: failures are only logged.
    pub fn cleanup(&self, audio: LocalizedAudio) {
        let path = audio.path().to_path_buf();
        match audio.path.close() {
            Ok(()) => debug!(local = %path.display(), "Local audio copy removed"),
            Err(e) => warn!(local = %path.display(), "Failed to remove local audio copy: {}", e),
        }
    }
}
