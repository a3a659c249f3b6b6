use std::sync::Arc;
use std::time::Duration;

use speechtotext_api::{build_router, state::AppState};
use speechtotext_config::Settings;
use speechtotext_transcription::MemoryObjectStore;
use speechtotext_transcription::testing::{Counters, ScriptedProvider};

/// Audio object every test app starts with.
pub const AUDIO_KEY: &str = "audio/sample.wav";

pub struct TestApp {
    pub addr: String,
    pub client: reqwest::Client,
    pub state: AppState,
    pub store: Arc<MemoryObjectStore>,
    pub counters: Arc<Counters>,
    _temp_dir: tempfile::TempDir,
}

impl TestApp {
    /// Spawns the service with a provider that always hears "hello world".
    pub async fn spawn() -> Self {
        Self::spawn_with(ScriptedProvider::hello_world()).await
    }

    pub async fn spawn_with(provider: ScriptedProvider) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut settings = Settings::default();
        settings.storage.temp_dir = Some(temp_dir.path().to_path_buf());
        settings.callback.base_delay_ms = 20;
        settings.callback.timeout_secs = 5;
        settings.transcription.hf_token = Some("hf_test".to_string());

        let store = Arc::new(MemoryObjectStore::new());
        store.insert(AUDIO_KEY, b"RIFF test audio".to_vec());

        let counters = provider.counters();
        let state = AppState::new(settings, Arc::new(provider), store.clone())
            .expect("Failed to build app state");

        let app = build_router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let addr = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            state,
            store,
            counters,
            _temp_dir: temp_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path))
    }

    pub fn audio_uri(&self) -> String {
        format!("s3://speechtotext/{AUDIO_KEY}")
    }

    /// Loads the default model the way startup does and waits for it.
    pub async fn warm_up(&self) {
        if let Some(handle) = self.state.spawn_warm_up() {
            handle.await.expect("warm-up task panicked");
        }
    }

    /// Polls until no job is executing, or panics after `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) {
        let registry = self.state.orchestrator.registry().clone();
        tokio::time::timeout(timeout, async move {
            while registry.running_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs still running");
    }
}
