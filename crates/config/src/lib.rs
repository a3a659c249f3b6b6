use std::net::SocketAddr;
use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Environment variable prefix, e.g. `STT__SERVER__PORT=9090`.
pub const ENV_PREFIX: &str = "STT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub transcription: TranscriptionSettings,
    pub callback: CallbackSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Model backend. Only "local_whisper" ships today.
    pub backend: String,
    /// "cpu" or "cuda".
    pub device: String,
    /// Directory holding ggml model files.
    pub model_dir: PathBuf,
    pub default_model: String,
    pub default_compute_type: String,
    /// Token for the gated diarization weights.
    pub hf_token: Option<String>,
    pub max_concurrent_stages: usize,
    pub preload_default_model: bool,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            backend: "local_whisper".to_string(),
            device: "cpu".to_string(),
            model_dir: PathBuf::from("models"),
            default_model: "base".to_string(),
            default_compute_type: "float16".to_string(),
            hf_token: None,
            max_concurrent_stages: 2,
            preload_default_model: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackSettings {
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub base_delay_ms: u64,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_secs: 30,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory of the local object store.
    pub root: PathBuf,
    pub bucket: String,
    pub public_base_url: String,
    pub temp_dir: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/objects"),
            bucket: "speechtotext".to_string(),
            public_base_url: "http://localhost:9000".to_string(),
            temp_dir: None,
        }
    }
}

impl Settings {
    /// Defaults, then `config/default.toml`, then `config/{APP_ENV}.toml`,
    /// then `STT__*` environment variables. Both files are optional.
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{env}")).required(false))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Defaults, then `file` (required when given), then environment.
    pub fn from_sources(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path));
        }
        builder
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Settings as JSON with secrets masked, for startup logging.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if self.transcription.hf_token.is_some() {
            value["transcription"]["hf_token"] = serde_json::Value::from("***");
        }
        value
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
