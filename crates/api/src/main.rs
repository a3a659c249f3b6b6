use std::sync::Arc;

use anyhow::Context;
use speechtotext_api::{build_router, state::AppState};
use speechtotext_config::Settings;
use speechtotext_transcription::{LocalObjectStore, ModelProvider};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::load().context("Failed to load settings")?;
    info!(settings = %settings.redacted(), "Settings loaded");

    let provider = model_provider(&settings)?;
    let store = Arc::new(LocalObjectStore::new(&settings.storage.root));
    let addr = settings.server.bind_addr()?;

    let state = AppState::new(settings, provider, store)?;
    state.spawn_warm_up();

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Transcription service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.orchestrator.models().clear();
    info!("Transcription service stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(feature = "local-whisper")]
fn model_provider(settings: &Settings) -> anyhow::Result<Arc<dyn ModelProvider>> {
    use speechtotext_transcription::asr::local_whisper::LocalWhisperProvider;

    let t = &settings.transcription;
    match t.backend.as_str() {
        "local_whisper" => Ok(Arc::new(LocalWhisperProvider::new(&t.model_dir, &t.device))),
        other => anyhow::bail!("Unknown transcription backend '{}'", other),
    }
}

#[cfg(not(feature = "local-whisper"))]
fn model_provider(settings: &Settings) -> anyhow::Result<Arc<dyn ModelProvider>> {
    anyhow::bail!(
        "Transcription backend '{}' is not compiled in (build with --features local-whisper)",
        settings.transcription.backend
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
