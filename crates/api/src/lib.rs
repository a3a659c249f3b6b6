pub mod error;
pub mod routes;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::service::banner))
        .route("/health", get(routes::service::health_check))
        .route("/ready", get(routes::service::ready))
        .route("/models", get(routes::service::models))
        .route("/transcribe", post(routes::transcription::transcribe))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
