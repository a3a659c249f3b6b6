use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use serde_json::Value;

#[derive(Clone, Default)]
struct Inbox {
    received: Arc<Mutex<Vec<(String, Value)>>>,
}

/// Stands in for the job-tracking service: accepts
/// `POST /internal/v1/transcriptions/{job_id}/callback`.
pub struct CallbackReceiver {
    pub base_url: String,
    inbox: Inbox,
}

async fn receive(
    State(inbox): State<Inbox>,
    Path(job_id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    inbox.received.lock().unwrap().push((job_id, body));
    StatusCode::OK
}

impl CallbackReceiver {
    pub async fn spawn() -> Self {
        let inbox = Inbox::default();
        let app = Router::new()
            .route("/internal/v1/transcriptions/{job_id}/callback", post(receive))
            .with_state(inbox.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind callback receiver");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/internal/v1/transcriptions"),
            inbox,
        }
    }

    pub fn received(&self) -> Vec<(String, Value)> {
        self.inbox.received.lock().unwrap().clone()
    }

    /// Waits for the first callback, or panics after `timeout`.
    pub async fn next(&self, timeout: Duration) -> (String, Value) {
        let inbox = self.inbox.clone();
        tokio::time::timeout(timeout, async move {
            loop {
                let first = inbox.received.lock().unwrap().first().cloned();
                if let Some(first) = first {
                    return first;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("no callback received")
    }
}
