use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, PipelineError};
use crate::model::{JobOutcome, JobStatus};

/// Bounded retries with exponential backoff for callback delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Pause after failed attempt number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Body POSTed to `{callback_base}/{job_id}/callback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub transcript_text: Option<String>,
    /// JSON-encoded `{segments, word_segments, speakers}`; absent without segments.
    pub timestamps_json: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<ErrorCode>,
    /// Seconds.
    pub processing_time: f64,
    pub language_detected: Option<String>,
    pub confidence: Option<f64>,
}

impl CallbackPayload {
    pub fn from_outcome(job_id: Uuid, outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed(result) => {
                let timestamps_json = if result.segments.is_empty() {
                    None
                } else {
                    serde_json::to_string(&serde_json::json!({
                        "segments": result.segments,
                        "word_segments": result.word_segments,
                        "speakers": result.speakers,
                    }))
                    .ok()
                };
                Self {
                    job_id,
                    status: JobStatus::Completed,
                    transcript_text: Some(result.transcript_text.clone()),
                    timestamps_json,
                    error_message: None,
                    error_code: None,
                    processing_time: result.processing_time,
                    language_detected: result.language.clone(),
                    confidence: result.confidence,
                }
            }
            JobOutcome::Failed(failure) => Self {
                job_id,
                status: JobStatus::Failed,
                transcript_text: None,
                timestamps_json: None,
                error_message: Some(failure.message.clone()),
                error_code: Some(failure.code),
                processing_time: failure.processing_time,
                language_detected: None,
                confidence: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    GaveUp { attempts: u32, last_error: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::GaveUp { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// `{base}/{job_id}/callback`
pub fn callback_url(base: &str, job_id: Uuid) -> String {
    format!("{}/{}/callback", base.trim_end_matches('/'), job_id)
}

/// Delivers terminal job outcomes to caller-supplied endpoints.
///
/// Delivery never fails outward: once the retry budget is spent the
/// outcome is logged and dropped.
#[derive(Clone)]
pub struct CallbackDispatcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl CallbackDispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn deliver(
        &self,
        endpoint: &str,
        job_id: Uuid,
        outcome: &JobOutcome,
    ) -> DeliveryOutcome {
        let payload = CallbackPayload::from_outcome(job_id, outcome);
        self.deliver_payload(endpoint, &payload).await
    }

    pub async fn deliver_payload(&self, endpoint: &str, payload: &CallbackPayload) -> DeliveryOutcome {
        let job_id = payload.job_id;
        let url = callback_url(endpoint, job_id);
        let max_attempts = self.policy.max_attempts.max(1);
        info!(%job_id, %url, status = %payload.status, "Sending callback");

        let mut last_error = String::new();
        for attempt in 0..max_attempts {
            match self.send_once(&url, payload).await {
                Ok(()) => {
                    info!(%job_id, attempts = attempt + 1, "Callback sent successfully");
                    return DeliveryOutcome::Delivered {
                        attempts: attempt + 1,
                    };
                }
                Err(e) => {
                    warn!(%job_id, attempt = attempt + 1, "Callback attempt failed: {:#}", e);
                    last_error = format!("{e:#}");
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        let failure = PipelineError::Delivery(format!(
            "gave up after {max_attempts} attempts: {last_error}"
        ));
        error!(%job_id, code = %failure.code(), "{}", failure);
        DeliveryOutcome::GaveUp {
            attempts: max_attempts,
            last_error,
        }
    }

    async fn send_once(&self, url: &str, payload: &CallbackPayload) -> anyhow::Result<()> {
        self.client
            .post(url)
            .timeout(self.policy.timeout)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
