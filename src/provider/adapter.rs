//! Provider adapter contract and shared HTTP retry logic

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::provider::classify::{is_retryable_error, is_safety_error};
use crate::provider::model::{GenerationRequest, GenerationResult, ProviderModel, Region};

/// Health check outcome for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthReport {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            status: HealthState::Healthy,
            message: None,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthState::Unhealthy,
            message: Some(message.into()),
            latency_ms: None,
        }
    }
}

/// Terminal and in-flight states reported by async-task vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled | TaskState::Timeout
        )
    }
}

/// Standard task status response for async-task providers
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub task_id: String,
    pub state: TaskState,
    /// 0.0 to 1.0
    pub progress: Option<f64>,
    pub result_url: Option<String>,
    pub error: Option<String>,
}

/// Contract every vendor adapter implements
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique identifier for this provider (e.g. "openai", "kling")
    fn name(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str;

    fn region(&self) -> Region;

    /// Models offered by this provider
    fn models(&self) -> Vec<ProviderModel>;

    /// Whether valid credentials are configured
    fn is_available(&self) -> bool;

    fn default_model(&self) -> Option<ProviderModel> {
        let models = self.models();
        models
            .iter()
            .find(|m| m.is_default)
            .cloned()
            .or_else(|| models.into_iter().next())
    }

    fn model_by_id(&self, model_id: &str) -> Option<ProviderModel> {
        self.models().into_iter().find(|m| m.id == model_id)
    }

    /// Validate the configured credentials without a network call
    fn validate_credentials(&self) -> (bool, String);

    /// Run one generation. Errors surface inside the result, never as Err.
    async fn generate(&self, request: &GenerationRequest, model_id: Option<&str>)
        -> GenerationResult;

    /// Lightweight reachability probe
    async fn health_check(&self) -> HealthReport {
        if self.is_available() {
            HealthReport {
                status: HealthState::Healthy,
                message: None,
                latency_ms: None,
            }
        } else {
            HealthReport::unhealthy("credentials not configured")
        }
    }

    /// Poll an async task started by this provider (video flows).
    /// Sync-only providers keep the default.
    async fn task_status(&self, task_id: &str) -> Result<TaskInfo> {
        Err(AppError::InvalidRequest(format!(
            "Provider {} does not support task polling (task {})",
            self.name(),
            task_id
        )))
    }
}

/// Retry behavior for transient vendor failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Fixed backoff schedule, one entry per retry
    pub delays: Vec<Duration>,
    pub retryable_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ],
            retryable_status: vec![502, 503, 504],
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .copied()
            .unwrap_or_else(|| *self.delays.last().unwrap_or(&Duration::from_secs(8)))
    }
}

/// Failure from the retry executor
#[derive(Debug, Clone)]
pub struct AttemptError {
    pub message: String,
    pub safety_blocked: bool,
}

/// Extract an error message from a vendor response body.
/// Handles `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": ...}` shapes.
pub(crate) fn extract_error(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }
    format!("HTTP {}", status)
}

/// Send a request with bounded fixed-backoff retries.
///
/// `build` constructs a fresh request per attempt. Network errors, 5xx and
/// overload signatures are retried; safety-policy rejections abort immediately
/// and are tagged so callers never retry them.
pub(crate) async fn send_with_retry<F>(
    policy: &RetryPolicy,
    provider: &str,
    build: F,
) -> std::result::Result<reqwest::Response, AttemptError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error = String::from("no attempts made");

    for attempt in 0..=policy.max_retries {
        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let code = status.as_u16();
                let body = response.text().await.unwrap_or_default();
                let error = extract_error(code, &body);

                if is_safety_error(&error) {
                    return Err(AttemptError {
                        message: error,
                        safety_blocked: true,
                    });
                }

                last_error = error;
                let retryable =
                    policy.retryable_status.contains(&code) || is_retryable_error(&last_error);
                if retryable && attempt < policy.max_retries {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        provider = %provider,
                        attempt = attempt + 1,
                        error = %last_error,
                        delay_secs = delay.as_secs(),
                        "Retryable provider error"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                break;
            }
            Err(e) => {
                last_error = e.to_string();
                if (e.is_connect() || e.is_timeout() || is_retryable_error(&last_error))
                    && attempt < policy.max_retries
                {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        provider = %provider,
                        attempt = attempt + 1,
                        error = %last_error,
                        delay_secs = delay.as_secs(),
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                break;
            }
        }
    }

    Err(AttemptError {
        message: last_error,
        safety_blocked: false,
    })
}
