//! Async-task HTTP adapter: submit a task, poll until terminal, download
//!
//! Several vendors (notably the China-region ones) never return the artifact
//! inline. Generation is submit → poll-with-backoff → download, and the
//! downloader must handle both ordinary URLs and inline `data:` URIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::provider::adapter::{
    send_with_retry, HealthReport, Provider, RetryPolicy, TaskInfo, TaskState,
};
use crate::provider::auth::{AuthStrategy, SignContext};
use crate::provider::classify::ErrorKind;
use crate::provider::model::{
    GenerationRequest, GenerationResult, MediaPayload, MediaType, ProviderModel, Region,
};
use crate::util::base64 as b64;

/// Download generated content from a URL or an inline `data:` URI
pub(crate) async fn download_result(client: &Client, url: &str) -> Result<Vec<u8>> {
    if b64::is_data_url(url) {
        return b64::decode(url);
    }
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(AppError::ProviderError(format!(
            "Result download failed: HTTP {}",
            response.status().as_u16()
        )));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Polling behavior for async tasks
#[derive(Debug, Clone)]
pub struct TaskPollConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Overall budget for the whole poll loop
    pub timeout: Duration,
    /// Consecutive poll failures tolerated before giving up
    pub max_poll_errors: u32,
}

impl Default for TaskPollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(300),
            max_poll_errors: 5,
        }
    }
}

/// Tolerant submit response: task id may appear at several paths
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    output: Option<SubmitOutput>,
    #[serde(default)]
    data: Option<SubmitOutput>,
}

#[derive(Debug, Deserialize)]
struct SubmitOutput {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl SubmitResponse {
    fn task_id(self) -> Option<String> {
        self.task_id
            .or(self.id)
            .or(self.output.and_then(|o| o.task_id.or(o.id)))
            .or(self.data.and_then(|o| o.task_id.or(o.id)))
    }
}

/// Tolerant status response
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    task_status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    results: Vec<StatusResult>,
    #[serde(default)]
    output: Option<Box<StatusResponse>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    #[serde(default)]
    url: Option<String>,
}

impl StatusResponse {
    fn into_task_info(self, task_id: &str) -> TaskInfo {
        let status_str = self
            .status
            .clone()
            .or_else(|| self.task_status.clone())
            .or_else(|| {
                self.output
                    .as_ref()
                    .and_then(|o| o.status.clone().or_else(|| o.task_status.clone()))
            })
            .unwrap_or_default();

        let state = map_vendor_status(&status_str);

        let progress = self
            .progress
            .or_else(|| self.output.as_ref().and_then(|o| o.progress))
            // Some vendors report 0-100
            .map(|p| if p > 1.0 { p / 100.0 } else { p });

        let result_url = self
            .url
            .clone()
            .or_else(|| self.image_url.clone())
            .or_else(|| self.video_url.clone())
            .or_else(|| self.results.first().and_then(|r| r.url.clone()))
            .or_else(|| {
                self.output.as_ref().and_then(|o| {
                    o.url
                        .clone()
                        .or_else(|| o.image_url.clone())
                        .or_else(|| o.video_url.clone())
                        .or_else(|| o.results.first().and_then(|r| r.url.clone()))
                })
            });

        let error = self
            .error
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| {
                self.output
                    .as_ref()
                    .and_then(|o| o.error.clone().or_else(|| o.message.clone()))
            });

        TaskInfo {
            task_id: task_id.to_string(),
            state,
            progress,
            result_url,
            error,
        }
    }
}

fn map_vendor_status(status: &str) -> TaskState {
    match status.to_ascii_lowercase().as_str() {
        "pending" | "queued" | "submitted" | "waiting" => TaskState::Queued,
        "running" | "processing" | "in_progress" | "generating" => TaskState::Processing,
        "succeeded" | "success" | "completed" | "done" => TaskState::Completed,
        "failed" | "error" => TaskState::Failed,
        "canceled" | "cancelled" => TaskState::Cancelled,
        _ => TaskState::Processing,
    }
}

/// HTTP adapter for vendors using the submit/poll/download pattern
pub struct TaskHttpProvider {
    name: String,
    display_name: String,
    region: Region,
    base_url: String,
    submit_path: String,
    status_path: String,
    auth: Arc<dyn AuthStrategy>,
    models: Vec<ProviderModel>,
    client: Client,
    retry: RetryPolicy,
    poll: TaskPollConfig,
    available: bool,
}

impl TaskHttpProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        region: Region,
        base_url: impl Into<String>,
        submit_path: impl Into<String>,
        status_path: impl Into<String>,
        auth: Arc<dyn AuthStrategy>,
        models: Vec<ProviderModel>,
        timeout: Duration,
        available: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self {
            name: name.into(),
            display_name: display_name.into(),
            region,
            base_url: base_url.into(),
            submit_path: submit_path.into(),
            status_path: status_path.into(),
            auth,
            models,
            client,
            retry: RetryPolicy::default(),
            poll: TaskPollConfig::default(),
            available,
        })
    }

    pub fn with_poll_config(mut self, poll: TaskPollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn host(&self) -> &str {
        self.base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or("")
    }

    fn signed_headers(&self, method: &str, path: &str, body: &str) -> Result<Vec<(String, String)>> {
        let ctx = SignContext {
            method,
            path,
            query: "",
            body,
            host: self.host(),
        };
        self.auth.headers(&ctx)
    }

    /// Submit a generation task, returning the vendor task id
    async fn submit_task(&self, request: &GenerationRequest, model: &ProviderModel) -> Result<String> {
        let (width, height) = request.pixel_size();
        let mut body = json!({
            "model": model.id,
            "input": {
                "prompt": request.prompt,
                "negative_prompt": request.negative_prompt,
            },
            "parameters": {
                "size": format!("{}x{}", width, height),
                "seed": request.seed,
            },
        });
        if model.media_type == MediaType::Video {
            let mut duration = request.duration.unwrap_or(5);
            if let Some(max) = model.max_video_duration {
                duration = duration.min(max);
            }
            body["parameters"]["duration"] = json!(duration);
            body["parameters"]["fps"] = json!(request.fps.unwrap_or(24));
            body["parameters"]["aspect_ratio"] = json!(request.aspect_ratio);
        }
        let body_json = serde_json::to_string(&body)?;

        let auth_headers = self.signed_headers("POST", &self.submit_path, &body_json)?;
        let url = format!("{}{}", self.base_url, self.submit_path);

        let response = send_with_retry(&self.retry, &self.name, || {
            let mut req = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(body_json.clone());
            for (k, v) in &auth_headers {
                req = req.header(k, v);
            }
            req
        })
        .await
        .map_err(|e| {
            if e.safety_blocked {
                AppError::ProviderError(format!("Content blocked by safety filter: {}", e.message))
            } else {
                AppError::ProviderError(e.message)
            }
        })?;

        let parsed: SubmitResponse = response.json().await?;
        parsed
            .task_id()
            .ok_or_else(|| AppError::ProviderError("Submit response contained no task id".into()))
    }

    /// One status poll. The status path may embed a `{task_id}` placeholder;
    /// without one the id is appended as a path segment.
    async fn poll_task_status(&self, task_id: &str) -> Result<TaskInfo> {
        let path = if self.status_path.contains("{task_id}") {
            self.status_path.replace("{task_id}", task_id)
        } else {
            format!("{}/{}", self.status_path, task_id)
        };
        let auth_headers = self.signed_headers("GET", &path, "")?;
        let url = format!("{}{}", self.base_url, path);

        let mut req = self.client.get(&url);
        for (k, v) in &auth_headers {
            req = req.header(k, v);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ProviderError(
                crate::provider::adapter::extract_error(status, &body),
            ));
        }
        let parsed: StatusResponse = response.json().await?;
        Ok(parsed.into_task_info(task_id))
    }

    /// Poll until the task reaches a terminal state.
    ///
    /// Interval grows ×1.5 up to the cap. Consecutive poll failures are
    /// bounded by `max_poll_errors`; elapsed time always counts against the
    /// overall timeout.
    async fn wait_for_completion(&self, task_id: &str) -> TaskInfo {
        let start = Instant::now();
        let mut interval = self.poll.initial_interval;
        let mut consecutive_errors = 0u32;

        while start.elapsed() < self.poll.timeout {
            match self.poll_task_status(task_id).await {
                Ok(info) => {
                    consecutive_errors = 0;
                    if info.state.is_terminal() {
                        return info;
                    }
                    debug!(
                        provider = %self.name,
                        task_id = %task_id,
                        progress = ?info.progress,
                        "Task still in progress"
                    );
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        provider = %self.name,
                        task_id = %task_id,
                        consecutive_errors,
                        error = %e,
                        "Error polling task"
                    );
                    if consecutive_errors >= self.poll.max_poll_errors {
                        return TaskInfo {
                            task_id: task_id.to_string(),
                            state: TaskState::Failed,
                            progress: None,
                            result_url: None,
                            error: Some(format!(
                                "Polling failed {} times in a row: connection error",
                                consecutive_errors
                            )),
                        };
                    }
                }
            }

            tokio::time::sleep(interval).await;
            interval = std::cmp::min(interval.mul_f64(1.5), self.poll.max_interval);
        }

        TaskInfo {
            task_id: task_id.to_string(),
            state: TaskState::Timeout,
            progress: None,
            result_url: None,
            error: Some(format!(
                "Polling timed out after {}s",
                self.poll.timeout.as_secs()
            )),
        }
    }
}

#[async_trait]
impl Provider for TaskHttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn region(&self) -> Region {
        self.region
    }

    fn models(&self) -> Vec<ProviderModel> {
        self.models.clone()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn validate_credentials(&self) -> (bool, String) {
        if self.available {
            (true, "credentials configured".to_string())
        } else {
            (false, "API key not configured".to_string())
        }
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        model_id: Option<&str>,
    ) -> GenerationResult {
        let start = Instant::now();

        let model = match model_id {
            Some(id) => self.model_by_id(id),
            None => self.default_model(),
        };
        let model = match model {
            Some(m) => m,
            None => {
                let mut r = GenerationResult::new(MediaType::Image, &self.name);
                r.set_error(
                    match model_id {
                        Some(id) => format!("Model not found: {}", id),
                        None => "No models available".to_string(),
                    },
                    false,
                );
                return r;
            }
        };

        let mut result = GenerationResult::new(model.media_type, &self.name);
        result.model = model.id.clone();

        let task_id = match self.submit_task(request, &model).await {
            Ok(id) => id,
            Err(e) => {
                let msg = e.to_string();
                let safety = ErrorKind::classify(&msg) == ErrorKind::SafetyBlocked;
                result.set_error(msg, safety);
                result.duration = start.elapsed().as_secs_f64();
                return result;
            }
        };
        info!(provider = %self.name, task_id = %task_id, "Task submitted");

        // Video tasks are submit-only: the caller polls via task_status
        if model.media_type == MediaType::Video {
            result.success = true;
            result.payload = Some(MediaPayload::VideoTask(task_id));
            result.cost = model.estimate_cost(&request.resolution, request.duration);
            result.duration = start.elapsed().as_secs_f64();
            return result;
        }

        let info = self.wait_for_completion(&task_id).await;
        match info.state {
            TaskState::Completed => match info.result_url {
                Some(url) => match download_result(&self.client, &url).await {
                    Ok(bytes) => {
                        result.success = true;
                        result.payload = Some(MediaPayload::Image(bytes));
                        result.cost = model.estimate_cost(&request.resolution, None);
                        info!(provider = %self.name, task_id = %task_id, "Generation completed");
                    }
                    Err(e) => result.set_error(format!("Result download failed: {}", e), false),
                },
                None => result.set_error("No result URL in completed task", false),
            },
            TaskState::Timeout => {
                result.set_error(
                    info.error.unwrap_or_else(|| "Task timed out".to_string()),
                    false,
                );
            }
            state => {
                let error = info.error.unwrap_or_else(|| format!("Task {:?}", state));
                let safety = ErrorKind::classify(&error) == ErrorKind::SafetyBlocked;
                result.set_error(error, safety);
            }
        }
        result.duration = start.elapsed().as_secs_f64();
        result
    }

    async fn health_check(&self) -> HealthReport {
        if !self.available {
            return HealthReport::unhealthy("API key not configured");
        }
        let start = Instant::now();
        match self.client.get(&self.base_url).send().await {
            Ok(_) => HealthReport::healthy(start.elapsed().as_millis() as u64),
            Err(e) => HealthReport::unhealthy(e.to_string()),
        }
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskInfo> {
        self.poll_task_status(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_vendor_status() {
        assert_eq!(map_vendor_status("PENDING"), TaskState::Queued);
        assert_eq!(map_vendor_status("RUNNING"), TaskState::Processing);
        assert_eq!(map_vendor_status("SUCCEEDED"), TaskState::Completed);
        assert_eq!(map_vendor_status("failed"), TaskState::Failed);
        assert_eq!(map_vendor_status("CANCELED"), TaskState::Cancelled);
        assert_eq!(map_vendor_status("weird"), TaskState::Processing);
    }

    #[test]
    fn test_submit_response_task_id_paths() {
        let direct: SubmitResponse = serde_json::from_str(r#"{"task_id":"t1"}"#).unwrap();
        assert_eq!(direct.task_id().as_deref(), Some("t1"));

        let nested: SubmitResponse =
            serde_json::from_str(r#"{"output":{"task_id":"t2"}}"#).unwrap();
        assert_eq!(nested.task_id().as_deref(), Some("t2"));

        let id_only: SubmitResponse = serde_json::from_str(r#"{"id":"t3"}"#).unwrap();
        assert_eq!(id_only.task_id().as_deref(), Some("t3"));

        let empty: SubmitResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(empty.task_id().is_none());
    }

    #[test]
    fn test_status_response_shapes() {
        let flat: StatusResponse = serde_json::from_str(
            r#"{"status":"SUCCEEDED","progress":100,"results":[{"url":"https://x/img.png"}]}"#,
        )
        .unwrap();
        let info = flat.into_task_info("t1");
        assert_eq!(info.state, TaskState::Completed);
        assert_eq!(info.progress, Some(1.0));
        assert_eq!(info.result_url.as_deref(), Some("https://x/img.png"));

        let nested: StatusResponse = serde_json::from_str(
            r#"{"output":{"task_status":"RUNNING","progress":0.4}}"#,
        )
        .unwrap();
        let info = nested.into_task_info("t2");
        assert_eq!(info.state, TaskState::Processing);
        assert_eq!(info.progress, Some(0.4));

        let failed: StatusResponse =
            serde_json::from_str(r#"{"status":"FAILED","message":"boom"}"#).unwrap();
        let info = failed.into_task_info("t3");
        assert_eq!(info.state, TaskState::Failed);
        assert_eq!(info.error.as_deref(), Some("boom"));
    }
}
