//! Synchronous HTTP adapter: one call returns the artifact directly

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::provider::adapter::{send_with_retry, HealthReport, Provider, RetryPolicy};
use crate::provider::auth::{AuthStrategy, SignContext};
use crate::provider::model::{
    GenerationRequest, GenerationResult, MediaPayload, MediaType, ProviderModel, Region,
};
use crate::provider::task_http::download_result;
use crate::util::base64 as b64;

/// Generic request body accepted by OpenAI-style image endpoints
#[derive(Debug, Serialize)]
struct ApiGenerateRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    model: String,
    n: u32,
    size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    /// Base64 reference image for image-to-image
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    /// Base64 mask for inpainting
    #[serde(skip_serializing_if = "Option::is_none")]
    mask: Option<String>,
    response_format: String,
}

/// Tolerant response covering `images`/`data` arrays and `b64_json`/`base64`/
/// `url` payload fields
#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<ApiImageData>,
    #[serde(default)]
    data: Vec<ApiImageData>,
}

#[derive(Debug, Deserialize)]
struct ApiImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    base64: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// HTTP adapter for vendors that return the artifact in the response
pub struct SyncHttpProvider {
    name: String,
    display_name: String,
    region: Region,
    base_url: String,
    generate_path: String,
    auth: Arc<dyn AuthStrategy>,
    models: Vec<ProviderModel>,
    client: Client,
    retry: RetryPolicy,
    available: bool,
}

impl SyncHttpProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        region: Region,
        base_url: impl Into<String>,
        generate_path: impl Into<String>,
        auth: Arc<dyn AuthStrategy>,
        models: Vec<ProviderModel>,
        timeout: Duration,
        available: bool,
    ) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::error::AppError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self {
            name: name.into(),
            display_name: display_name.into(),
            region,
            base_url: base_url.into(),
            generate_path: generate_path.into(),
            auth,
            models,
            client,
            retry: RetryPolicy::default(),
            available,
        })
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
}

#[async_trait]
impl Provider for SyncHttpProvider {
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
        let mut result = GenerationResult::new(MediaType::Image, &self.name);

        let model = match model_id {
            Some(id) => self.model_by_id(id),
            None => self.default_model(),
        };
        let model = match model {
            Some(m) => m,
            None => {
                result.set_error(
                    match model_id {
                        Some(id) => format!("Model not found: {}", id),
                        None => "No models available".to_string(),
                    },
                    false,
                );
                return result;
            }
        };
        result.model = model.id.clone();

        let (width, height) = request.pixel_size();
        let body = ApiGenerateRequest {
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            model: model.id.clone(),
            n: 1,
            size: format!("{}x{}", width, height),
            seed: request.seed,
            image: request.reference_images.first().map(|img| b64::encode(img)),
            mask: request.mask_image.as_deref().map(b64::encode),
            response_format: "b64_json".to_string(),
        };
        let body_json = match serde_json::to_string(&body) {
            Ok(s) => s,
            Err(e) => {
                result.set_error(format!("Request serialization failed: {}", e), false);
                return result;
            }
        };

        let sign_ctx = SignContext {
            method: "POST",
            path: &self.generate_path,
            query: "",
            body: &body_json,
            host: self.host(),
        };
        let auth_headers = match self.auth.headers(&sign_ctx) {
            Ok(h) => h,
            Err(e) => {
                result.set_error(format!("Signing failed: {}", e), false);
                return result;
            }
        };

        let url = format!("{}{}", self.base_url, self.generate_path);
        debug!(provider = %self.name, model = %model.id, "Sending generate request");

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
        .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                result.set_error(e.message, e.safety_blocked);
                result.duration = start.elapsed().as_secs_f64();
                return result;
            }
        };

        let parsed: ApiGenerateResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                result.set_error(format!("Failed to parse response: {}", e), false);
                result.duration = start.elapsed().as_secs_f64();
                return result;
            }
        };

        let image = parsed.images.into_iter().chain(parsed.data).next();
        let payload = match image {
            Some(img) => {
                if let Some(encoded) = img.b64_json.or(img.base64) {
                    b64::decode(&encoded).map(MediaPayload::Image)
                } else if let Some(url) = img.url {
                    download_result(&self.client, &url)
                        .await
                        .map(MediaPayload::Image)
                } else {
                    Err(crate::error::AppError::ProviderError(
                        "Response contained neither image data nor URL".to_string(),
                    ))
                }
            }
            None => Err(crate::error::AppError::ProviderError(
                "Response contained no images".to_string(),
            )),
        };

        match payload {
            Ok(p) => {
                result.success = true;
                result.payload = Some(p);
                result.cost = model.estimate_cost(&request.resolution, None);
                info!(provider = %self.name, model = %model.id, "Generation completed");
            }
            Err(e) => result.set_error(e.to_string(), false),
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
            // Any response, even 404, means the API is reachable
            Ok(_) => HealthReport::healthy(start.elapsed().as_millis() as u64),
            Err(e) => HealthReport::unhealthy(e.to_string()),
        }
    }
}
