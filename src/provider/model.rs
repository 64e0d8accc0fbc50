//! Common value objects shared by all provider adapters

use serde::{Deserialize, Serialize};

use crate::provider::classify::ErrorKind;
use crate::routing::presets::QualityPreset;

/// Type of media that can be generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }
}

/// Capabilities a provider model may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextToImage,
    ImageToImage,
    Inpainting,
    Upscaling,
    TextToVideo,
    ImageToVideo,
    VideoExtend,
}

/// Provider region for routing optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Global,
    China,
    Both,
}

impl Region {
    /// Whether a provider in this region satisfies a region preference
    pub fn matches(&self, preferred: Region) -> bool {
        *self == Region::Both || *self == preferred
    }
}

/// How the provider executes generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One call returns the artifact directly
    Sync,
    /// Returns a task id, requires polling
    AsyncTask,
}

/// Authentication scheme used by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// Authorization: Bearer xxx
    Bearer,
    /// X-API-Key: xxx or a custom header
    ApiKeyHeader,
    /// HMAC over (method, path, timestamp, nonce, body)
    HmacSignature,
    /// SigV4-style regional signing
    SigV4,
}

/// Static descriptor of one model offered by one vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModel {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub media_type: MediaType,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_max_resolution")]
    pub max_resolution: String,
    #[serde(default = "default_aspect_ratios")]
    pub aspect_ratios: Vec<String>,
    /// USD per image, or per second of video
    #[serde(default)]
    pub pricing_per_unit: f64,
    /// 0.0-1.0, used by quality-based routing
    #[serde(default = "default_quality_score")]
    pub quality_score: f64,
    /// Seconds, average generation time
    #[serde(default = "default_latency_estimate")]
    pub latency_estimate: f64,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_region")]
    pub region: Region,
    #[serde(default = "default_execution_mode")]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_auth_kind")]
    pub auth_kind: AuthKind,
    /// Seconds, for video models
    #[serde(default)]
    pub max_video_duration: Option<u32>,
    /// Quality tier for preset-based selection
    #[serde(default)]
    pub tier: Option<QualityPreset>,
    /// Community arena score, higher is better
    #[serde(default)]
    pub arena_score: Option<f64>,
    /// Legacy model ids that resolve to this model
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_max_resolution() -> String {
    "1K".to_string()
}

fn default_aspect_ratios() -> Vec<String> {
    vec!["1:1".to_string(), "16:9".to_string(), "9:16".to_string()]
}

fn default_quality_score() -> f64 {
    0.8
}

fn default_latency_estimate() -> f64 {
    10.0
}

fn default_region() -> Region {
    Region::Global
}

fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Sync
}

fn default_auth_kind() -> AuthKind {
    AuthKind::Bearer
}

/// Ordered resolution tiers; higher index = larger
const RESOLUTION_ORDER: [&str; 3] = ["1K", "2K", "4K"];

/// Cost multiplier applied per resolution tier
pub fn resolution_cost_multiplier(resolution: &str) -> f64 {
    match resolution {
        "4K" => 2.0,
        "2K" => 1.5,
        _ => 1.0,
    }
}

impl ProviderModel {
    pub fn supports_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether the requested resolution is at or below this model's maximum
    pub fn supports_resolution(&self, resolution: &str) -> bool {
        let max_idx = RESOLUTION_ORDER.iter().position(|r| *r == self.max_resolution);
        let req_idx = RESOLUTION_ORDER.iter().position(|r| *r == resolution);
        match (max_idx, req_idx) {
            (Some(max), Some(req)) => req <= max,
            _ => false,
        }
    }

    pub fn matches_alias(&self, id: &str) -> bool {
        self.aliases.iter().any(|a| a == id)
    }

    /// Estimated cost for one generation at the given resolution (images) or
    /// duration in seconds (video)
    pub fn estimate_cost(&self, resolution: &str, duration: Option<u32>) -> f64 {
        match self.media_type {
            MediaType::Image => self.pricing_per_unit * resolution_cost_multiplier(resolution),
            MediaType::Video => self.pricing_per_unit * f64::from(duration.unwrap_or(5)),
        }
    }
}

/// Unified generation request that works across all providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_safety_level")]
    pub safety_level: String,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
    /// Reference images, raw bytes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<Vec<u8>>,
    /// Mask image for inpainting
    #[serde(default)]
    pub mask_image: Option<Vec<u8>>,
    /// Video length in seconds
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default)]
    pub preferred_provider: Option<String>,
    #[serde(default)]
    pub preferred_model: Option<String>,
    #[serde(default)]
    pub preferred_region: Option<Region>,
    /// Caller-supplied idempotent request id
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_resolution() -> String {
    "1K".to_string()
}

fn default_safety_level() -> String {
    "moderate".to_string()
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            aspect_ratio: default_aspect_ratio(),
            resolution: default_resolution(),
            safety_level: default_safety_level(),
            seed: None,
            media_type: None,
            reference_images: Vec::new(),
            mask_image: None,
            duration: None,
            fps: None,
            preferred_provider: None,
            preferred_model: None,
            preferred_region: None,
            request_id: None,
            user_id: None,
        }
    }

    /// Convert aspect ratio + resolution to pixel dimensions
    pub fn pixel_size(&self) -> (u32, u32) {
        let base: (u32, u32) = match self.aspect_ratio.as_str() {
            "16:9" => (1024, 576),
            "9:16" => (576, 1024),
            "4:3" => (1024, 768),
            "3:4" => (768, 1024),
            "21:9" => (1024, 439),
            _ => (1024, 1024),
        };
        let mult = match self.resolution.as_str() {
            "4K" => 4,
            "2K" => 2,
            _ => 1,
        };
        (base.0 * mult, base.1 * mult)
    }
}

/// The artifact produced by a successful generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPayload {
    /// Raw image bytes
    Image(Vec<u8>),
    /// URL to a generated video
    VideoUrl(String),
    /// Vendor task id for an async video still in progress
    VideoTask(String),
}

/// Unified generation result from any provider
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub success: bool,
    pub media_type: MediaType,
    pub payload: Option<MediaPayload>,
    pub provider: String,
    pub model: String,
    /// Generation time in seconds
    pub duration: f64,
    /// Realized cost in USD
    pub cost: f64,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub retryable: bool,
    pub safety_blocked: bool,
}

impl GenerationResult {
    pub fn new(media_type: MediaType, provider: impl Into<String>) -> Self {
        Self {
            success: false,
            media_type,
            payload: None,
            provider: provider.into(),
            model: String::new(),
            duration: 0.0,
            cost: 0.0,
            error: None,
            error_kind: None,
            retryable: false,
            safety_blocked: false,
        }
    }

    /// Build a failed result from an error message, classifying it
    pub fn failure(
        media_type: MediaType,
        provider: impl Into<String>,
        model: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        let kind = ErrorKind::classify(&error);
        Self {
            success: false,
            media_type,
            payload: None,
            provider: provider.into(),
            model: model.into(),
            duration: 0.0,
            cost: 0.0,
            retryable: kind.is_retryable(),
            safety_blocked: kind == ErrorKind::SafetyBlocked,
            error: Some(error),
            error_kind: Some(kind),
        }
    }

    /// Mark this result as failed with the given error, classifying it
    pub fn set_error(&mut self, error: impl Into<String>, safety_blocked: bool) {
        let error = error.into();
        let kind = if safety_blocked {
            ErrorKind::SafetyBlocked
        } else {
            ErrorKind::classify(&error)
        };
        self.success = false;
        self.retryable = !safety_blocked && kind.is_retryable();
        self.safety_blocked = safety_blocked;
        self.error = Some(error);
        self.error_kind = Some(kind);
    }
}
