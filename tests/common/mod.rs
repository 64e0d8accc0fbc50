//! Shared test fixtures: scripted providers and recording collaborators
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gen_router::error::Result;
use gen_router::provider::adapter::Provider;
use gen_router::provider::model::{
    AuthKind, Capability, ExecutionMode, GenerationRequest, GenerationResult, MediaPayload,
    MediaType, ProviderModel, Region,
};
use gen_router::provider::registry::ProviderRegistry;
use gen_router::race::state::{ProgressNotifier, QuotaService, TaskStage};

/// Route crate tracing through the test harness; RUST_LOG controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn image_model(id: &str, provider: &str) -> ProviderModel {
    ProviderModel {
        id: id.to_string(),
        name: id.to_string(),
        provider: provider.to_string(),
        media_type: MediaType::Image,
        capabilities: vec![Capability::TextToImage],
        max_resolution: "2K".to_string(),
        aspect_ratios: vec!["1:1".to_string(), "16:9".to_string()],
        pricing_per_unit: 0.02,
        quality_score: 0.8,
        latency_estimate: 5.0,
        is_default: true,
        hidden: false,
        region: Region::Global,
        execution_mode: ExecutionMode::Sync,
        auth_kind: AuthKind::Bearer,
        max_video_duration: None,
        tier: None,
        arena_score: None,
        aliases: Vec::new(),
    }
}

/// Provider that sleeps a scripted latency then succeeds or fails
pub struct ScriptedProvider {
    name: String,
    latency: Duration,
    succeed: bool,
    error: String,
    models: Vec<ProviderModel>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn succeeding(name: &str, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            latency,
            succeed: true,
            error: String::new(),
            models: vec![image_model(&format!("{}-v1", name), name)],
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str, latency: Duration, error: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            latency,
            succeed: false,
            error: error.to_string(),
            models: vec![image_model(&format!("{}-v1", name), name)],
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_models(name: &str, latency: Duration, models: Vec<ProviderModel>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            latency,
            succeed: true,
            error: String::new(),
            models,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn region(&self) -> Region {
        Region::Global
    }

    fn models(&self) -> Vec<ProviderModel> {
        self.models.clone()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn validate_credentials(&self) -> (bool, String) {
        (true, "ok".to_string())
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
        model_id: Option<&str>,
    ) -> GenerationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        let model = model_id.unwrap_or("unknown").to_string();
        if self.succeed {
            let mut result = GenerationResult::new(MediaType::Image, &self.name);
            result.success = true;
            result.model = model;
            result.payload = Some(MediaPayload::Image(vec![1, 2, 3]));
            result.cost = 0.02;
            result.duration = self.latency.as_secs_f64();
            result
        } else {
            let mut result =
                GenerationResult::failure(MediaType::Image, &self.name, model, &self.error);
            result.duration = self.latency.as_secs_f64();
            result
        }
    }
}

/// Register a pre-built provider instance under its name
pub fn register(registry: &ProviderRegistry, provider: Arc<ScriptedProvider>, priority: i32) {
    let name = provider.name().to_string();
    let instance: Arc<dyn Provider> = provider;
    registry.register_image_provider(name.clone(), name, priority, true, {
        let instance = instance.clone();
        Arc::new(move || Ok(instance.clone()))
    });
}

/// Quota service that counts refunds
#[derive(Default)]
pub struct CountingQuota {
    pub refunds: AtomicUsize,
}

#[async_trait]
impl QuotaService for CountingQuota {
    async fn refund(&self, _user_id: &str, count: u32) -> Result<()> {
        self.refunds.fetch_add(count as usize, Ordering::SeqCst);
        Ok(())
    }
}

/// Notifier that counts events per kind
#[derive(Default)]
pub struct CountingNotifier {
    pub progress_events: AtomicUsize,
    pub completed_events: AtomicUsize,
    pub error_events: AtomicUsize,
}

#[async_trait]
impl ProgressNotifier for CountingNotifier {
    async fn progress(&self, _user_id: &str, _task_id: &str, _stage: TaskStage, _progress: f64) {
        self.progress_events.fetch_add(1, Ordering::SeqCst);
    }

    async fn completed(&self, _user_id: &str, _task_id: &str, _provider: &str, _duration_ms: u64) {
        self.completed_events.fetch_add(1, Ordering::SeqCst);
    }

    async fn error(&self, _user_id: &str, _task_id: &str, _error: &str, _code: Option<&str>) {
        self.error_events.fetch_add(1, Ordering::SeqCst);
    }
}
