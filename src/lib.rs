//! Media Generation Provider Router
//!
//! Routes image and video generation requests across heterogeneous remote
//! providers: one adapter contract over wildly different vendor APIs, a
//! circuit-breaker + adaptive-scoring router that picks where each request
//! goes, and a hedged-race engine that staggers fallbacks behind the primary
//! and commits to the first success.

pub mod config;
pub mod error;
pub mod provider;
pub mod race;
pub mod routing;
pub mod util;

pub use error::{AppError, Result};

use std::sync::Arc;
use std::time::Duration;

use config::settings::{ProviderSettings, Settings};
use provider::auth::{ApiKeyHeaderAuth, AuthStrategy, BearerAuth, HmacAuth, SigV4Auth};
use provider::model::{AuthKind, ExecutionMode, MediaType};
use provider::registry::{ProviderFactory, ProviderRegistry};
use provider::sync_http::SyncHttpProvider;
use provider::task_http::TaskHttpProvider;
use race::engine::{RaceConfig, RaceEngine};
use routing::adaptive::AdaptiveRouter;
use routing::breaker::{BreakerRegistry, CircuitBreakerConfig};
use routing::cost::CostTracker;
use routing::router::ProviderRouter;

/// Process-wide routing state shared across all concurrent tasks
pub struct RouterContext {
    pub settings: Settings,
    pub registry: Arc<ProviderRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub adaptive: Arc<AdaptiveRouter>,
    pub costs: Arc<CostTracker>,
    pub router: Arc<ProviderRouter>,
    pub race: Arc<RaceEngine>,
}

impl RouterContext {
    /// Build the context and register every configured provider
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let registry = Arc::new(ProviderRegistry::new());
        for provider in &settings.providers {
            register_provider(&registry, provider);
        }

        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let adaptive = Arc::new(AdaptiveRouter::new());
        let costs = Arc::new(CostTracker::new());

        let router = Arc::new(ProviderRouter::new(
            registry.clone(),
            breakers.clone(),
            adaptive.clone(),
            costs.clone(),
            settings.routing.clone(),
        ));
        let race = Arc::new(RaceEngine::new(
            registry.clone(),
            breakers.clone(),
            adaptive.clone(),
            costs.clone(),
            RaceConfig {
                soft_timeout: Duration::from_secs(settings.race.soft_timeout_secs),
                stagger_interval: Duration::from_secs(settings.race.stagger_interval_secs),
                overall_timeout: Duration::from_secs(settings.race.overall_timeout_secs),
            },
        ));

        Ok(Self {
            settings,
            registry,
            breakers,
            adaptive,
            costs,
            router,
            race,
        })
    }
}

fn auth_strategy(provider: &ProviderSettings) -> Arc<dyn AuthStrategy> {
    let auth = &provider.auth;
    match auth.kind {
        AuthKind::Bearer => Arc::new(BearerAuth::new(auth.api_key.clone())),
        AuthKind::ApiKeyHeader => Arc::new(ApiKeyHeaderAuth::new(
            auth.api_key.clone(),
            auth.header_name.clone(),
        )),
        AuthKind::HmacSignature => Arc::new(HmacAuth::new(
            auth.access_key.clone(),
            auth.secret_key.clone(),
        )),
        AuthKind::SigV4 => Arc::new(SigV4Auth::new(
            auth.access_key.clone(),
            auth.secret_key.clone(),
            auth.region.clone(),
            auth.service.clone(),
        )),
    }
}

fn register_provider(registry: &Arc<ProviderRegistry>, provider: &ProviderSettings) {
    let media_type = provider
        .models
        .first()
        .map(|m| m.media_type)
        .unwrap_or(MediaType::Image);
    let display_name = if provider.display_name.is_empty() {
        provider.name.clone()
    } else {
        provider.display_name.clone()
    };

    let cfg = provider.clone();
    let available = match cfg.auth.kind {
        AuthKind::Bearer | AuthKind::ApiKeyHeader => !cfg.auth.api_key.is_empty(),
        AuthKind::HmacSignature | AuthKind::SigV4 => {
            !cfg.auth.access_key.is_empty() && !cfg.auth.secret_key.is_empty()
        }
    };
    let factory: ProviderFactory = Arc::new(move || {
        let auth = auth_strategy(&cfg);
        let timeout = Duration::from_secs(cfg.timeout_secs);
        match cfg.kind {
            ExecutionMode::Sync => Ok(Arc::new(SyncHttpProvider::new(
                cfg.name.clone(),
                cfg.display_name.clone(),
                cfg.region,
                cfg.base_url.clone(),
                cfg.generate_path.clone(),
                auth,
                cfg.models.clone(),
                timeout,
                available,
            )?) as Arc<dyn provider::adapter::Provider>),
            ExecutionMode::AsyncTask => Ok(Arc::new(TaskHttpProvider::new(
                cfg.name.clone(),
                cfg.display_name.clone(),
                cfg.region,
                cfg.base_url.clone(),
                cfg.generate_path.clone(),
                cfg.status_path.clone(),
                auth,
                cfg.models.clone(),
                timeout,
                available,
            )?) as Arc<dyn provider::adapter::Provider>),
        }
    });

    match media_type {
        MediaType::Image => registry.register_image_provider(
            provider.name.clone(),
            display_name,
            provider.priority,
            provider.enabled,
            factory,
        ),
        MediaType::Video => registry.register_video_provider(
            provider.name.clone(),
            display_name,
            provider.priority,
            provider.enabled,
            factory,
        ),
    }
}
