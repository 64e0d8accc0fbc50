//! Provider selection strategies and fallback execution
//!
//! The router picks a provider + model for each request, executes with a
//! per-attempt timeout, and walks the fallback chain on retryable failures.
//! Every attempt feeds the circuit breakers and the adaptive scorer.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::settings::RoutingSettings;
use crate::error::{AppError, Result};
use crate::provider::adapter::{HealthReport, Provider};
use crate::provider::model::{
    resolution_cost_multiplier, GenerationRequest, GenerationResult, MediaType, ProviderModel,
    Region,
};
use crate::provider::registry::{ProviderInfo, ProviderRegistry};
use crate::routing::adaptive::{AdaptiveRouter, ProviderScore};
use crate::routing::breaker::{BreakerRegistry, BreakerStatus};
use crate::routing::cost::{CostSummary, CostTracker};

/// How the router picks among available providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Configured priority order
    Priority,
    /// Minimize cost
    Cost,
    /// Maximize quality score
    Quality,
    /// Minimize estimated latency
    Speed,
    /// Rotate between providers
    RoundRobin,
    /// Historical-performance scoring
    Adaptive,
    /// Prefer providers in the requested region
    Region,
}

impl FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "priority" => Ok(RoutingStrategy::Priority),
            "cost" => Ok(RoutingStrategy::Cost),
            "quality" => Ok(RoutingStrategy::Quality),
            "speed" => Ok(RoutingStrategy::Speed),
            "round_robin" => Ok(RoutingStrategy::RoundRobin),
            "adaptive" => Ok(RoutingStrategy::Adaptive),
            "region" => Ok(RoutingStrategy::Region),
            other => Err(format!("unknown routing strategy: {}", other)),
        }
    }
}

/// Outcome of provider selection
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub provider_name: String,
    pub model_id: String,
    pub estimated_cost: f64,
    pub estimated_latency: f64,
    pub fallback_providers: Vec<String>,
    pub strategy_used: String,
    pub region: Option<Region>,
}

/// Routes requests across registered providers
pub struct ProviderRouter {
    registry: Arc<ProviderRegistry>,
    breakers: Arc<BreakerRegistry>,
    adaptive: Arc<AdaptiveRouter>,
    costs: Arc<CostTracker>,
    settings: RoutingSettings,
    round_robin: AtomicUsize,
}

impl ProviderRouter {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        breakers: Arc<BreakerRegistry>,
        adaptive: Arc<AdaptiveRouter>,
        costs: Arc<CostTracker>,
        settings: RoutingSettings,
    ) -> Self {
        Self {
            registry,
            breakers,
            adaptive,
            costs,
            settings,
            round_robin: AtomicUsize::new(0),
        }
    }

    pub fn adaptive(&self) -> &Arc<AdaptiveRouter> {
        &self.adaptive
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Select the best provider + model for a request
    pub fn route(
        &self,
        request: &GenerationRequest,
        strategy: Option<RoutingStrategy>,
        media_type: MediaType,
    ) -> Result<RoutingDecision> {
        let strategy = strategy.unwrap_or_else(|| {
            self.settings
                .default_strategy
                .parse()
                .unwrap_or(RoutingStrategy::Priority)
        });

        // A caller-specified provider bypasses strategy selection
        if let Some(preferred) = &request.preferred_provider {
            if let Some(provider) = self.registry.get_provider(preferred, media_type) {
                if provider.is_available() {
                    let model = match &request.preferred_model {
                        Some(id) => provider.model_by_id(id),
                        None => provider.default_model(),
                    };
                    let model =
                        model.ok_or_else(|| AppError::ModelNotFound(preferred.clone()))?;
                    return Ok(RoutingDecision {
                        provider_name: provider.name().to_string(),
                        model_id: model.id.clone(),
                        estimated_cost: model.pricing_per_unit,
                        estimated_latency: model.latency_estimate,
                        fallback_providers: self.fallback_list(provider.name(), media_type),
                        strategy_used: "user_specified".to_string(),
                        region: Some(provider.region()),
                    });
                }
            }
            warn!(provider = %preferred, "Preferred provider unavailable, routing normally");
        }

        let providers = self.registry.available_providers(media_type);
        if providers.is_empty() {
            return Err(AppError::NoAvailableProviders(
                media_type.as_str().to_string(),
            ));
        }

        // Breaker gate; if every circuit is open, keep the full list so a
        // request still has somewhere to go
        let mut candidates: Vec<Arc<dyn Provider>> = providers
            .iter()
            .filter(|p| self.breakers.get(p.name()).can_execute())
            .cloned()
            .collect();
        if candidates.is_empty() {
            warn!("All provider circuit breakers are open, using full provider list");
            candidates = providers;
        }

        // Region filter, skipped when it would empty the list
        if let Some(region) = request.preferred_region {
            let regional: Vec<Arc<dyn Provider>> = candidates
                .iter()
                .filter(|p| p.region().matches(region))
                .cloned()
                .collect();
            if !regional.is_empty() {
                candidates = regional;
            }
        }

        let selected = match strategy {
            RoutingStrategy::Cost => self.select_by_cost(&candidates, request),
            RoutingStrategy::Quality => self.select_by_quality(&candidates, request),
            RoutingStrategy::Speed => self.select_by_speed(&candidates, request),
            RoutingStrategy::RoundRobin => self.select_round_robin(&candidates),
            RoutingStrategy::Adaptive => self.select_adaptive(&candidates, request),
            RoutingStrategy::Region => {
                self.select_by_region(&candidates, request, request.preferred_region)
            }
            RoutingStrategy::Priority => self.select_by_priority(&candidates),
        };

        let (provider, model) =
            selected.ok_or_else(|| AppError::NoAvailableProviders(media_type.as_str().into()))?;

        Ok(RoutingDecision {
            provider_name: provider.name().to_string(),
            model_id: model.id.clone(),
            estimated_cost: model.pricing_per_unit,
            estimated_latency: model.latency_estimate,
            fallback_providers: self.fallback_list(provider.name(), media_type),
            strategy_used: match strategy {
                RoutingStrategy::Priority => "priority",
                RoutingStrategy::Cost => "cost",
                RoutingStrategy::Quality => "quality",
                RoutingStrategy::Speed => "speed",
                RoutingStrategy::RoundRobin => "round_robin",
                RoutingStrategy::Adaptive => "adaptive",
                RoutingStrategy::Region => "region",
            }
            .to_string(),
            region: Some(provider.region()),
        })
    }

    /// Execute one attempt on the routed provider, recording the outcome
    pub async fn execute(
        &self,
        request: &GenerationRequest,
        decision: &RoutingDecision,
        media_type: MediaType,
    ) -> GenerationResult {
        let provider = match self.registry.get_provider(&decision.provider_name, media_type) {
            Some(p) => p,
            None => {
                return GenerationResult::failure(
                    media_type,
                    &decision.provider_name,
                    &decision.model_id,
                    format!("Provider not found: {}", decision.provider_name),
                )
            }
        };
        let result = provider.generate(request, Some(&decision.model_id)).await;
        self.record_attempt(&decision.provider_name, &result, media_type);
        result
    }

    /// Execute with automatic fallback on retryable failures.
    ///
    /// Tries primary then fallbacks, at most `max_fallbacks + 1` attempts.
    /// Each attempt runs under the configured provider timeout. Non-retryable
    /// failures (safety, bad request) end the chain immediately.
    pub async fn execute_with_fallback(
        &self,
        request: &GenerationRequest,
        decision: &RoutingDecision,
        media_type: MediaType,
        max_fallbacks: usize,
    ) -> GenerationResult {
        let mut chain: Vec<String> = Vec::with_capacity(max_fallbacks + 1);
        chain.push(decision.provider_name.clone());
        chain.extend(decision.fallback_providers.iter().cloned());
        chain.truncate(max_fallbacks + 1);

        let timeout = Duration::from_secs(self.settings.provider_timeout_secs);
        let mut last: Option<GenerationResult> = None;

        for (i, provider_name) in chain.iter().enumerate() {
            let breaker = self.breakers.get(provider_name);
            if !breaker.can_execute() {
                info!(provider = %provider_name, "Circuit open, skipping");
                continue;
            }

            let provider = match self.registry.get_provider(provider_name, media_type) {
                Some(p) if p.is_available() => p,
                _ => continue,
            };

            // Primary keeps the routed model, fallbacks use their default
            let model_id = if i == 0 {
                decision.model_id.clone()
            } else {
                match provider.default_model() {
                    Some(m) => m.id,
                    None => continue,
                }
            };

            let start = Instant::now();
            let attempt =
                tokio::time::timeout(timeout, provider.generate(request, Some(&model_id))).await;

            let result = match attempt {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        provider = %provider_name,
                        timeout_secs = timeout.as_secs(),
                        "Provider timed out, moving to next fallback"
                    );
                    let mut r = GenerationResult::failure(
                        media_type,
                        provider_name,
                        &model_id,
                        format!("Provider timed out after {}s", timeout.as_secs()),
                    );
                    r.duration = start.elapsed().as_secs_f64();
                    r
                }
            };

            self.record_attempt(provider_name, &result, media_type);

            if result.success {
                if i > 0 {
                    info!(provider = %provider_name, "Fallback succeeded");
                }
                return result;
            }
            if !result.retryable {
                return result;
            }
            last = Some(result);

            if !self.settings.enable_fallback {
                break;
            }
        }

        last.unwrap_or_else(|| {
            GenerationResult::failure(media_type, "none", "", "No available providers")
        })
    }

    /// Feed breaker, adaptive scorer, and (on success) the cost ledger
    pub fn record_attempt(
        &self,
        provider_name: &str,
        result: &GenerationResult,
        media_type: MediaType,
    ) {
        let breaker = self.breakers.get(provider_name);
        let latency = Duration::from_secs_f64(result.duration.max(0.0));
        if result.success {
            breaker.record_success();
            self.adaptive.record(provider_name, true, latency, result.cost);
            if result.cost > 0.0 {
                self.costs
                    .record(provider_name, &result.model, media_type, result.cost);
            }
        } else {
            breaker.record_failure();
            self.adaptive.record(provider_name, false, latency, 0.0);
        }
    }

    fn fallback_list(&self, exclude: &str, media_type: MediaType) -> Vec<String> {
        let configured = match media_type {
            MediaType::Image => &self.settings.fallback_image_providers,
            MediaType::Video => &self.settings.fallback_video_providers,
        };
        configured
            .iter()
            .filter(|p| p.as_str() != exclude)
            .cloned()
            .collect()
    }

    fn select_by_priority(
        &self,
        providers: &[Arc<dyn Provider>],
    ) -> Option<(Arc<dyn Provider>, ProviderModel)> {
        // List arrives priority-sorted from the registry
        let provider = providers.first()?.clone();
        let model = provider.default_model()?;
        Some((provider, model))
    }

    fn select_by_cost(
        &self,
        providers: &[Arc<dyn Provider>],
        request: &GenerationRequest,
    ) -> Option<(Arc<dyn Provider>, ProviderModel)> {
        let mult = resolution_cost_multiplier(&request.resolution);
        providers
            .iter()
            .flat_map(|p| {
                p.models()
                    .into_iter()
                    .filter(|m| !m.hidden && m.supports_resolution(&request.resolution))
                    .map(move |m| (p.clone(), m))
            })
            .min_by(|a, b| {
                let ca = a.1.pricing_per_unit * mult;
                let cb = b.1.pricing_per_unit * mult;
                ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .or_else(|| self.select_by_priority(providers))
    }

    fn select_by_quality(
        &self,
        providers: &[Arc<dyn Provider>],
        request: &GenerationRequest,
    ) -> Option<(Arc<dyn Provider>, ProviderModel)> {
        providers
            .iter()
            .flat_map(|p| {
                p.models()
                    .into_iter()
                    .filter(|m| !m.hidden && m.supports_resolution(&request.resolution))
                    .map(move |m| (p.clone(), m))
            })
            .max_by(|a, b| {
                a.1.quality_score
                    .partial_cmp(&b.1.quality_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .or_else(|| self.select_by_priority(providers))
    }

    fn select_by_speed(
        &self,
        providers: &[Arc<dyn Provider>],
        request: &GenerationRequest,
    ) -> Option<(Arc<dyn Provider>, ProviderModel)> {
        providers
            .iter()
            .flat_map(|p| {
                p.models()
                    .into_iter()
                    .filter(|m| !m.hidden && m.supports_resolution(&request.resolution))
                    .map(move |m| (p.clone(), m))
            })
            .min_by(|a, b| {
                a.1.latency_estimate
                    .partial_cmp(&b.1.latency_estimate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .or_else(|| self.select_by_priority(providers))
    }

    fn select_round_robin(
        &self,
        providers: &[Arc<dyn Provider>],
    ) -> Option<(Arc<dyn Provider>, ProviderModel)> {
        if providers.is_empty() {
            return None;
        }
        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % providers.len();
        let provider = providers[idx].clone();
        let model = provider.default_model()?;
        Some((provider, model))
    }

    fn select_adaptive(
        &self,
        providers: &[Arc<dyn Provider>],
        request: &GenerationRequest,
    ) -> Option<(Arc<dyn Provider>, ProviderModel)> {
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        let best_name = self.adaptive.best_provider(&names)?.to_string();
        let provider = providers.iter().find(|p| p.name() == best_name)?.clone();

        // Within the winning provider, highest quality that fits the resolution
        let model = provider
            .models()
            .into_iter()
            .filter(|m| m.supports_resolution(&request.resolution))
            .max_by(|a, b| {
                a.quality_score
                    .partial_cmp(&b.quality_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .or_else(|| provider.default_model())?;
        Some((provider, model))
    }

    fn select_by_region(
        &self,
        providers: &[Arc<dyn Provider>],
        request: &GenerationRequest,
        region: Option<Region>,
    ) -> Option<(Arc<dyn Provider>, ProviderModel)> {
        if let Some(region) = region {
            let regional: Vec<Arc<dyn Provider>> = providers
                .iter()
                .filter(|p| p.region().matches(region))
                .cloned()
                .collect();
            if !regional.is_empty() {
                return self.select_by_quality(&regional, request);
            }
        }
        self.select_by_quality(providers, request)
    }

    // Admin surface

    pub fn reset_circuit_breaker(&self, provider: &str) -> bool {
        self.breakers.reset(provider)
    }

    pub fn reset_all_circuit_breakers(&self) {
        self.breakers.reset_all();
    }

    pub fn circuit_breaker_status(&self) -> Vec<BreakerStatus> {
        self.breakers.statuses()
    }

    pub fn adaptive_stats(&self) -> Vec<ProviderScore> {
        self.adaptive.all_scores()
    }

    pub fn cost_summary(&self) -> CostSummary {
        self.costs.summary()
    }

    pub fn list_available_providers(&self, media_type: MediaType) -> Vec<ProviderInfo> {
        self.registry
            .list_all()
            .into_iter()
            .filter(|info| info.media_type == media_type)
            .collect()
    }

    /// Probe every available provider concurrently
    pub async fn health_check_all(&self, media_type: MediaType) -> Vec<(String, HealthReport)> {
        let providers = self.registry.available_providers(media_type);
        let checks = providers.iter().map(|p| async {
            let report = p.health_check().await;
            (p.name().to_string(), report)
        });
        futures::future::join_all(checks).await
    }
}
