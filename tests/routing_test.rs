//! Router strategy selection, fallback execution, and model presets

mod common;

use std::sync::Arc;
use std::time::Duration;

use gen_router::config::settings::RoutingSettings;
use gen_router::provider::adapter::HealthState;
use gen_router::provider::model::{GenerationRequest, MediaType};
use gen_router::provider::registry::ProviderRegistry;
use gen_router::routing::adaptive::AdaptiveRouter;
use gen_router::routing::breaker::BreakerRegistry;
use gen_router::routing::cost::CostTracker;
use gen_router::routing::presets::{
    all_models, resolve_alias, select_model_by_preset, QualityPreset,
};
use gen_router::routing::router::{ProviderRouter, RoutingStrategy};

use common::{image_model, init_tracing, register, ScriptedProvider};

fn router_with(
    registry: Arc<ProviderRegistry>,
    settings: RoutingSettings,
) -> (ProviderRouter, Arc<BreakerRegistry>, Arc<AdaptiveRouter>) {
    init_tracing();
    let breakers = Arc::new(BreakerRegistry::default());
    let adaptive = Arc::new(AdaptiveRouter::new());
    let router = ProviderRouter::new(
        registry,
        breakers.clone(),
        adaptive.clone(),
        Arc::new(CostTracker::new()),
        settings,
    );
    (router, breakers, adaptive)
}

fn two_provider_registry() -> Arc<ProviderRegistry> {
    let registry = Arc::new(ProviderRegistry::new());

    let mut cheap = image_model("cheap-v1", "cheap");
    cheap.pricing_per_unit = 0.01;
    cheap.quality_score = 0.6;
    cheap.latency_estimate = 2.0;

    let mut fancy = image_model("fancy-v1", "fancy");
    fancy.pricing_per_unit = 0.08;
    fancy.quality_score = 0.95;
    fancy.latency_estimate = 20.0;

    register(
        &registry,
        ScriptedProvider::with_models("cheap", Duration::from_millis(10), vec![cheap]),
        1,
    );
    register(
        &registry,
        ScriptedProvider::with_models("fancy", Duration::from_millis(10), vec![fancy]),
        0,
    );
    registry
}

#[test]
fn priority_strategy_follows_registration_order() {
    let registry = two_provider_registry();
    let (router, _, _) = router_with(registry, RoutingSettings::default());

    let request = GenerationRequest::new("a fox");
    let decision = router
        .route(&request, Some(RoutingStrategy::Priority), MediaType::Image)
        .unwrap();
    // fancy registered with priority 0
    assert_eq!(decision.provider_name, "fancy");
    assert_eq!(decision.strategy_used, "priority");
}

#[test]
fn cost_strategy_prefers_cheapest_model() {
    let registry = two_provider_registry();
    let (router, _, _) = router_with(registry, RoutingSettings::default());

    let decision = router
        .route(
            &GenerationRequest::new("a fox"),
            Some(RoutingStrategy::Cost),
            MediaType::Image,
        )
        .unwrap();
    assert_eq!(decision.provider_name, "cheap");
    assert_eq!(decision.model_id, "cheap-v1");
}

#[test]
fn quality_strategy_prefers_best_model() {
    let registry = two_provider_registry();
    let (router, _, _) = router_with(registry, RoutingSettings::default());

    let decision = router
        .route(
            &GenerationRequest::new("a fox"),
            Some(RoutingStrategy::Quality),
            MediaType::Image,
        )
        .unwrap();
    assert_eq!(decision.provider_name, "fancy");
}

#[test]
fn speed_strategy_prefers_lowest_latency() {
    let registry = two_provider_registry();
    let (router, _, _) = router_with(registry, RoutingSettings::default());

    let decision = router
        .route(
            &GenerationRequest::new("a fox"),
            Some(RoutingStrategy::Speed),
            MediaType::Image,
        )
        .unwrap();
    assert_eq!(decision.provider_name, "cheap");
}

#[test]
fn round_robin_rotates_providers() {
    let registry = two_provider_registry();
    let (router, _, _) = router_with(registry, RoutingSettings::default());

    let request = GenerationRequest::new("a fox");
    let first = router
        .route(&request, Some(RoutingStrategy::RoundRobin), MediaType::Image)
        .unwrap();
    let second = router
        .route(&request, Some(RoutingStrategy::RoundRobin), MediaType::Image)
        .unwrap();
    assert_ne!(first.provider_name, second.provider_name);
}

#[test]
fn adaptive_strategy_follows_observed_performance() {
    let registry = two_provider_registry();
    let (router, _, adaptive) = router_with(registry, RoutingSettings::default());

    for _ in 0..20 {
        adaptive.record("cheap", true, Duration::from_secs(1), 0.01);
        adaptive.record("fancy", false, Duration::from_secs(30), 0.0);
    }

    let decision = router
        .route(
            &GenerationRequest::new("a fox"),
            Some(RoutingStrategy::Adaptive),
            MediaType::Image,
        )
        .unwrap();
    assert_eq!(decision.provider_name, "cheap");
}

#[test]
fn preferred_provider_bypasses_strategy() {
    let registry = two_provider_registry();
    let (router, _, _) = router_with(registry, RoutingSettings::default());

    let mut request = GenerationRequest::new("a fox");
    request.preferred_provider = Some("cheap".to_string());
    let decision = router
        .route(&request, Some(RoutingStrategy::Quality), MediaType::Image)
        .unwrap();
    assert_eq!(decision.provider_name, "cheap");
    assert_eq!(decision.strategy_used, "user_specified");
}

#[test]
fn open_breakers_fall_back_to_full_list() {
    let registry = two_provider_registry();
    let (router, breakers, _) = router_with(registry, RoutingSettings::default());

    for name in ["cheap", "fancy"] {
        let breaker = breakers.get(name);
        for _ in 0..5 {
            breaker.record_failure();
        }
    }

    // Routing still succeeds even with every circuit open
    let decision = router
        .route(
            &GenerationRequest::new("a fox"),
            Some(RoutingStrategy::Priority),
            MediaType::Image,
        )
        .unwrap();
    assert_eq!(decision.provider_name, "fancy");
}

#[tokio::test]
async fn fallback_chain_recovers_from_primary_failure() {
    let registry = Arc::new(ProviderRegistry::new());
    register(
        &registry,
        ScriptedProvider::failing("flaky", Duration::from_millis(5), "503 unavailable"),
        0,
    );
    let backup = ScriptedProvider::succeeding("backup", Duration::from_millis(5));
    register(&registry, backup.clone(), 1);

    let settings = RoutingSettings {
        fallback_image_providers: vec!["backup".to_string()],
        ..RoutingSettings::default()
    };
    let (router, _, _) = router_with(registry, settings);

    let request = GenerationRequest::new("a fox");
    let decision = router
        .route(&request, Some(RoutingStrategy::Priority), MediaType::Image)
        .unwrap();
    assert_eq!(decision.provider_name, "flaky");
    assert_eq!(decision.fallback_providers, vec!["backup".to_string()]);

    let result = router
        .execute_with_fallback(&request, &decision, MediaType::Image, 2)
        .await;
    assert!(result.success);
    assert_eq!(result.provider, "backup");
    assert_eq!(backup.call_count(), 1);
}

#[tokio::test]
async fn non_retryable_failure_stops_fallback_chain() {
    let registry = Arc::new(ProviderRegistry::new());
    register(
        &registry,
        ScriptedProvider::failing(
            "strict",
            Duration::from_millis(5),
            "content policy violation: prompt blocked",
        ),
        0,
    );
    let backup = ScriptedProvider::succeeding("backup", Duration::from_millis(5));
    register(&registry, backup.clone(), 1);

    let settings = RoutingSettings {
        fallback_image_providers: vec!["backup".to_string()],
        ..RoutingSettings::default()
    };
    let (router, _, _) = router_with(registry, settings);

    let request = GenerationRequest::new("a fox");
    let decision = router
        .route(&request, Some(RoutingStrategy::Priority), MediaType::Image)
        .unwrap();
    let result = router
        .execute_with_fallback(&request, &decision, MediaType::Image, 2)
        .await;

    assert!(!result.success);
    assert!(result.safety_blocked);
    assert_eq!(backup.call_count(), 0);
}

#[test]
fn alias_resolves_to_canonical_model() {
    let registry = Arc::new(ProviderRegistry::new());
    let mut model = image_model("gen-v2", "acme");
    model.aliases = vec!["gen-v1".to_string(), "gen-legacy".to_string()];
    register(
        &registry,
        ScriptedProvider::with_models("acme", Duration::from_millis(5), vec![model]),
        0,
    );

    let (provider, canonical) = resolve_alias(&registry, "gen-legacy");
    assert_eq!(provider.as_deref(), Some("acme"));
    assert_eq!(canonical, "gen-v2");

    // Direct ids pass through
    let (provider, canonical) = resolve_alias(&registry, "gen-v2");
    assert_eq!(provider.as_deref(), Some("acme"));
    assert_eq!(canonical, "gen-v2");

    // Unknown ids come back unchanged with no provider
    let (provider, canonical) = resolve_alias(&registry, "mystery");
    assert!(provider.is_none());
    assert_eq!(canonical, "mystery");
}

#[test]
fn preset_selection_cascades_to_balanced() {
    let registry = Arc::new(ProviderRegistry::new());

    let mut balanced = image_model("mid-v1", "acme");
    balanced.tier = Some(QualityPreset::Balanced);
    balanced.arena_score = Some(1100.0);
    let mut hidden_premium = image_model("pro-v1", "acme");
    hidden_premium.tier = Some(QualityPreset::Premium);
    hidden_premium.hidden = true;
    register(
        &registry,
        ScriptedProvider::with_models(
            "acme",
            Duration::from_millis(5),
            vec![balanced, hidden_premium],
        ),
        0,
    );

    // No visible premium model; cascades down to balanced
    let selected = select_model_by_preset(&registry, QualityPreset::Premium, None);
    assert_eq!(selected, Some(("acme".to_string(), "mid-v1".to_string())));

    // Catalog hides hidden models unless asked
    assert_eq!(all_models(&registry, false).len(), 1);
    assert_eq!(all_models(&registry, true).len(), 2);
}

#[test]
fn preset_selection_ranks_by_arena_score() {
    let registry = Arc::new(ProviderRegistry::new());

    let mut low = image_model("fast-a", "one");
    low.tier = Some(QualityPreset::Fast);
    low.arena_score = Some(900.0);
    register(
        &registry,
        ScriptedProvider::with_models("one", Duration::from_millis(5), vec![low]),
        0,
    );

    let mut high = image_model("fast-b", "two");
    high.tier = Some(QualityPreset::Fast);
    high.arena_score = Some(1300.0);
    register(
        &registry,
        ScriptedProvider::with_models("two", Duration::from_millis(5), vec![high]),
        1,
    );

    let selected = select_model_by_preset(&registry, QualityPreset::Fast, None);
    assert_eq!(selected, Some(("two".to_string(), "fast-b".to_string())));

    // Preferred provider narrows the pool
    let selected = select_model_by_preset(&registry, QualityPreset::Fast, Some("one"));
    assert_eq!(selected, Some(("one".to_string(), "fast-a".to_string())));
}

#[tokio::test]
async fn health_check_covers_every_available_provider() {
    let registry = two_provider_registry();
    let (router, _, _) = router_with(registry, RoutingSettings::default());

    let reports = router.health_check_all(MediaType::Image).await;
    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|(_, report)| report.status == HealthState::Healthy));
}
