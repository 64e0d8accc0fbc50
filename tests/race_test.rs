//! Hedged-race engine behavior under controlled time

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use gen_router::provider::model::{GenerationRequest, MediaType};
use gen_router::provider::registry::ProviderRegistry;
use gen_router::race::engine::{RaceConfig, RaceEngine, RaceOutcome};
use gen_router::race::state::{MemoryTaskStore, TaskStatus};
use gen_router::routing::adaptive::AdaptiveRouter;
use gen_router::routing::breaker::BreakerRegistry;
use gen_router::routing::cost::CostTracker;

use common::{init_tracing, register, CountingNotifier, CountingQuota, ScriptedProvider};

struct Fixture {
    registry: Arc<ProviderRegistry>,
    breakers: Arc<BreakerRegistry>,
    adaptive: Arc<AdaptiveRouter>,
    costs: Arc<CostTracker>,
    store: MemoryTaskStore,
    quota: CountingQuota,
    notifier: CountingNotifier,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        Self {
            registry: Arc::new(ProviderRegistry::new()),
            breakers: Arc::new(BreakerRegistry::default()),
            adaptive: Arc::new(AdaptiveRouter::new()),
            costs: Arc::new(CostTracker::new()),
            store: MemoryTaskStore::new(),
            quota: CountingQuota::default(),
            notifier: CountingNotifier::default(),
        }
    }

    fn engine(&self, config: RaceConfig) -> RaceEngine {
        RaceEngine::new(
            self.registry.clone(),
            self.breakers.clone(),
            self.adaptive.clone(),
            self.costs.clone(),
            config,
        )
    }
}

fn fast_config() -> RaceConfig {
    RaceConfig {
        soft_timeout: Duration::from_secs(10),
        stagger_interval: Duration::from_secs(10),
        overall_timeout: Duration::from_secs(30),
    }
}

#[tokio::test(start_paused = true)]
async fn fast_primary_launches_no_fallbacks() {
    let fx = Fixture::new();
    let primary = ScriptedProvider::succeeding("alpha", Duration::from_secs(1));
    let fallback = ScriptedProvider::succeeding("beta", Duration::from_secs(1));
    register(&fx.registry, primary.clone(), 0);
    register(&fx.registry, fallback.clone(), 1);

    let engine = fx.engine(fast_config());
    let task_id = gen_router::race::state::new_task_id();
    let outcome = engine
        .run(
            &task_id,
            "u1",
            &GenerationRequest::new("a red fox"),
            MediaType::Image,
            "alpha",
            "alpha-v1",
            &["beta".to_string()],
            &fx.store,
            &fx.quota,
            &fx.notifier,
        )
        .await
        .unwrap();

    let result = match outcome {
        RaceOutcome::Completed(r) => r,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(result.provider, "alpha");
    assert_eq!(fallback.call_count(), 0);
    assert_eq!(fx.quota.refunds.load(Ordering::SeqCst), 0);

    let record = fx.store.get(&task_id).unwrap();
    assert_eq!(record.status, Some(TaskStatus::Completed));
    assert!((record.progress - 1.0).abs() < 1e-9);
    assert_eq!(record.provider.as_deref(), Some("alpha"));
    assert_eq!(fx.notifier.completed_events.load(Ordering::SeqCst), 1);

    // Winner-only cost tracking
    let summary = fx.costs.summary();
    assert_eq!(summary.record_count, 1);
    assert!(summary.by_provider.contains_key("alpha"));
}

#[tokio::test(start_paused = true)]
async fn slow_primary_is_hedged_by_fallback() {
    let fx = Fixture::new();
    // Primary fails at 12s, past the 10s soft timeout
    let primary = ScriptedProvider::failing("alpha", Duration::from_secs(12), "503 unavailable");
    let fallback = ScriptedProvider::succeeding("beta", Duration::from_secs(3));
    register(&fx.registry, primary.clone(), 0);
    register(&fx.registry, fallback.clone(), 1);

    let engine = fx.engine(fast_config());
    let start = tokio::time::Instant::now();
    let outcome = engine
        .run(
            "t1",
            "u1",
            &GenerationRequest::new("a red fox"),
            MediaType::Image,
            "alpha",
            "alpha-v1",
            &["beta".to_string()],
            &fx.store,
            &fx.quota,
            &fx.notifier,
        )
        .await
        .unwrap();
    let elapsed = start.elapsed();

    let result = match outcome {
        RaceOutcome::Completed(r) => r,
        other => panic!("expected completion, got {:?}", other),
    };
    // Fallback launched at t=10s, finished 3s later
    assert_eq!(result.provider, "beta");
    assert!(elapsed >= Duration::from_secs(12), "elapsed {:?}", elapsed);
    assert!(elapsed <= Duration::from_secs(14), "elapsed {:?}", elapsed);
    // The primary was launched and allowed to run to completion
    assert_eq!(primary.call_count(), 1);
    assert_eq!(fx.quota.refunds.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn all_failures_refund_quota_exactly_once() {
    let fx = Fixture::new();
    let primary = ScriptedProvider::failing("alpha", Duration::from_secs(1), "503 unavailable");
    let f1 = ScriptedProvider::failing("beta", Duration::from_secs(1), "rate limit exceeded");
    let f2 = ScriptedProvider::failing("gamma", Duration::from_secs(1), "connection refused");
    register(&fx.registry, primary, 0);
    register(&fx.registry, f1, 1);
    register(&fx.registry, f2.clone(), 2);

    let engine = fx.engine(fast_config());
    let outcome = engine
        .run(
            "t1",
            "u1",
            &GenerationRequest::new("a red fox"),
            MediaType::Image,
            "alpha",
            "alpha-v1",
            &["beta".to_string(), "gamma".to_string()],
            &fx.store,
            &fx.quota,
            &fx.notifier,
        )
        .await
        .unwrap();

    let result = match outcome {
        RaceOutcome::Failed(r) => r,
        other => panic!("expected failure, got {:?}", other),
    };
    assert!(!result.success);
    assert!(result.error.is_some());

    assert_eq!(fx.quota.refunds.load(Ordering::SeqCst), 1);
    assert_eq!(fx.notifier.error_events.load(Ordering::SeqCst), 1);
    assert_eq!(f2.call_count(), 1);

    let record = fx.store.get("t1").unwrap();
    assert_eq!(record.status, Some(TaskStatus::Failed));
    assert!(record.error.is_some());
    assert!(record.completed_at.is_some());
    assert_eq!(fx.costs.summary().record_count, 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_wins_over_failure_and_skips_refund() {
    let fx = Fixture::new();
    // Primary outlives the soft timeout so the cancellation check runs
    let primary = ScriptedProvider::succeeding("alpha", Duration::from_secs(60));
    let fallback = ScriptedProvider::succeeding("beta", Duration::from_secs(1));
    register(&fx.registry, primary, 0);
    register(&fx.registry, fallback.clone(), 1);
    fx.store.cancel("t1");

    let engine = fx.engine(fast_config());
    let outcome = engine
        .run(
            "t1",
            "u1",
            &GenerationRequest::new("a red fox"),
            MediaType::Image,
            "alpha",
            "alpha-v1",
            &["beta".to_string()],
            &fx.store,
            &fx.quota,
            &fx.notifier,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, RaceOutcome::Cancelled));
    assert_eq!(fx.store.get("t1").unwrap().status, Some(TaskStatus::Cancelled));
    // No refund on cancellation, and no fallbacks were launched
    assert_eq!(fx.quota.refunds.load(Ordering::SeqCst), 0);
    assert_eq!(fallback.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fallbacks_launch_in_adaptive_score_order() {
    let fx = Fixture::new();
    let primary = ScriptedProvider::failing("alpha", Duration::from_secs(1), "503 unavailable");
    let weak = ScriptedProvider::succeeding("beta", Duration::from_secs(1));
    let strong = ScriptedProvider::succeeding("gamma", Duration::from_secs(1));
    register(&fx.registry, primary, 0);
    register(&fx.registry, weak.clone(), 1);
    register(&fx.registry, strong.clone(), 2);

    // Make gamma clearly better than beta
    for _ in 0..20 {
        fx.adaptive.record("gamma", true, Duration::from_secs(1), 0.01);
        fx.adaptive.record("beta", false, Duration::from_secs(20), 0.05);
    }

    let engine = fx.engine(fast_config());
    let outcome = engine
        .run(
            "t1",
            "u1",
            &GenerationRequest::new("a red fox"),
            MediaType::Image,
            "alpha",
            "alpha-v1",
            &["beta".to_string(), "gamma".to_string()],
            &fx.store,
            &fx.quota,
            &fx.notifier,
        )
        .await
        .unwrap();

    let result = match outcome {
        RaceOutcome::Completed(r) => r,
        other => panic!("expected completion, got {:?}", other),
    };
    // The better-scored fallback went first and won before the other launched
    assert_eq!(result.provider, "gamma");
    assert_eq!(strong.call_count(), 1);
    assert_eq!(weak.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn open_breaker_excludes_fallback_from_race() {
    let fx = Fixture::new();
    let primary = ScriptedProvider::failing("alpha", Duration::from_secs(1), "503 unavailable");
    let broken = ScriptedProvider::succeeding("beta", Duration::from_secs(1));
    let healthy = ScriptedProvider::succeeding("gamma", Duration::from_secs(1));
    register(&fx.registry, primary, 0);
    register(&fx.registry, broken.clone(), 1);
    register(&fx.registry, healthy, 2);

    let breaker = fx.breakers.get("beta");
    for _ in 0..5 {
        breaker.record_failure();
    }

    let engine = fx.engine(fast_config());
    let outcome = engine
        .run(
            "t1",
            "u1",
            &GenerationRequest::new("a red fox"),
            MediaType::Image,
            "alpha",
            "alpha-v1",
            &["beta".to_string(), "gamma".to_string()],
            &fx.store,
            &fx.quota,
            &fx.notifier,
        )
        .await
        .unwrap();

    let result = match outcome {
        RaceOutcome::Completed(r) => r,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(result.provider, "gamma");
    assert_eq!(broken.call_count(), 0);
}
