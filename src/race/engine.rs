//! Hedged-race execution across providers
//!
//! Launches the primary attempt, then staggers fallbacks after a soft timeout
//! without cancelling the still-pending primary. The first success wins and
//! aborts the rest. The terminal task status is written exactly once, and
//! quota is refunded only when the task produces nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::provider::model::{GenerationRequest, GenerationResult, MediaType};
use crate::provider::registry::ProviderRegistry;
use crate::race::state::{ProgressNotifier, QuotaService, TaskStage, TaskStatus, TaskStore, TaskUpdate};
use crate::routing::adaptive::AdaptiveRouter;
use crate::routing::breaker::BreakerRegistry;
use crate::routing::cost::CostTracker;

/// Minimum computed soft timeout
const SOFT_TIMEOUT_FLOOR: Duration = Duration::from_secs(10);
/// Latency samples required before the dynamic soft timeout kicks in
const MIN_LATENCY_SAMPLES: usize = 5;

/// Race timing knobs
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Static soft timeout used when the primary has too little history
    pub soft_timeout: Duration,
    /// Delay between launching successive fallbacks
    pub stagger_interval: Duration,
    /// Hard deadline for the whole task
    pub overall_timeout: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            soft_timeout: Duration::from_secs(30),
            stagger_interval: Duration::from_secs(10),
            overall_timeout: Duration::from_secs(120),
        }
    }
}

/// How a race ended
#[derive(Debug)]
pub enum RaceOutcome {
    Completed(GenerationResult),
    Failed(GenerationResult),
    Cancelled,
}

/// Runs generation tasks as staggered hedged races
pub struct RaceEngine {
    registry: Arc<ProviderRegistry>,
    breakers: Arc<BreakerRegistry>,
    adaptive: Arc<AdaptiveRouter>,
    costs: Arc<CostTracker>,
    config: RaceConfig,
}

impl RaceEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        breakers: Arc<BreakerRegistry>,
        adaptive: Arc<AdaptiveRouter>,
        costs: Arc<CostTracker>,
        config: RaceConfig,
    ) -> Self {
        Self {
            registry,
            breakers,
            adaptive,
            costs,
            config,
        }
    }

    /// Soft timeout for a primary: P90 of its latency window ×1.2, capped at
    /// half the overall deadline, floored at 10s. Static default below 5
    /// samples.
    pub fn soft_timeout_for(&self, primary: &str) -> Duration {
        if self.adaptive.sample_count(primary) >= MIN_LATENCY_SAMPLES {
            if let Some(p90) = self.adaptive.p90_latency(primary) {
                let dynamic = p90.mul_f64(1.2);
                let capped = dynamic.min(self.config.overall_timeout.mul_f64(0.5));
                return capped.max(SOFT_TIMEOUT_FLOOR);
            }
        }
        self.config.soft_timeout
    }

    /// Run one generation task end to end: race providers, write the terminal
    /// status exactly once, refund quota only if nothing was produced.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        task_id: &str,
        user_id: &str,
        request: &GenerationRequest,
        media_type: MediaType,
        primary_provider: &str,
        primary_model: &str,
        fallback_names: &[String],
        store: &dyn TaskStore,
        quota: &dyn QuotaService,
        notifier: &dyn ProgressNotifier,
    ) -> Result<RaceOutcome> {
        let update = TaskUpdate::status(TaskStatus::Generating)
            .with_stage(TaskStage::Generating)
            .with_progress(0.2)
            .started_now();
        if let Err(e) = store.update(task_id, update).await {
            warn!(task_id = %task_id, error = %e, "Failed to write generating status");
        }
        notifier
            .progress(user_id, task_id, TaskStage::Generating, 0.2)
            .await;

        let raced = self
            .race_providers(
                task_id,
                user_id,
                request,
                media_type,
                primary_provider,
                primary_model,
                fallback_names,
                store,
                notifier,
            )
            .await;

        let result = match raced {
            // Cancelled status was already written inside the race
            None => return Ok(RaceOutcome::Cancelled),
            Some(result) => result,
        };

        if result.success {
            if result.cost > 0.0 {
                self.costs
                    .record(&result.provider, &result.model, media_type, result.cost);
            }
            let update = TaskUpdate::status(TaskStatus::Completed)
                .with_stage(TaskStage::Completed)
                .with_progress(1.0)
                .with_provider(result.provider.clone())
                .with_model(result.model.clone())
                .completed_now();
            if let Err(e) = store.update(task_id, update).await {
                error!(task_id = %task_id, error = %e, "Failed to write completed status");
            }
            notifier
                .completed(
                    user_id,
                    task_id,
                    &result.provider,
                    (result.duration * 1000.0) as u64,
                )
                .await;
            return Ok(RaceOutcome::Completed(result));
        }

        let message = result
            .error
            .clone()
            .unwrap_or_else(|| "All providers failed".to_string());
        let code = result.error_kind.map(|k| k.as_str().to_string());
        let update = TaskUpdate::status(TaskStatus::Failed)
            .with_error(message.clone(), code.clone())
            .completed_now();
        if let Err(e) = store.update(task_id, update).await {
            error!(task_id = %task_id, error = %e, "Failed to write failed status");
        }
        notifier
            .error(user_id, task_id, &message, code.as_deref())
            .await;
        if let Err(e) = quota.refund(user_id, 1).await {
            error!(user_id = %user_id, error = %e, "Quota refund failed");
        }
        Ok(RaceOutcome::Failed(result))
    }

    /// The race proper. Returns the winning or last-failed result, or None if
    /// the task was cancelled (cancelled status already written).
    #[allow(clippy::too_many_arguments)]
    async fn race_providers(
        &self,
        task_id: &str,
        user_id: &str,
        request: &GenerationRequest,
        media_type: MediaType,
        primary_provider: &str,
        primary_model: &str,
        fallback_names: &[String],
        store: &dyn TaskStore,
        notifier: &dyn ProgressNotifier,
    ) -> Option<GenerationResult> {
        let overall = self.config.overall_timeout;
        let stagger = self.config.stagger_interval;
        let soft = self.soft_timeout_for(primary_provider);
        info!(
            task_id = %task_id,
            primary = %primary_provider,
            soft_timeout_secs = soft.as_secs(),
            "Starting provider race"
        );

        // Fallbacks sorted best adaptive score first, gated on availability
        // and circuit state, each resolved to its default model
        let names: Vec<&str> = fallback_names.iter().map(|s| s.as_str()).collect();
        let fallback_configs: Vec<(String, String)> = self
            .adaptive
            .rank(&names)
            .into_iter()
            .filter(|name| self.breakers.get(name).can_execute())
            .filter_map(|name| {
                let provider = self.registry.get_provider(name, media_type)?;
                if !provider.is_available() {
                    return None;
                }
                let model = provider.default_model()?;
                Some((name.to_string(), model.id))
            })
            .collect();

        let race_start = Instant::now();
        let mut last_error: Option<GenerationResult> = None;
        let mut in_flight: JoinSet<GenerationResult> = JoinSet::new();

        self.spawn_attempt(
            &mut in_flight,
            request,
            media_type,
            primary_provider,
            primary_model,
        );

        // Phase 1: give the primary the soft timeout to answer
        match timeout(soft, in_flight.join_next()).await {
            Ok(Some(Ok(result))) => {
                if result.success {
                    in_flight.abort_all();
                    return Some(result);
                }
                last_error = Some(result);
            }
            Ok(Some(Err(e))) => {
                warn!(task_id = %task_id, error = %e, "Primary attempt panicked");
            }
            // Soft timeout elapsed with the primary still pending, or the
            // set was unexpectedly empty
            _ => {}
        }

        if store.is_cancelled(task_id).await {
            return self.finish_cancelled(task_id, in_flight, store).await;
        }

        // Phase 2: staggered fallbacks; the primary keeps running
        let mut fallbacks = fallback_configs.into_iter();
        loop {
            if race_start.elapsed() >= overall {
                break;
            }

            if let Some((name, model)) = fallbacks.next() {
                info!(task_id = %task_id, fallback = %name, "Launching fallback provider");
                let update = TaskUpdate::default()
                    .with_stage(TaskStage::SwitchingProvider)
                    .with_provider(name.clone());
                if let Err(e) = store.update(task_id, update).await {
                    warn!(task_id = %task_id, error = %e, "Failed to write stage update");
                }
                notifier
                    .progress(user_id, task_id, TaskStage::SwitchingProvider, 0.5)
                    .await;
                self.spawn_attempt(&mut in_flight, request, media_type, &name, &model);
            } else if in_flight.is_empty() {
                break;
            }

            let remaining = match overall.checked_sub(race_start.elapsed()) {
                Some(r) if !r.is_zero() => r,
                _ => break,
            };

            match timeout(stagger.min(remaining), in_flight.join_next()).await {
                Ok(Some(Ok(result))) => {
                    if result.success {
                        info!(task_id = %task_id, winner = %result.provider, "Race winner");
                        in_flight.abort_all();
                        return Some(result);
                    }
                    last_error = Some(result);
                }
                Ok(Some(Err(e))) => {
                    warn!(task_id = %task_id, error = %e, "Race attempt panicked");
                }
                // Stagger window elapsed or the set drained
                _ => {}
            }

            if store.is_cancelled(task_id).await {
                return self.finish_cancelled(task_id, in_flight, store).await;
            }
        }

        // Final bounded wait for whatever is still in flight
        while !in_flight.is_empty() {
            let remaining = match overall.checked_sub(race_start.elapsed()) {
                Some(r) if !r.is_zero() => r,
                _ => break,
            };
            match timeout(remaining, in_flight.join_next()).await {
                Ok(Some(Ok(result))) => {
                    if result.success {
                        in_flight.abort_all();
                        return Some(result);
                    }
                    last_error = Some(result);
                }
                Ok(Some(Err(e))) => {
                    warn!(task_id = %task_id, error = %e, "Race attempt panicked");
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
        in_flight.abort_all();

        Some(last_error.unwrap_or_else(|| {
            GenerationResult::failure(
                media_type,
                "none",
                "",
                "All providers failed or timed out",
            )
        }))
    }

    /// Spawn one provider attempt. Breaker and adaptive stats are recorded
    /// inside the task so abandoned attempts still feed the scorer.
    fn spawn_attempt(
        &self,
        in_flight: &mut JoinSet<GenerationResult>,
        request: &GenerationRequest,
        media_type: MediaType,
        provider_name: &str,
        model_id: &str,
    ) {
        let registry = self.registry.clone();
        let breakers = self.breakers.clone();
        let adaptive = self.adaptive.clone();
        let request = request.clone();
        let provider_name = provider_name.to_string();
        let model_id = model_id.to_string();

        in_flight.spawn(async move {
            let provider = match registry.get_provider(&provider_name, media_type) {
                Some(p) => p,
                None => {
                    return GenerationResult::failure(
                        media_type,
                        &provider_name,
                        &model_id,
                        format!("Provider not found: {}", provider_name),
                    )
                }
            };
            let start = Instant::now();
            let result = provider.generate(&request, Some(&model_id)).await;
            let latency = start.elapsed();

            let breaker = breakers.get(&provider_name);
            if result.success {
                breaker.record_success();
                adaptive.record(&provider_name, true, latency, result.cost);
            } else {
                breaker.record_failure();
                adaptive.record(&provider_name, false, latency, 0.0);
            }
            result
        });
    }

    async fn finish_cancelled(
        &self,
        task_id: &str,
        mut in_flight: JoinSet<GenerationResult>,
        store: &dyn TaskStore,
    ) -> Option<GenerationResult> {
        info!(task_id = %task_id, "Task cancelled, aborting in-flight attempts");
        in_flight.abort_all();
        let update = TaskUpdate::status(TaskStatus::Cancelled).completed_now();
        if let Err(e) = store.update(task_id, update).await {
            error!(task_id = %task_id, error = %e, "Failed to write cancelled status");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_timeout_static_default_without_history() {
        let engine = RaceEngine::new(
            Arc::new(ProviderRegistry::new()),
            Arc::new(BreakerRegistry::default()),
            Arc::new(AdaptiveRouter::new()),
            Arc::new(CostTracker::new()),
            RaceConfig::default(),
        );
        assert_eq!(engine.soft_timeout_for("fresh"), Duration::from_secs(30));
    }

    #[test]
    fn test_soft_timeout_from_p90_with_floor() {
        let adaptive = Arc::new(AdaptiveRouter::new());
        // P90 of 1..=10 seconds is 9s; 9 * 1.2 = 10.8s
        for i in 1..=10u64 {
            adaptive.record("a", true, Duration::from_secs(i), 0.0);
        }
        let engine = RaceEngine::new(
            Arc::new(ProviderRegistry::new()),
            Arc::new(BreakerRegistry::default()),
            adaptive.clone(),
            Arc::new(CostTracker::new()),
            RaceConfig {
                overall_timeout: Duration::from_secs(30),
                ..RaceConfig::default()
            },
        );
        let soft = engine.soft_timeout_for("a");
        assert_eq!(soft, Duration::from_secs_f64(10.8));

        // Fast providers are floored at 10s
        for _ in 0..10 {
            adaptive.record("b", true, Duration::from_secs(1), 0.0);
        }
        assert_eq!(engine.soft_timeout_for("b"), Duration::from_secs(10));
    }

    #[test]
    fn test_soft_timeout_capped_at_half_overall() {
        let adaptive = Arc::new(AdaptiveRouter::new());
        for _ in 0..10 {
            adaptive.record("slow", true, Duration::from_secs(100), 0.0);
        }
        let engine = RaceEngine::new(
            Arc::new(ProviderRegistry::new()),
            Arc::new(BreakerRegistry::default()),
            adaptive,
            Arc::new(CostTracker::new()),
            RaceConfig {
                overall_timeout: Duration::from_secs(60),
                ..RaceConfig::default()
            },
        );
        assert_eq!(engine.soft_timeout_for("slow"), Duration::from_secs(30));
    }
}
