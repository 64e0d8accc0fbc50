//! Provider routing - circuit breakers, adaptive scoring, cost tracking

pub mod adaptive;
pub mod breaker;
pub mod cost;
pub mod presets;
pub mod router;

pub use adaptive::{AdaptiveRouter, ProviderScore, ScoreWeights};
pub use breaker::{BreakerRegistry, BreakerStatus, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use cost::{CostRecord, CostSummary, CostTracker};
pub use presets::{all_models, resolve_alias, select_model_by_preset, ModelCatalogEntry, QualityPreset};
pub use router::{ProviderRouter, RoutingDecision, RoutingStrategy};
